use std::time::Duration;

use futures::{future::join_all, StreamExt};
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tracing::{error, info, trace, warn};

use crate::{
    device::DeviceLines,
    error::Error,
    registry::{ClientHandle, Registry, SharedRegistry},
    serial::SerialMessage,
};

/// What happened to a single broadcast line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Clients which got the line queued.
    pub delivered: usize,

    /// Clients which were stalled, had the line dropped, and were disconnected.
    pub dropped: usize,

    /// Clients whose session had already ended.
    pub gone: usize,
}

/// Queue a line for every client registered right now.
///
/// Clients with room in their outbox get the line immediately.
/// Clients with a full outbox are then waited on concurrently, each for at most `grace_period`.
/// A client still full after that is considered stalled: it misses this line,
/// is told to disconnect, and is removed from the registry.
///
/// So a broadcast takes roughly `grace_period` at worst, no matter how many clients are stalled.
pub async fn broadcast(
    registry: &dyn Registry,
    line: &SerialMessage,
    grace_period: Duration,
) -> Delivery {
    let mut delivery = Delivery::default();
    let mut full = vec![];

    for client in registry.snapshot() {
        match client.outbox().try_send(line.clone()) {
            Ok(()) => delivery.delivered += 1,
            Err(TrySendError::Full(_)) if client.is_disconnected() => {
                registry.remove(client.id());
                delivery.gone += 1;
            }
            Err(TrySendError::Full(line)) => full.push((client, line)),
            Err(TrySendError::Closed(_)) => {
                registry.remove(client.id());
                delivery.gone += 1;
            }
        }
    }

    if full.is_empty() {
        return delivery;
    }

    // A session tearing down while we wait is gone, not stalled.
    let waits = full.into_iter().map(|(client, line)| async move {
        let shutdown = client.shutdown_token();
        let result = tokio::select! {
            biased;

            _ = shutdown.cancelled() => None,
            result = client.outbox().send_timeout(line, grace_period) => Some(result),
        };
        (client, result)
    });

    for (client, result) in join_all(waits).await {
        match result {
            Some(Ok(())) => delivery.delivered += 1,
            Some(Err(SendTimeoutError::Timeout(_))) => {
                warn!(%client, ?grace_period, "Client is not keeping up, dropping line and disconnecting");
                disconnect(registry, &client);
                delivery.dropped += 1;
            }
            None | Some(Err(SendTimeoutError::Closed(_))) => {
                registry.remove(client.id());
                delivery.gone += 1;
            }
        }
    }

    delivery
}

fn disconnect(registry: &dyn Registry, client: &ClientHandle) {
    client.disconnect();
    registry.remove(client.id());
}

/// The only reader of the device.
/// Every line read is broadcast to the clients registered at that moment.
pub struct DevicePump {
    lines: DeviceLines,
    registry: SharedRegistry,
    grace_period: Duration,
}

impl DevicePump {
    /// Create a pump. Nothing is read until [`DevicePump::run`].
    pub fn new(lines: DeviceLines, registry: SharedRegistry, grace_period: Duration) -> Self {
        Self {
            lines,
            registry,
            grace_period,
        }
    }

    /// Read and broadcast lines until the device fails or closes.
    ///
    /// Never returns otherwise, and the returned error is always fatal:
    /// the device cannot be recovered without starting over.
    pub async fn run(mut self) -> Error {
        info!("Reading from device");

        while let Some(line) = self.lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!(?e, "Device read failed");
                    return Error::Device(e);
                }
            };

            let delivery = broadcast(self.registry.as_ref(), &line, self.grace_period).await;

            trace!(%line, ?delivery, "From device");
        }

        error!("Device stream ended");

        Error::DeviceClosed
    }
}
