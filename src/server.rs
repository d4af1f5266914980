use std::{net::SocketAddr, time::Duration};

use tokio::{net::TcpListener, sync::oneshot};
use tracing::{error, info, info_span, warn, Instrument};

use crate::{
    config::Config,
    device::Device,
    error::Error,
    pump::DevicePump,
    registry::{ClientRegistry, SharedRegistry},
    session::ClientSession,
};

pub use crate::config::DEFAULT_PORT;

/// How long to back off after a failed accept,
/// e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

fn disconnect_everyone(registry: &SharedRegistry) {
    let clients = registry.snapshot();
    info!(clients = clients.len(), "Disconnecting all clients");

    for client in clients {
        client.disconnect();
    }
}

async fn run(
    config: Config,
    device: Device,
    registry: SharedRegistry,
    allocated_addr: Option<oneshot::Sender<SocketAddr>>,
) -> Result<(), Error> {
    config.validate()?;

    let bind_addr = config.listen.socket_addr();
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|source| Error::Bind {
            address: bind_addr.to_string(),
            source,
        })?;

    let addr = listener.local_addr().map_err(|source| Error::Bind {
        address: bind_addr.to_string(),
        source,
    })?;

    let device_span = info_span!("device", name = %device.name());
    let (lines, device_writer, mut writer_task) = device.into_parts();

    let pump = DevicePump::new(lines, registry.clone(), config.grace_period());
    let mut pump = tokio::spawn(pump.run().instrument(device_span));

    if let Some(addr_reply) = allocated_addr {
        if addr_reply.send(addr).is_err() {
            warn!("Nobody wanted to know which address was allocated");
        }
    }

    info!("listening on {}", addr);

    let fatal = loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(%peer, ?e, "Could not set nodelay");
                    }

                    ClientSession::spawn(
                        stream,
                        Some(peer),
                        registry.clone(),
                        device_writer.clone(),
                        config.outbox_capacity,
                    );
                }
                Err(e) => {
                    warn!(?e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            pumped = &mut pump => break match pumped {
                Ok(e) => e,
                Err(join_error) => {
                    error!(?join_error, "Device pump crashed");
                    Error::DeviceClosed
                }
            },
            written = &mut writer_task => break match written {
                Ok(Ok(())) => Error::DeviceWriterGone,
                Ok(Err(e)) => {
                    error!(?e, "Device write failed");
                    Error::Device(e)
                }
                Err(join_error) => {
                    error!(?join_error, "Device writer crashed");
                    Error::DeviceWriterGone
                }
            },
        }
    };

    error!(%fatal, "Device lost, shutting down");

    pump.abort();
    writer_task.abort();
    disconnect_everyone(&registry);

    Err(fatal)
}

/// Start the server on an arbitrary available port of the configured address.
/// The address allocated will be sent on the provided channel.
///
/// Clients are tracked in the given registry, which lets the caller observe them.
///
/// Only returns on failure: a bad configuration, a failed bind, or a lost device.
pub async fn run_any_port(
    mut config: Config,
    device: Device,
    registry: SharedRegistry,
    allocated_addr: oneshot::Sender<SocketAddr>,
) -> Result<(), Error> {
    config.listen.port = 0;
    run(config, device, registry, Some(allocated_addr)).await
}

/// Start the server as configured, with an already opened device.
pub async fn run_with_device(config: Config, device: Device) -> Result<(), Error> {
    run(config, device, ClientRegistry::shared(), None).await
}

/// Open the configured serial port and start the server on the given port.
pub async fn run_on_port(mut config: Config, port: u16) -> Result<(), Error> {
    config.listen.port = port;
    config.validate()?;

    let device = Device::open(&config)?;

    run(config, device, ClientRegistry::shared(), None).await
}
