#![allow(dead_code)]

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use color_eyre::Result;
use serial_hub::{
    client::HubClient,
    config::Config,
    error::Error,
    mock::{MockBuilder, MockHandle},
    registry::{ClientRegistry, SharedRegistry},
};
use tokio::{sync::oneshot, task::JoinHandle, time::timeout};
use tracing::info;

pub const WAIT: Duration = Duration::from_secs(5);

/// A hub running against a mock device.
pub struct Hub {
    pub addr: SocketAddr,
    pub mock: MockHandle,
    pub registry: SharedRegistry,
    pub server: JoinHandle<Result<(), Error>>,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.listen.address = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config
}

pub async fn start_hub() -> Hub {
    start_hub_with_config(test_config()).await
}

pub async fn start_hub_with_config(config: Config) -> Hub {
    let (device, mock) = MockBuilder::new("test").build();
    let registry = ClientRegistry::shared();
    let (addr_tx, addr_rx) = oneshot::channel();

    let server_registry = registry.clone();
    let server = tokio::spawn(async move {
        serial_hub::server::run_any_port(config, device, server_registry, addr_tx).await
    });

    let addr = addr_rx
        .await
        .expect("Server should reply with allocated address");

    Hub {
        addr,
        mock,
        registry,
        server,
    }
}

/// Wait until the hub has exactly this many clients registered.
pub async fn wait_for_clients(registry: &SharedRegistry, clients: usize) -> Result<()> {
    timeout(WAIT, async {
        while registry.len() != clients {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .map_err(|_| {
        color_eyre::eyre::eyre!(
            "Expected {clients} client(s), have {}",
            registry.len()
        )
    })
}

impl Hub {
    /// Connect a client and wait until the hub has registered it,
    /// so it is guaranteed to see any device line emitted afterwards.
    pub async fn connect(&self) -> Result<HubClient> {
        let expected = self.registry.len() + 1;

        info!("Connecting to hub at {}", self.addr);
        let client = HubClient::connect(self.addr).await?;

        wait_for_clients(&self.registry, expected).await?;

        Ok(client)
    }

    pub async fn connect_many(&self, n: usize) -> Result<Vec<HubClient>> {
        let mut clients = vec![];
        for _ in 0..n {
            clients.push(self.connect().await?);
        }
        Ok(clients)
    }

    /// The next line any client wrote to the device.
    pub async fn device_received(&mut self) -> Result<String> {
        let line = timeout(WAIT, self.mock.next_written())
            .await?
            .ok_or_else(|| color_eyre::eyre::eyre!("Device closed"))?;

        Ok(line.to_string_lossy())
    }
}

pub async fn receive(client: &mut HubClient) -> Result<String> {
    let line = timeout(WAIT, client.next_line())
        .await?
        .ok_or_else(|| color_eyre::eyre::eyre!("Stream closed"))??;

    Ok(line)
}

/// Assert nothing arrives for a little while.
pub async fn assert_silent(client: &mut HubClient) {
    let result = timeout(Duration::from_millis(200), client.next_line()).await;

    assert!(result.is_err(), "Expected silence, got {result:?}");
}

/// Assert the hub closed this client's connection.
/// Any lines still in flight are skipped.
pub async fn assert_closed(client: &mut HubClient) -> Result<()> {
    timeout(Duration::from_secs(30), async {
        while let Some(Ok(_)) = client.next_line().await {}
    })
    .await?;

    Ok(())
}
