use color_eyre::Result;
use common::*;
use pretty_assertions::assert_eq;
use serial_hub::{client::HubClient, mock::MockBuilder, registry::ClientRegistry};
use tokio::sync::oneshot;

mod common;

#[tokio::test]
async fn split_client_reads_and_writes_concurrently() -> Result<()> {
    let mut hub = start_hub().await;
    let client = hub.connect().await?;
    let (mut reader, mut writer) = client.into_split();

    let reading = tokio::spawn(async move {
        let mut lines = vec![];
        for _ in 0..3 {
            lines.push(reader.next_line().await.expect("open")?);
        }
        Ok::<_, color_eyre::Report>(lines)
    });

    for line in ["a", "b", "c"] {
        hub.mock.emit(line).await?;
        writer.write_line(line.to_uppercase()).await?;
    }

    for expected in ["A", "B", "C"] {
        assert_eq!(hub.device_received().await?, expected);
    }

    assert_eq!(reading.await??, vec!["a", "b", "c"]);

    Ok(())
}

#[tokio::test]
async fn loopback_hub_answers_every_client() -> Result<()> {
    let device = MockBuilder::new("loopback").build_loopback();
    let registry = ClientRegistry::shared();
    let (addr_tx, addr_rx) = oneshot::channel();

    let server_registry = registry.clone();
    tokio::spawn(async move {
        serial_hub::server::run_any_port(test_config(), device, server_registry, addr_tx).await
    });
    let addr = addr_rx.await?;

    let mut talker = HubClient::connect(addr).await?;
    wait_for_clients(&registry, 1).await?;
    let mut listener = HubClient::connect(addr).await?;
    wait_for_clients(&registry, 2).await?;

    talker.write_line("ping").await?;

    // The device answered, so everyone hears it, including the talker.
    assert_eq!(receive(&mut talker).await?, "ping");
    assert_eq!(receive(&mut listener).await?, "ping");

    Ok(())
}
