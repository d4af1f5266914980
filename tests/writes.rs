use std::collections::HashSet;

use color_eyre::Result;
use common::*;
use pretty_assertions::assert_eq;
use tokio::{io::AsyncWriteExt, net::TcpStream};

mod common;

#[tokio::test]
async fn client_line_reaches_device() -> Result<()> {
    let mut hub = start_hub().await;
    let mut client = hub.connect().await?;

    client.write_line("CLOSE").await?;

    assert_eq!(hub.device_received().await?, "CLOSE");

    Ok(())
}

#[tokio::test]
async fn device_gets_exactly_one_newline() -> Result<()> {
    let mut hub = start_hub().await;
    let mut raw = TcpStream::connect(hub.addr).await?;
    wait_for_clients(&hub.registry, 1).await?;

    raw.write_all(b"first\r\nsecond\n\nthird\n").await?;

    for expected in ["first", "second", "", "third"] {
        assert_eq!(hub.device_received().await?, expected);
    }

    Ok(())
}

#[tokio::test]
async fn sender_does_not_get_an_echo() -> Result<()> {
    let mut hub = start_hub().await;
    let mut sender = hub.connect().await?;
    let mut other = hub.connect().await?;

    sender.write_line("CLOSE").await?;
    assert_eq!(hub.device_received().await?, "CLOSE");

    assert_silent(&mut sender).await;
    assert_silent(&mut other).await;

    Ok(())
}

#[tokio::test]
async fn many_writers_do_not_interleave() -> Result<()> {
    let mut hub = start_hub().await;
    let clients = hub.connect_many(4).await?;

    let mut tasks = vec![];
    for (n, mut client) in clients.into_iter().enumerate() {
        tasks.push(tokio::spawn(async move {
            for i in 0..25 {
                let line = format!("client {n} line {i} {}", "x".repeat(200));
                client.write_line(line).await?;
            }
            Ok::<_, color_eyre::Report>(client)
        }));
    }

    let mut received = HashSet::new();
    for _ in 0..100 {
        let line = hub.device_received().await?;
        assert!(line.starts_with("client "), "mangled line: {line:?}");
        assert!(line.ends_with(&"x".repeat(200)), "mangled line: {line:?}");
        assert!(received.insert(line));
    }

    for task in tasks {
        task.await??;
    }

    Ok(())
}
