//! One connected client.
//!
//! Each session runs two tasks:
//!
//! - inbound: lines from the socket are handed to the device writer.
//! - outbound: lines queued in the client's outbox are written to the socket.
//!
//! The tasks only share the outbox and the client's shutdown token.
//! Whichever task stops first cancels the token, which stops the other one,
//! and both unregister the client (only the first removal has any effect).

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::{
    device::DeviceWriter,
    registry::{ClientHandle, SharedRegistry},
    serial::{codecs::lines::LinesCodec, SerialMessage},
};

fn unregister(client: &ClientHandle, registry: &SharedRegistry) {
    client.disconnect();

    if registry.remove(client.id()) {
        info!(clients = registry.len(), "Disconnected");
    }
}

async fn inbound<R>(
    mut lines: FramedRead<R, LinesCodec>,
    client: ClientHandle,
    registry: SharedRegistry,
    device: DeviceWriter,
) where
    R: AsyncRead + Unpin,
{
    let shutdown = client.shutdown_token();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Told to stop");
                break;
            }
            line = lines.next() => line,
        };

        let line = match line {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                debug!(?e, "Read problem");
                break;
            }
            None => {
                debug!("Client closed the connection");
                break;
            }
        };

        trace!(%line, "To device");

        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Told to stop while waiting on device");
                break;
            }
            written = device.write(line) => if let Err(e) = written {
                warn!(?e, "Could not forward line to device");
                break;
            }
        }
    }

    unregister(&client, &registry);
}

async fn outbound<W>(
    mut sink: FramedWrite<W, LinesCodec>,
    mut outbox: mpsc::Receiver<SerialMessage>,
    client: ClientHandle,
    registry: SharedRegistry,
) where
    W: AsyncWrite + Unpin,
{
    let shutdown = client.shutdown_token();

    loop {
        let line = tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!("Told to stop");
                break;
            }
            line = outbox.recv() => line,
        };

        let Some(line) = line else {
            debug!("Outbox closed");
            break;
        };

        trace!(%line, "To client");

        // A client which does not read blocks this send.
        // The pump notices the full outbox and cancels us.
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Told to stop while writing");
                break;
            }
            sent = sink.send(line) => if let Err(e) = sent {
                debug!(?e, "Write problem");
                break;
            }
        }
    }

    unregister(&client, &registry);
}

/// A running client session.
///
/// Dropping this does not stop the session; use [`ClientHandle::disconnect`] for that.
#[derive(Debug)]
pub struct ClientSession {
    client: ClientHandle,
    inbound: JoinHandle<()>,
    outbound: JoinHandle<()>,
}

impl ClientSession {
    /// Register a new client and start pumping its connection.
    ///
    /// The client is registered before either task starts,
    /// so it receives every device line read from now on.
    pub fn spawn<S>(
        stream: S,
        peer: Option<SocketAddr>,
        registry: SharedRegistry,
        device: DeviceWriter,
        outbox_capacity: usize,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (client, outbox) = ClientHandle::new(peer, outbox_capacity);
        let (reader, writer) = tokio::io::split(stream);

        let span = info_span!("client", %client);

        registry.add(client.clone());
        info!(parent: &span, clients = registry.len(), "Connected");

        let inbound = tokio::spawn(
            inbound(
                FramedRead::new(reader, LinesCodec::newline()),
                client.clone(),
                registry.clone(),
                device,
            )
            .instrument(info_span!(parent: &span, "inbound")),
        );

        let outbound = tokio::spawn(
            outbound(
                FramedWrite::new(writer, LinesCodec::newline()),
                outbox,
                client.clone(),
                registry,
            )
            .instrument(info_span!(parent: &span, "outbound")),
        );

        Self {
            client,
            inbound,
            outbound,
        }
    }

    /// The handle of the client this session serves.
    pub fn client(&self) -> &ClientHandle {
        &self.client
    }

    /// Wait for both tasks to finish.
    pub async fn join(self) {
        for (task, name) in [(self.inbound, "inbound"), (self.outbound, "outbound")] {
            if let Err(e) = task.await {
                warn!(?e, "{name} task join error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
        time::Duration,
    };

    use pretty_assertions::assert_eq;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadBuf},
        time::timeout,
    };

    use super::*;
    use crate::{
        mock::{MockBuilder, MockHandle},
        registry::ClientRegistry,
    };

    const WAIT: Duration = Duration::from_secs(5);

    struct Setup {
        registry: SharedRegistry,
        mock: MockHandle,
        session: ClientSession,
        socket: DuplexStream,
    }

    fn setup(name: &str, socket_buffer: usize) -> Setup {
        let registry = ClientRegistry::shared();
        let (device, mock) = MockBuilder::new(name).build();
        let (socket, hub_side) = tokio::io::duplex(socket_buffer);

        let session = ClientSession::spawn(hub_side, None, registry.clone(), device.writer(), 4);

        Setup {
            registry,
            mock,
            session,
            socket,
        }
    }

    #[tokio::test]
    async fn registered_on_spawn() {
        let s = setup("registered", 1024);

        assert_eq!(s.registry.len(), 1);
        assert_eq!(s.registry.snapshot()[0].id(), s.session.client().id());
    }

    #[tokio::test]
    async fn client_line_is_forwarded_verbatim() {
        let mut s = setup("forward", 1024);

        s.socket.write_all(b"CLOSE\n").await.unwrap();

        let written = timeout(WAIT, s.mock.next_written()).await.unwrap();
        assert_eq!(written, Some("CLOSE".into()));
    }

    #[tokio::test]
    async fn crlf_client_line_is_forwarded_with_newline_only() {
        let mut s = setup("crlf", 1024);

        s.socket.write_all(b"CLOSE\r\n").await.unwrap();

        let written = timeout(WAIT, s.mock.next_written()).await.unwrap();
        assert_eq!(written, Some("CLOSE".into()));
    }

    #[tokio::test]
    async fn outbox_lines_are_written_to_socket() {
        let mut s = setup("outbox", 1024);

        let outbox = s.session.client().outbox().clone();
        outbox.send("OPEN".into()).await.unwrap();
        outbox.send("ACK".into()).await.unwrap();

        let mut received = [0; 9];
        timeout(WAIT, s.socket.read_exact(&mut received))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(&received, b"OPEN\nACK\n");
    }

    #[tokio::test]
    async fn client_eof_tears_down_session() {
        let s = setup("eof", 1024);
        let client = s.session.client().clone();

        drop(s.socket);

        timeout(WAIT, s.session.join()).await.unwrap();

        assert!(client.is_disconnected());
        assert!(s.registry.is_empty());
    }

    #[tokio::test]
    async fn disconnect_tears_down_session_and_closes_socket() {
        let mut s = setup("disconnect", 1024);
        let client = s.session.client().clone();

        client.disconnect();
        timeout(WAIT, s.session.join()).await.unwrap();

        assert!(s.registry.is_empty());

        // Both halves are gone, so the client sees end of stream.
        let mut buf = [0; 8];
        let read = timeout(WAIT, s.socket.read(&mut buf)).await.unwrap().unwrap();
        assert_eq!(read, 0);
    }

    #[tokio::test]
    async fn client_not_reading_can_still_be_disconnected() {
        // Tiny buffer which the client never drains.
        let s = setup("stuck", 8);
        let client = s.session.client().clone();

        let outbox = client.outbox().clone();
        for _ in 0..4 {
            outbox.send("a line much longer than eight bytes".into()).await.unwrap();
        }

        client.disconnect();
        timeout(WAIT, s.session.join()).await.unwrap();

        assert!(s.registry.is_empty());
        drop(s.socket);
    }

    /// Reading never yields anything, writing always fails.
    struct BrokenWriter;

    impl AsyncRead for BrokenWriter {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for BrokenWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn socket_write_failure_tears_down_session() {
        let registry = ClientRegistry::shared();
        let (device, _mock) = MockBuilder::new("broken").build();

        let session =
            ClientSession::spawn(BrokenWriter, None, registry.clone(), device.writer(), 4);
        let client = session.client().clone();

        client.outbox().send("x".into()).await.unwrap();

        // The inbound task is stuck reading, so only the failed write can stop it.
        timeout(WAIT, session.join()).await.unwrap();

        assert!(client.is_disconnected());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn no_echo_of_own_lines() {
        let mut s = setup("echo", 1024);

        s.socket.write_all(b"CLOSE\n").await.unwrap();
        timeout(WAIT, s.mock.next_written()).await.unwrap();

        // Nothing should come back on the socket.
        let mut buf = [0; 8];
        assert!(
            timeout(Duration::from_millis(100), s.socket.read(&mut buf))
                .await
                .is_err()
        );
    }
}
