//! TCP listener
//!
//! Binds the node's listening socket, publishes readiness, and runs one task
//! per accepted connection that reassembles frames and feeds the handler.

use crate::error::OverlayError;
use crate::protocol::FramedConnection;
use crate::transport::handler::{ConnectionState, MessageHandler};
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn, Instrument, Span};

/// Listener lifecycle as seen through [`Transport::ready`]
#[derive(Debug, Clone)]
pub enum ReadyState {
    Pending,
    Listening(u16),
    Failed(OverlayError),
    Closed,
}

/// Owner of one listening socket
pub struct Transport {
    ready_rx: watch::Receiver<ReadyState>,
    shutdown_tx: watch::Sender<bool>,
}

impl Transport {
    /// Start listening on `bind_addr` in the background.
    ///
    /// Returns immediately; binding happens on the spawned task and its result
    /// is observed through [`Transport::ready`]. Every task of this listener
    /// runs inside `span`.
    pub fn listen<H: MessageHandler>(bind_addr: SocketAddr, handler: Arc<H>, span: Span) -> Self {
        let (ready_tx, ready_rx) = watch::channel(ReadyState::Pending);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(run_listener(bind_addr, handler, ready_tx, shutdown_rx).instrument(span));

        Self { ready_rx, shutdown_tx }
    }

    /// Wait until the listener is bound and return its port
    pub async fn ready(&self) -> Result<u16> {
        let mut ready_rx = self.ready_rx.clone();
        let state = ready_rx
            .wait_for(|state| !matches!(state, ReadyState::Pending))
            .await
            .map_err(|_| OverlayError::network_error("Listener task ended before becoming ready"))?
            .clone();

        match state {
            ReadyState::Listening(port) => Ok(port),
            ReadyState::Failed(err) => Err(err.into()),
            ReadyState::Closed | ReadyState::Pending => {
                Err(OverlayError::network_error("Listener is closed").into())
            }
        }
    }

    /// Stop accepting connections and close the open ones
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_listener<H: MessageHandler>(
    bind_addr: SocketAddr,
    handler: Arc<H>,
    ready_tx: watch::Sender<ReadyState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let listener = match TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind listener to {}: {}", bind_addr, e);
            ready_tx.send_replace(ReadyState::Failed(OverlayError::bind_error_full(
                "Failed to bind listener",
                bind_addr.to_string(),
                e.to_string(),
            )));
            return;
        }
    };

    let port = match listener.local_addr() {
        Ok(addr) => addr.port(),
        Err(e) => {
            error!("Failed to get local address: {}", e);
            ready_tx.send_replace(ReadyState::Failed(OverlayError::bind_error_full(
                "Failed to get local address",
                bind_addr.to_string(),
                e.to_string(),
            )));
            return;
        }
    };

    info!("Listening on {}", port);
    ready_tx.send_replace(ReadyState::Listening(port));

    loop {
        let stopped = *shutdown_rx.borrow();
        if stopped {
            break;
        }

        let connection_shutdown = shutdown_rx.clone();
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("CONNECTED from {}", peer);
                    let task = serve_connection(stream, peer, handler.clone(), connection_shutdown);
                    tokio::spawn(task.in_current_span());
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    info!("Stopped listening on {}", port);
    ready_tx.send_replace(ReadyState::Closed);
}

/// Read, handle and answer messages from one connection until it closes.
/// Any failure here ends only this connection.
async fn serve_connection<H: MessageHandler>(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<H>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut connection = FramedConnection::new(stream);
    let mut state = ConnectionState::new(peer);

    loop {
        let next = tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("Closing connection from {} on shutdown", peer);
                break;
            }
            next = connection.read_message() => next,
        };

        let message = match next {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!("CLOSED from {}", peer);
                break;
            }
            Err(e) => {
                warn!("Dropping connection from {}: {}", peer, e);
                break;
            }
        };

        state.messages += 1;
        trace!("MESSAGE {} from {} (#{})", message.kind, peer, state.messages);

        match handler.handle(message, &mut state).await {
            Ok(Some(reply)) => {
                if let Err(e) = connection.write_message(&reply).await {
                    warn!("Failed to reply to {}: {}", peer, e);
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Handler failed for {}, closing connection: {}", peer, e);
                break;
            }
        }
    }

    handler.release(state).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Message, MessageType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::time::timeout;

    /// Answers every JOIN with a REJECT and counts releases
    #[derive(Default)]
    struct EchoHandler {
        released: AtomicUsize,
    }

    #[async_trait]
    impl MessageHandler for EchoHandler {
        async fn handle(&self, message: Message, _connection: &mut ConnectionState) -> Result<Option<Message>> {
            match message.kind {
                MessageType::Join => Ok(Some(Message::reject("echo"))),
                _ => Ok(None),
            }
        }

        async fn release(&self, _connection: ConnectionState) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    async fn connect(port: u16) -> FramedConnection<TcpStream> {
        FramedConnection::new(TcpStream::connect(("127.0.0.1", port)).await.unwrap())
    }

    #[tokio::test]
    async fn test_ready_reports_bound_port() {
        let transport = Transport::listen(loopback(), Arc::new(EchoHandler::default()), Span::none());
        let port = transport.ready().await.unwrap();
        assert!(port > 0);
        assert!(matches!(*transport.ready_rx.borrow(), ReadyState::Listening(p) if p == port));
    }

    #[tokio::test]
    async fn test_bind_failure_fails_ready() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = occupied.local_addr().unwrap();

        let transport = Transport::listen(addr, Arc::new(EchoHandler::default()), Span::none());
        let err = transport.ready().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<OverlayError>(), Some(OverlayError::BindError { .. })));
    }

    #[tokio::test]
    async fn test_reply_on_same_connection() {
        let transport = Transport::listen(loopback(), Arc::new(EchoHandler::default()), Span::none());
        let port = transport.ready().await.unwrap();

        let mut client = connect(port).await;
        client.write_message(&Message::join()).await.unwrap();
        let reply = client.read_message().await.unwrap().unwrap();
        assert_eq!(reply.kind, MessageType::Reject);
    }

    #[tokio::test]
    async fn test_decode_failure_closes_only_that_connection() {
        let handler = Arc::new(EchoHandler::default());
        let transport = Transport::listen(loopback(), handler.clone(), Span::none());
        let port = transport.ready().await.unwrap();

        let mut healthy = connect(port).await;

        let mut broken = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        broken.write_all(&[0, 0, 0, 3, b'x', b'y', b'z']).await.unwrap();
        let mut broken = FramedConnection::new(broken);
        let closed = timeout(Duration::from_secs(5), broken.read_message()).await.unwrap();
        assert!(matches!(closed, Ok(None) | Err(_)));

        healthy.write_message(&Message::join()).await.unwrap();
        let reply = timeout(Duration::from_secs(5), healthy.read_message()).await.unwrap();
        assert_eq!(reply.unwrap().unwrap().kind, MessageType::Reject);

        let fresh_port = transport.ready().await.unwrap();
        assert_eq!(fresh_port, port);
        assert!(handler.released.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_release_called_on_close() {
        let handler = Arc::new(EchoHandler::default());
        let transport = Transport::listen(loopback(), handler.clone(), Span::none());
        let port = transport.ready().await.unwrap();

        drop(connect(port).await);

        timeout(Duration::from_secs(5), async {
            while handler.released.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_listener() {
        let transport = Transport::listen(loopback(), Arc::new(EchoHandler::default()), Span::none());
        transport.ready().await.unwrap();
        transport.shutdown();

        let mut ready_rx = transport.ready_rx.clone();
        timeout(Duration::from_secs(5), ready_rx.wait_for(|s| matches!(s, ReadyState::Closed)))
            .await
            .unwrap()
            .unwrap();
        assert!(transport.ready().await.is_err());
    }
}
