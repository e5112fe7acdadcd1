use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::constants::SNAPSHOT_TIMEOUT;
use crate::live::{ChannelLevel, LiveAggregator};
use crate::transport::{TransportError, TransportResult};

type Connection = Framed<TcpStream, LengthDelimitedCodec>;

/// Answers every (empty) request frame with the JSON encoded live snapshot.
pub struct SnapshotServer {
    listener: TcpListener,
    live: Arc<LiveAggregator>,
}

impl SnapshotServer {
    pub async fn bind(addr: &str, live: Arc<LiveAggregator>) -> TransportResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::debug!(addr = %listener.local_addr()?, "bound snapshot socket");

        Ok(Self { listener, live })
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let accepted = tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = self.listener.accept() => accepted,
                };

                match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "snapshot reader connected");
                        let live = self.live.clone();
                        let cancel = cancel.clone();

                        tokio::spawn(async move {
                            if let Err(e) = serve(stream, live, cancel).await {
                                tracing::debug!(%peer, error = %e, "snapshot reader dropped");
                            }
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to accept snapshot reader"),
                }
            }

            tracing::info!("snapshot server stopped");
        })
    }
}

async fn serve(
    stream: TcpStream,
    live: Arc<LiveAggregator>,
    cancel: CancellationToken,
) -> TransportResult<()> {
    let mut conn = Framed::new(stream, LengthDelimitedCodec::new());

    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            request = conn.next() => request,
        };

        match request {
            Some(Ok(_)) => {
                let reply = serde_json::to_vec(&live.snapshot())?;
                conn.send(Bytes::from(reply)).await?;
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(()),
        }
    }
}

/// Requests the live window from a [`SnapshotServer`].
///
/// A request that fails or takes longer than the timeout yields an empty list, and the connection
/// is dropped so the next request starts from a fresh one.
pub struct SnapshotClient {
    addr: String,
    timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl SnapshotClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_timeout(addr, SNAPSHOT_TIMEOUT)
    }

    pub fn with_timeout(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            conn: Mutex::new(None),
        }
    }

    #[instrument(skip(self), fields(addr = %self.addr))]
    pub async fn request(&self) -> Vec<ChannelLevel> {
        // one request in flight per connection
        let mut conn = self.conn.lock().await;

        match tokio::time::timeout(self.timeout, self.exchange(&mut conn)).await {
            Ok(Ok(levels)) => levels,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "live snapshot request failed, will reconnect");
                *conn = None;
                Vec::new()
            }
            Err(_) => {
                tracing::warn!("no reply to a live snapshot request, will reconnect");
                *conn = None;
                Vec::new()
            }
        }
    }

    async fn exchange(&self, conn: &mut Option<Connection>) -> TransportResult<Vec<ChannelLevel>> {
        if conn.is_none() {
            let stream = TcpStream::connect(&self.addr).await?;
            tracing::debug!("connected snapshot socket");
            *conn = Some(Framed::new(stream, LengthDelimitedCodec::new()));
        }

        let Some(framed) = conn.as_mut() else {
            return Err(TransportError::Closed);
        };

        framed.send(Bytes::new()).await?;

        match framed.next().await {
            Some(frame) => Ok(serde_json::from_slice(&frame?)?),
            None => Err(TransportError::Closed),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    async fn server(live: Arc<LiveAggregator>) -> (SocketAddr, CancellationToken) {
        let cancel = CancellationToken::new();
        let server = SnapshotServer::bind("127.0.0.1:0", live).await.unwrap();
        let addr = server.local_addr().unwrap();
        server.spawn(cancel.clone());

        (addr, cancel)
    }

    #[tokio::test]
    async fn test_request_returns_live_snapshot() {
        let live = Arc::new(LiveAggregator::new());
        live.store("#forsen", 4);
        live.store("#forsen", 2);
        live.store("#lirik", 1);

        let (addr, cancel) = server(live.clone()).await;
        let client = SnapshotClient::new(addr.to_string());

        let levels = client.request().await;
        assert_eq!(levels, live.snapshot());
        assert_eq!(levels[0].cancer, 6);
        assert_eq!(levels[0].messages, 2);

        // same connection serves the next request
        live.store("#lirik", 1);
        let levels = client.request().await;
        assert_eq!(levels[1].messages, 2);

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_unreachable_server_yields_empty() {
        // bind then drop to get a port nobody listens on
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();

        let client = SnapshotClient::with_timeout(addr.to_string(), Duration::from_millis(200));
        assert!(client.request().await.is_empty());
    }

    #[tokio::test]
    async fn test_silent_server_times_out_then_reconnects() {
        let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();

        // accept and hold the connection without ever replying
        let holder = tokio::spawn(async move {
            let (stream, _) = silent.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let client = SnapshotClient::with_timeout(addr.to_string(), Duration::from_millis(200));
        assert!(client.request().await.is_empty());
        assert!(client.conn.lock().await.is_none());

        holder.abort();
    }
}
