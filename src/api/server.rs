use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, MatchedPath, State};
use axum::response::Response;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::unbounded_channel;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::ApiResult;
use crate::api::hub::{Client, Hub};
use crate::api::protocol::Inbound;
use crate::api::request;
use crate::storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub storage: Storage,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(upgrade))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .with_state(state)
}

/// Serves the websocket endpoint on `listener` until `cancel` fires.
#[instrument(skip_all)]
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> ApiResult<()> {
    let addr = listener.local_addr()?;
    tracing::info!(url = %format!("ws://{addr}/"), "websocket server ready");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(cancel.cancelled_owned())
    .await?;

    tracing::info!("websocket server stopped");
    Ok(())
}

async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    ws.on_upgrade(move |socket| connection(socket, peer, state))
}

#[instrument(skip(socket, state))]
async fn connection(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = unbounded_channel::<String>();
    let client = Client::new(tx);

    tracing::info!(client = %client.id(), "connection opened");

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => on_message(&state, &client, text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "connection errored");
                break;
            }
        }
    }

    state.hub.unsubscribe_all(&client);
    writer.abort();

    tracing::info!(client = %client.id(), "connection closed");
}

async fn on_message(state: &AppState, client: &Client, text: &str) {
    match Inbound::parse(text) {
        Some(Inbound::Subscribe { subscribe }) => {
            if state.hub.subscribe(client, &subscribe) {
                state.hub.publish_one(client, &subscribe).await;
            }
        }
        Some(Inbound::Unsubscribe { unsubscribe }) => state.hub.unsubscribe(client, &unsubscribe),
        Some(Inbound::Request { request, data }) => {
            let reply = request::handle(&state.storage, &request, &data).await;
            client.send(&request, &reply);
        }
        None => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    use serde_json::{Value, json};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    use crate::api::topic::Topic;
    use crate::db::repositories::memory::MemoryLeaderboardRepository;
    use crate::db::store::LeaderboardStore;
    use crate::live::MinuteSummary;
    use crate::storage::read::ReadOnlyStorage;
    use crate::transport::snapshot::SnapshotClient;

    async fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        (listener, addr)
    }

    async fn state() -> AppState {
        let store = LeaderboardStore::new(MemoryLeaderboardRepository::new());
        store
            .update_leaderboard(&MinuteSummary {
                channel: "#forsenlol".into(),
                date: chrono::Utc::now(),
                cancer: 2,
                messages: 1,
            })
            .await
            .unwrap();

        let storage = Storage::new().with_read(Arc::new(ReadOnlyStorage::new(
            SnapshotClient::new("127.0.0.1:1"),
            store,
        )));

        let echo = Topic::wildcard("test.echo.*", Duration::from_secs(60), |arg| async move {
            Ok(json!({ "echo": arg }))
        })
        .unwrap();

        AppState {
            hub: Arc::new(Hub::new(vec![echo])),
            storage,
        }
    }

    async fn next_json<S>(stream: &mut S) -> Value
    where
        S: futures::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        serde_json::from_str(message.to_text().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_websocket_session() {
        let (listener, addr) = listener().await;
        let state = state().await;
        let hub = state.hub.clone();
        let cancel = CancellationToken::new();

        let server = tokio::spawn(serve(listener, state, cancel.clone()));

        let (socket, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
        let (mut sink, mut stream) = socket.split();

        // garbage is ignored and the connection stays usable
        sink.send(WsMessage::text("garbage")).await.unwrap();

        sink.send(WsMessage::text(r#"{"subscribe": "test.echo.forsen"}"#))
            .await
            .unwrap();
        assert_eq!(
            next_json(&mut stream).await,
            json!({"topic": "test.echo.forsen", "data": {"echo": "forsen"}})
        );
        assert_eq!(hub.channels(), vec!["test.echo.forsen"]);

        sink.send(WsMessage::text(
            r#"{"request": "twitchcancer.search", "data": "forsen"}"#,
        ))
        .await
        .unwrap();
        assert_eq!(
            next_json(&mut stream).await,
            json!({"topic": "twitchcancer.search", "data": ["#forsenlol"]})
        );

        sink.send(WsMessage::text(r#"{"request": "twitchcancer.nothing"}"#))
            .await
            .unwrap();
        assert_eq!(
            next_json(&mut stream).await,
            json!({"topic": "twitchcancer.nothing", "data": {}})
        );

        let topic = hub.find("test.echo.forsen").unwrap();
        hub.publish(&topic).await;
        assert_eq!(next_json(&mut stream).await["topic"], "test.echo.forsen");

        sink.send(WsMessage::Close(None)).await.unwrap();
        drop(sink);

        for _ in 0..50 {
            if hub.channels().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(hub.channels().is_empty());

        cancel.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_publication() {
        let (listener, addr) = listener().await;
        let state = state().await;
        let hub = state.hub.clone();
        let cancel = CancellationToken::new();

        let server = tokio::spawn(serve(listener, state, cancel.clone()));

        let (socket, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
        let (mut sink, mut stream) = socket.split();

        sink.send(WsMessage::text(r#"{"subscribe": "test.echo.a"}"#))
            .await
            .unwrap();
        next_json(&mut stream).await;

        sink.send(WsMessage::text(r#"{"unsubscribe": "test.echo.a"}"#))
            .await
            .unwrap();
        // a request round trip guarantees the unsubscribe was processed
        sink.send(WsMessage::text(r#"{"request": "noop"}"#))
            .await
            .unwrap();
        assert_eq!(next_json(&mut stream).await["topic"], "noop");

        assert!(hub.channels().is_empty());

        cancel.cancel();
        drop(sink);
        drop(stream);
        server.await.unwrap().unwrap();
    }
}
