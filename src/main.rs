use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::hub::Hub;
use crate::api::server::AppState;
use crate::args::Role;
use crate::db::prelude::*;
use crate::diagnosis::Diagnosis;
use crate::irc::client::{IrcConnection, spawn_monitor};
use crate::live::LiveAggregator;
use crate::storage::Storage;
use crate::storage::live::MemoryStorage;
use crate::storage::read::ReadOnlyStorage;
use crate::storage::write::WriteOnlyStorage;
use crate::transport::snapshot::SnapshotClient;
use crate::transport::summary::{SummaryPublisher, SummarySubscriber};
use crate::util::env::{self, Env};
use crate::util::telemetry;

mod api;
mod args;
mod constants;
mod db;
mod diagnosis;
mod irc;
mod live;
mod storage;
mod transport;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Env(#[from] env::EnvErr),

    #[error(transparent)]
    Telemetry(#[from] telemetry::TelemetryErr),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Transport(#[from] transport::TransportError),

    #[error(transparent)]
    Storage(#[from] storage::StorageError),

    #[error(transparent)]
    Irc(#[from] irc::client::IrcClientErr),

    #[error(transparent)]
    Api(#[from] api::ApiError),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Topic(#[from] api::topic::TopicError),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = args::parse_cli_args();
    let env = env::env()?;
    let telemetry_registry = telemetry::Telemetry::register(env)?;

    tracing::info!(role = ?args.role, "starting twitchcancer");

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, shutting down");
        }
        shutdown.cancel();
    });

    let result = match args.role {
        Role::Monitor => monitor(env, cancel).await,
        Role::Record => record(env, cancel).await,
        Role::Expose => expose(env, cancel).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "exiting on error");
    }

    telemetry_registry.shutdown();
    result
}

/// Chat in, live levels and minute summaries out.
async fn monitor(env: &Env, cancel: CancellationToken) -> Result<()> {
    let publisher = SummaryPublisher::connect(Env::required(&env.redis_url, "REDIS_URL")?).await?;

    let memory = Arc::new(MemoryStorage::new(Arc::new(LiveAggregator::new())));
    let handles: Vec<JoinHandle<()>> = memory
        .serve(&env.snapshot_addr, publisher, cancel.clone())
        .await?;

    let storage = Storage::new().with_live(memory);
    let conn = IrcConnection::init(env).await?;
    let chat = spawn_monitor(
        conn,
        storage,
        Arc::new(Diagnosis::default()),
        cancel.clone(),
    )?;

    // a lost chat connection ends the role with an error
    let result = chat.await;
    cancel.cancel();
    _ = join_all(handles).await;

    result??;
    Ok(())
}

/// Summaries in, persistent leaderboards out. Must be the only writer.
async fn record(env: &Env, cancel: CancellationToken) -> Result<()> {
    let pool = db::connect(Env::required(&env.database_url, "DATABASE_URL")?).await?;
    let subscriber = SummarySubscriber::new(Env::required(&env.redis_url, "REDIS_URL")?)?;

    let store = LeaderboardStore::new(PgLeaderboardRepository::new(pool));
    let storage = Storage::new().with_write(Arc::new(WriteOnlyStorage::new(subscriber, store)));

    storage.record(cancel).await?;
    Ok(())
}

/// Leaderboards and live levels out to websocket clients.
async fn expose(env: &Env, cancel: CancellationToken) -> Result<()> {
    let pool = db::connect(Env::required(&env.database_url, "DATABASE_URL")?).await?;

    let store = LeaderboardStore::new(PgLeaderboardRepository::new(pool));
    let snapshot = SnapshotClient::new(env.snapshot_addr.clone());
    let storage = Storage::new().with_read(Arc::new(ReadOnlyStorage::new(snapshot, store)));

    let hub = Arc::new(Hub::new(api::topics(&storage)?));
    let publishers = hub.spawn_publishers(cancel.clone());

    let listener =
        tokio::net::TcpListener::bind((env.expose_host.as_str(), env.expose_port)).await?;
    api::server::serve(listener, AppState { hub, storage }, cancel).await?;

    _ = join_all(publishers).await;
    Ok(())
}
