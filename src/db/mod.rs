use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tracing::instrument;

pub mod catalog;
pub mod models;
pub mod repositories;
pub mod store;

pub mod prelude {
    pub use crate::db::catalog::{Horizon, Interval, Leaderboard, Metric};
    pub use crate::db::models::view::{ChannelView, LeaderboardEntry, LiveStatus, Status};
    pub use crate::db::models::{Field, HorizonStatus, LeaderboardRecord, StatValue};
    pub use crate::db::repositories::LeaderboardRepository;
    pub use crate::db::repositories::leaderboard::PgLeaderboardRepository;
    pub use crate::db::repositories::memory::MemoryLeaderboardRepository;
    pub use crate::db::store::LeaderboardStore;
    pub use crate::db::{DbError, DbResult};
}

/// Connects to postgres and brings the schema up to date. Failing here is fatal for the roles
/// that need the leaderboards.
#[instrument(skip(database_url))]
pub async fn connect(database_url: &str) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await?;

    sqlx::migrate!().run(&pool).await?;
    tracing::info!("database ready");

    Ok(pool)
}

pub type DbResult<T> = core::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}
