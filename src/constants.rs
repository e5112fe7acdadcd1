use std::time::Duration;

/// Messages younger than this are "live"; older ones are ready to be archived.
pub const LIVE_WINDOW: Duration = Duration::from_secs(60);
pub const ARCHIVE_INTERVAL: Duration = Duration::from_secs(60);

pub const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_SNAPSHOT_ADDR: &str = "127.0.0.1:5558";

// redis pubsub channel carrying minute summaries
pub const SUMMARY_TOPIC: &str = "summary";
pub const SUMMARY_RECONNECT_MIN: Duration = Duration::from_secs(1);
pub const SUMMARY_RECONNECT_MAX: Duration = Duration::from_secs(60);

pub const PAYLOAD_CACHE_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

pub const TOPIC_LIVE: &str = "twitchcancer.live";
pub const TOPIC_LEADERBOARDS: &str = "twitchcancer.leaderboards.*";
pub const TOPIC_LEADERBOARD: &str = "twitchcancer.leaderboard.*";
pub const TOPIC_STATUS: &str = "twitchcancer.status";
pub const TOPIC_CHANNEL: &str = "twitchcancer.channel.*";
pub const REQUEST_SEARCH: &str = "twitchcancer.search";

pub const LIVE_REFRESH: Duration = Duration::from_secs(1);
pub const HISTORY_REFRESH: Duration = Duration::from_secs(60);

pub const DEFAULT_EXPOSE_HOST: &str = "0.0.0.0";
pub const DEFAULT_EXPOSE_PORT: u16 = 8080;

pub const DEFAULT_IRC_SERVER: &str = "irc.chat.twitch.tv";
pub const DEFAULT_IRC_PORT: u16 = 6697;
pub const IRC_REJOIN_INTERVAL: Duration = Duration::from_secs(30);

pub const DEFAULT_SERVICE_NAME: &str = "twitchcancer";
pub const DEFAULT_LOG_FILTER: &str =
    "twitchcancer_server=debug,tower_http=debug,axum=info,sqlx=warn,irc=warn,info";
