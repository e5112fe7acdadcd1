use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Measures how toxic twitch chats are, live and over time")]
pub struct Cli {
    #[command(subcommand)]
    pub role: Role,
}

/// Each role runs as its own process; they talk through the snapshot socket and redis.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Read chat, score messages and keep the live window
    Monitor,
    /// Apply minute summaries to the persistent leaderboards
    Record,
    /// Serve live levels and leaderboards over websocket
    Expose,
}

pub fn parse_cli_args() -> Cli {
    Cli::parse()
}
