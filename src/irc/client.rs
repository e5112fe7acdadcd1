use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use irc::client::prelude::*;
use irc::proto::CapSubCommand;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use crate::constants::IRC_REJOIN_INTERVAL;
use crate::diagnosis::Scorer;
use crate::storage::{Storage, StorageError};
use crate::util::env::Env;

pub type IrcResult<T> = core::result::Result<T, IrcClientErr>;

#[derive(Debug, Error)]
pub enum IrcClientErr {
    #[error(transparent)]
    ClientError(#[from] irc::error::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("irc stream closed")]
    StreamClosed,
}

// read-only login accepted by twitch chat without a token
const ANONYMOUS_LOGIN: &str = "justinfan51966";

#[derive(Debug)]
pub enum TtvCap {
    Tags,
    Commands,
    Membership,
}

impl From<TtvCap> for Capability {
    fn from(value: TtvCap) -> Self {
        match value {
            TtvCap::Tags => Capability::Custom("twitch.tv/tags"),
            TtvCap::Commands => Capability::Custom("twitch.tv/commands"),
            TtvCap::Membership => Capability::Custom("twitch.tv/membership"),
        }
    }
}

#[derive(Debug)]
pub struct IrcConnection {
    client: Client,
    channels: Vec<String>,
    id: Uuid,
}

/// `"Forsen"` and `"#forsen"` both name `"#forsen"`.
pub fn channel_room(name: &str) -> String {
    format!("#{}", name.trim().trim_start_matches('#').to_lowercase())
}

impl IrcConnection {
    #[instrument(skip(env))]
    pub async fn init(env: &Env) -> IrcResult<Self> {
        let channels: Vec<String> = env.irc_channels.iter().map(|c| channel_room(c)).collect();
        tracing::info!(channels = ?channels, "channel list");

        let nickname = env
            .irc_login
            .clone()
            .filter(|login| !login.is_empty())
            .unwrap_or_else(|| ANONYMOUS_LOGIN.to_string());

        let config = Config {
            use_tls: Some(true),
            nickname: Some(nickname),
            password: env
                .irc_token
                .as_ref()
                .filter(|token| !token.is_empty())
                .map(|token| format!("oauth:{}", token.trim_start_matches("oauth:"))),
            server: Some(env.irc_server.clone()),
            port: Some(env.irc_port),
            ping_time: Some(300),
            ..Config::default()
        };

        let client = Client::from_config(config).await?;

        Ok(Self {
            client,
            channels,
            id: Uuid::new_v4(),
        })
    }

    #[instrument(skip(self), fields(id = %self.id))]
    pub fn connect(&mut self) -> IrcResult<()> {
        self.client.identify()?;
        self.client.send_cap_req(&[
            TtvCap::Commands.into(),
            TtvCap::Membership.into(),
            TtvCap::Tags.into(),
        ])?;

        Ok(())
    }

    pub fn join_all_channels(&mut self) -> IrcResult<()> {
        let channels = self.channels.clone();
        self.join_channels(channels)
    }

    #[instrument(skip(self), fields(id = %self.id))]
    pub fn join_channels(&mut self, channels: Vec<String>) -> IrcResult<()> {
        if channels.is_empty() {
            return Ok(());
        }

        tracing::info!("sending join");
        self.client.send_join(channels.join(","))?;

        Ok(())
    }

    pub fn get_joined(&self) -> Vec<String> {
        self.client.list_channels().unwrap_or_default()
    }

    fn rejoin_channels(&mut self) -> IrcResult<()> {
        let joined: HashSet<String> = self.get_joined().into_iter().collect();
        let missing: Vec<String> = self
            .channels
            .iter()
            .filter(|c| !joined.contains(*c))
            .cloned()
            .collect();

        if !missing.is_empty() {
            tracing::warn!(missing_count = missing.len(), missing = ?missing, "trying channel rejoin");
            self.join_channels(missing)?;
        } else {
            tracing::debug!(joined_count = joined.len(), "all channels appear joined");
        }

        Ok(())
    }
}

/// Connects, joins every configured channel and scores each chat line into `storage` until
/// cancelled. Missing channels are rejoined every [`IRC_REJOIN_INTERVAL`].
///
/// Losing the connection cancels the whole role and the task ends with
/// [`IrcClientErr::StreamClosed`].
pub fn spawn_monitor(
    mut conn: IrcConnection,
    storage: Storage,
    scorer: Arc<dyn Scorer>,
    cancel: CancellationToken,
) -> IrcResult<JoinHandle<IrcResult<()>>> {
    conn.connect()?;
    let mut stream = conn.client.stream()?;

    Ok(tokio::spawn(async move {
        let mut rejoin = tokio::time::interval(IRC_REJOIN_INTERVAL);
        rejoin.tick().await;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,

                incoming = stream.next() => match incoming {
                    Some(Ok(msg)) => on_message(&msg, &mut conn, &storage, scorer.as_ref()),
                    Some(Err(e)) => Err(e.into()),
                    None => Err(IrcClientErr::StreamClosed),
                },

                _ = rejoin.tick() => conn.rejoin_channels(),
            };

            if let Err(e) = survive(result) {
                tracing::error!(id = %conn.id, error = %e, "irc connection lost");
                cancel.cancel();
                return Err(e);
            }
        }

        tracing::info!(id = %conn.id, "irc monitor stopped");
        Ok(())
    }))
}

/// Logs errors the monitor can carry on after and hands back the fatal ones.
fn survive(result: IrcResult<()>) -> IrcResult<()> {
    match result {
        Err(IrcClientErr::StreamClosed) => Err(IrcClientErr::StreamClosed),
        Err(e) => {
            tracing::error!(error = %e, "irc handler error");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

fn on_message(
    msg: &Message,
    conn: &mut IrcConnection,
    storage: &Storage,
    scorer: &dyn Scorer,
) -> IrcResult<()> {
    if let Some((channel, text)) = chat_line(msg) {
        return record(storage, scorer, channel, text);
    }

    match &msg.command {
        Command::CAP(_, CapSubCommand::ACK, caps, _) => {
            tracing::info!(caps = ?caps, "CAP REQ ok");
            if conn.get_joined().is_empty() {
                conn.join_all_channels()?;
            }
        }

        Command::CAP(_, CapSubCommand::NAK, caps, _) => {
            tracing::warn!(caps = ?caps, "CAP REQ rejected");
        }

        Command::NOTICE(target, notice) => {
            tracing::warn!(%target, %notice, "RECV NOTICE");
        }

        Command::JOIN(channel, _, _) | Command::PART(channel, _) => {
            tracing::debug!(%channel, command = ?msg.command, "membership change");
        }

        Command::PING(_, _) | Command::PONG(_, _) => {
            tracing::debug!(
                joined = conn.get_joined().len(),
                tracked = conn.channels.len(),
                "irc join stats"
            );
        }

        _ => {}
    }

    Ok(())
}

/// Channel and trimmed text of a non-empty chat message.
pub fn chat_line(msg: &Message) -> Option<(&str, &str)> {
    let Command::PRIVMSG(channel, text) = &msg.command else {
        return None;
    };

    let text = text.trim();
    (!text.is_empty()).then_some((channel.as_str(), text))
}

fn record(storage: &Storage, scorer: &dyn Scorer, channel: &str, text: &str) -> IrcResult<()> {
    storage.store(channel, scorer.points(text))?;
    Ok(())
}
