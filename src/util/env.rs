//! Process configuration read from environment variables (and `.env`, through [`dotenvy`]).
//!
//! Variables are mapped onto [`Env`] with a small serde `Deserializer` in the spirit of the
//! [`envy`] crate: every value arrives as a string and is parsed on demand into the field's
//! type, comma-separated values deserialize into sequences.
//!
//! [`envy`]: https://github.com/softprops/envy

use std::iter::empty;
use std::sync::OnceLock;

use serde::Deserialize;
use serde::de::value::{MapDeserializer, SeqDeserializer};
use serde::de::{self, IntoDeserializer};
use thiserror::Error;

use crate::constants::{
    DEFAULT_EXPOSE_HOST, DEFAULT_EXPOSE_PORT, DEFAULT_IRC_PORT, DEFAULT_IRC_SERVER,
    DEFAULT_LOG_FILTER, DEFAULT_SERVICE_NAME, DEFAULT_SNAPSHOT_ADDR,
};

static ENV: OnceLock<Env> = OnceLock::new();

/// Loads the environment once and hands out the same values for the lifetime of the process.
pub fn env() -> EnvResult<&'static Env> {
    if let Some(env) = ENV.get() {
        return Ok(env);
    }

    let loaded = Env::new()?;
    Ok(ENV.get_or_init(|| loaded))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Env {
    pub database_url: Option<String>,
    pub redis_url: Option<String>,

    #[serde(default = "default_snapshot_addr")]
    pub snapshot_addr: String,

    #[serde(default = "default_expose_host")]
    pub expose_host: String,
    #[serde(default = "default_expose_port")]
    pub expose_port: u16,

    pub irc_login: Option<String>,
    pub irc_token: Option<String>,
    #[serde(default = "default_irc_server")]
    pub irc_server: String,
    #[serde(default = "default_irc_port")]
    pub irc_port: u16,
    #[serde(default)]
    pub irc_channels: Vec<String>,

    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    pub otel_exporter_otlp_endpoint: Option<String>,
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Env {
    pub fn new() -> EnvResult<Self> {
        // a missing .env file is fine, the process environment still applies
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            return Err(EnvErr::Dotenvy(e));
        }

        Ok(from_iter(dotenvy::vars())?)
    }

    /// Returns a required variable, naming it in the error when it is absent.
    pub fn required<'a>(value: &'a Option<String>, name: &'static str) -> EnvResult<&'a str> {
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or(EnvErr::Missing(name))
    }
}

fn default_snapshot_addr() -> String {
    DEFAULT_SNAPSHOT_ADDR.to_string()
}

fn default_expose_host() -> String {
    DEFAULT_EXPOSE_HOST.to_string()
}

#[inline]
const fn default_expose_port() -> u16 {
    DEFAULT_EXPOSE_PORT
}

fn default_irc_server() -> String {
    DEFAULT_IRC_SERVER.to_string()
}

#[inline]
const fn default_irc_port() -> u16 {
    DEFAULT_IRC_PORT
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

pub fn from_iter<Iter, T>(iter: Iter) -> Result<T, EnvDeserializeError>
where
    T: de::DeserializeOwned,
    Iter: IntoIterator<Item = (String, String)>,
{
    T::deserialize(Vars {
        inner: MapDeserializer::new(iter.into_iter().map(|(k, v)| (Key(k.clone()), Val(k, v)))),
    })
}

// ---
//  Deserializer implementation
// ---

struct Key(String);

/// (variable name, raw value)
struct Val(String, String);

struct Vars<I>
where
    I: Iterator<Item = (Key, Val)>,
{
    inner: MapDeserializer<'static, I, EnvDeserializeError>,
}

impl<'de> IntoDeserializer<'de, EnvDeserializeError> for Key {
    type Deserializer = Self;
    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

impl<'de> IntoDeserializer<'de, EnvDeserializeError> for Val {
    type Deserializer = Self;
    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

macro_rules! parse_then_visit {
    ($($ty:ident => $method:ident,)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value, EnvDeserializeError>
            where
                V: de::Visitor<'de>,
            {
                match self.1.trim().parse::<$ty>() {
                    Ok(val) => val.into_deserializer().$method(visitor),
                    Err(e) => Err(de::Error::custom(format_args!(
                        "{e}: while parsing '{}' ({})",
                        self.1, self.0
                    ))),
                }
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for Val {
    type Error = EnvDeserializeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.1.into_deserializer().deserialize_any(visitor)
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        if self.1.trim().is_empty() {
            return SeqDeserializer::new(empty::<Val>()).deserialize_seq(visitor);
        }

        let name = self.0;
        let values = self
            .1
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Val(name.clone(), v.to_owned()))
            .collect::<Vec<_>>();

        SeqDeserializer::new(values.into_iter()).deserialize_seq(visitor)
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V>(
        self,
        _: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    parse_then_visit! {
        bool => deserialize_bool,
        u8 => deserialize_u8,
        u16 => deserialize_u16,
        u32 => deserialize_u32,
        u64 => deserialize_u64,
        i32 => deserialize_i32,
        i64 => deserialize_i64,
        f64 => deserialize_f64,
    }

    serde::forward_to_deserialize_any! {
        i8 i16 f32 char str string unit bytes byte_buf map enum
        unit_struct tuple_struct identifier tuple ignored_any struct
    }
}

impl<'de> de::Deserializer<'de> for Key {
    type Error = EnvDeserializeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.0.into_deserializer().deserialize_any(visitor)
    }

    serde::forward_to_deserialize_any! {
        char str string unit seq option bytes byte_buf map newtype_struct
        unit_struct tuple_struct identifier tuple ignored_any
        bool u8 u16 u32 u64 i8 i16 i32 i64 f32 f64 enum struct
    }
}

impl<'de, I> de::Deserializer<'de> for Vars<I>
where
    I: Iterator<Item = (Key, Val)>,
{
    type Error = EnvDeserializeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_map(self.inner)
    }

    serde::forward_to_deserialize_any! {
        char str string unit seq option bytes byte_buf map newtype_struct
        unit_struct tuple_struct identifier tuple ignored_any
        bool u8 u16 u32 u64 i8 i16 i32 i64 f32 f64 enum struct
    }
}

impl de::Error for EnvDeserializeError {
    fn custom<T>(msg: T) -> Self
    where
        T: std::fmt::Display,
    {
        EnvDeserializeError::Custom(msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        EnvDeserializeError::MissingValue(field.into())
    }
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),

    #[error(transparent)]
    DeserializationError(#[from] EnvDeserializeError),

    #[error("missing required environment variable '{0}'")]
    Missing(&'static str),
}

#[derive(Debug, Error)]
pub enum EnvDeserializeError {
    #[error("env deserialization error: {0}")]
    Custom(String),

    #[error("missing environment variable: {0}")]
    MissingValue(String),
}

#[cfg(test)]
mod test {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_apply() {
        let env: Env = from_iter(vars(&[("PATH", "/usr/bin")])).unwrap();

        assert_eq!(env.database_url, None);
        assert_eq!(env.snapshot_addr, DEFAULT_SNAPSHOT_ADDR);
        assert_eq!(env.expose_port, DEFAULT_EXPOSE_PORT);
        assert_eq!(env.irc_port, DEFAULT_IRC_PORT);
        assert!(env.irc_channels.is_empty());
        assert_eq!(env.service_name, DEFAULT_SERVICE_NAME);
    }

    #[test]
    fn test_parses_typed_values() {
        let env: Env = from_iter(vars(&[
            ("DATABASE_URL", "postgres://localhost/twitchcancer"),
            ("EXPOSE_PORT", "9001"),
            ("IRC_CHANNELS", "#forsenlol, #destiny,,#lirik"),
        ]))
        .unwrap();

        assert_eq!(
            env.database_url.as_deref(),
            Some("postgres://localhost/twitchcancer")
        );
        assert_eq!(env.expose_port, 9001);
        assert_eq!(env.irc_channels, vec!["#forsenlol", "#destiny", "#lirik"]);
    }

    #[test]
    fn test_bad_number_is_an_error() {
        let res: Result<Env, _> = from_iter(vars(&[("EXPOSE_PORT", "eighty")]));
        assert!(matches!(res, Err(EnvDeserializeError::Custom(_))));
    }

    #[test]
    fn test_required_rejects_empty() {
        assert!(matches!(
            Env::required(&Some(String::new()), "REDIS_URL"),
            Err(EnvErr::Missing("REDIS_URL"))
        ));
        assert_eq!(
            Env::required(&Some("redis://127.0.0.1".into()), "REDIS_URL").unwrap(),
            "redis://127.0.0.1"
        );
    }
}
