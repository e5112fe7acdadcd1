use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages a websocket client may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Inbound {
    Subscribe {
        subscribe: String,
    },
    Unsubscribe {
        unsubscribe: String,
    },
    Request {
        request: String,
        #[serde(default)]
        data: Value,
    },
}

impl Inbound {
    /// `None` for anything that isn't JSON or carries none of the known keys.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(inbound) => Some(inbound),
            Err(e) => {
                tracing::debug!(error = %e, text, "ignoring malformed client message");
                None
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    topic: &'a str,
    data: &'a Value,
}

/// Outbound frame: `{"topic": .., "data": ..}`.
pub fn envelope(topic: &str, data: &Value) -> serde_json::Result<String> {
    serde_json::to_string(&Envelope { topic, data })
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_inbound() {
        assert_eq!(
            Inbound::parse(r#"{"subscribe": "twitchcancer.live"}"#),
            Some(Inbound::Subscribe {
                subscribe: "twitchcancer.live".into()
            })
        );
        assert_eq!(
            Inbound::parse(r#"{"unsubscribe": "twitchcancer.status"}"#),
            Some(Inbound::Unsubscribe {
                unsubscribe: "twitchcancer.status".into()
            })
        );
        assert_eq!(
            Inbound::parse(r#"{"request": "twitchcancer.search", "data": "for"}"#),
            Some(Inbound::Request {
                request: "twitchcancer.search".into(),
                data: json!("for"),
            })
        );
        assert_eq!(
            Inbound::parse(r#"{"request": "twitchcancer.search"}"#),
            Some(Inbound::Request {
                request: "twitchcancer.search".into(),
                data: Value::Null,
            })
        );
    }

    #[test]
    fn test_parse_ignores_garbage() {
        assert_eq!(Inbound::parse("not json"), None);
        assert_eq!(Inbound::parse(r#"{"publish": "twitchcancer.live"}"#), None);
        assert_eq!(Inbound::parse(r#"{"subscribe": 12}"#), None);
        assert_eq!(Inbound::parse("[]"), None);
    }

    #[test]
    fn test_envelope() {
        let text = envelope("twitchcancer.live", &json!([{"channel": "#forsen"}])).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(
            value,
            json!({"topic": "twitchcancer.live", "data": [{"channel": "#forsen"}]})
        );
    }
}
