//! Cross-window message shapes understood by the popup coordinator.

use serde::Deserialize;
use serde_json::Value;

/// A message posted to the embedding page, as delivered by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossWindowMessage {
    pub origin: String,
    pub data: Value,
}

impl CrossWindowMessage {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

/// A recognized message normalized into what it means for the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthSignal {
    Success { connection_id: Option<String> },
    Error { message: Option<String> },
    /// Recognized, but not terminal (intermediate provider step).
    Progress,
}

impl OAuthSignal {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OAuthSignal::Progress)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WireMessage {
    /// Provider-native widget events.
    #[serde(rename = "sdk")]
    Sdk {
        #[serde(default)]
        data: SdkPayload,
    },

    /// Posted by our own callback page once the provider redirected back.
    #[serde(rename = "BANKING_OAUTH_COMPLETE", rename_all = "camelCase")]
    Complete {
        #[serde(default, alias = "connection_id")]
        connection_id: Option<String>,
    },

    #[serde(rename = "BANKING_OAUTH_ERROR")]
    Failure {
        #[serde(default)]
        error: Option<Value>,
    },
}

#[derive(Debug, Default, Deserialize)]
struct SdkPayload {
    #[serde(default)]
    stage: Option<String>,
    #[serde(default, alias = "connectionId")]
    connection_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Normalizes a message payload. Unrecognized shapes yield `None`.
///
/// Some providers post their payload as a JSON-encoded string, so string
/// payloads are decoded once before matching.
pub fn parse_signal(data: &Value) -> Option<OAuthSignal> {
    let wire: WireMessage = match data {
        Value::String(raw) => serde_json::from_str(raw).ok()?,
        Value::Object(_) => serde_json::from_value(data.clone()).ok()?,
        _ => return None,
    };

    let signal = match wire {
        WireMessage::Sdk { data } => {
            let stage = data.stage.unwrap_or_default().to_ascii_lowercase();
            match stage.as_str() {
                "success" | "finish" => OAuthSignal::Success {
                    connection_id: data.connection_id,
                },
                "error" | "fail" => OAuthSignal::Error {
                    message: data.message,
                },
                _ => OAuthSignal::Progress,
            }
        }
        WireMessage::Complete { connection_id } => OAuthSignal::Success { connection_id },
        WireMessage::Failure { error } => OAuthSignal::Error {
            message: error.as_ref().and_then(error_text),
        },
    };
    Some(signal)
}

fn error_text(error: &Value) -> Option<String> {
    match error {
        Value::String(text) => Some(text.clone()),
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}
