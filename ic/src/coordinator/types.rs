//! Value types shared by the ledger, hub and finalizer

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::UnknownErrorCode;

/// Opaque event identifier assigned by the event source
pub type EventId = String;

/// Terminal disposition categories, ordered by precedence
///
/// `Ord` follows precedence: `Continue < Respond < Abort`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    #[default]
    Continue,
    Respond,
    Abort,
}

impl Disposition {
    /// Outcome topic published when this disposition is executed
    pub fn topic(self) -> Topic {
        match self {
            Disposition::Continue => Topic::Continued,
            Disposition::Respond => Topic::Responded,
            Disposition::Abort => Topic::Aborted,
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Continue => write!(f, "continue"),
            Disposition::Respond => write!(f, "respond"),
            Disposition::Abort => write!(f, "abort"),
        }
    }
}

/// Notification topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Aborted,
    Responded,
    Continued,
    Finalized,
}

impl Topic {
    pub const ALL: [Topic; 4] = [Topic::Aborted, Topic::Responded, Topic::Continued, Topic::Finalized];
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Aborted => write!(f, "aborted"),
            Topic::Responded => write!(f, "responded"),
            Topic::Continued => write!(f, "continued"),
            Topic::Finalized => write!(f, "finalized"),
        }
    }
}

/// Finalization lifecycle of a record (strictly monotonic)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalizationState {
    Pending,
    Finalizing,
    Finalized,
}

impl fmt::Display for FinalizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalizationState::Pending => write!(f, "pending"),
            FinalizationState::Finalizing => write!(f, "finalizing"),
            FinalizationState::Finalized => write!(f, "finalized"),
        }
    }
}

/// Overrides applied when a request is continued
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinueOverrides {
    pub url: Option<String>,
    pub method: Option<String>,
    #[serde(rename = "post-data")]
    pub post_data: Option<String>,
    pub headers: HashMap<String, String>,
}

impl ContinueOverrides {
    /// True when nothing would actually be overridden
    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.method.is_none() && self.post_data.is_none() && self.headers.is_empty()
    }
}

/// Synthesized response served instead of hitting the network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponsePayload {
    pub status: Option<u16>,
    pub headers: HashMap<String, String>,
    #[serde(rename = "content-type")]
    pub content_type: Option<String>,
    pub body: String,
}

impl ResponsePayload {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Status code that will be sent (200 when unset)
    pub fn status_code(&self) -> u16 {
        self.status.unwrap_or(200)
    }
}

/// Network error codes accepted by the transport's abort operation
///
/// Parsing (and deserializing) is case-insensitive and accepts `blocked` as
/// shorthand for `blockedbyclient`. The sink always receives the canonical
/// code, so `blocked` is issued as `blockedbyclient`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ErrorCode {
    Aborted,
    AccessDenied,
    AddressUnreachable,
    BlockedByClient,
    BlockedByResponse,
    ConnectionAborted,
    ConnectionClosed,
    ConnectionFailed,
    ConnectionRefused,
    ConnectionReset,
    InternetDisconnected,
    NameNotResolved,
    TimedOut,
    #[default]
    Failed,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Aborted => "aborted",
            ErrorCode::AccessDenied => "accessdenied",
            ErrorCode::AddressUnreachable => "addressunreachable",
            ErrorCode::BlockedByClient => "blockedbyclient",
            ErrorCode::BlockedByResponse => "blockedbyresponse",
            ErrorCode::ConnectionAborted => "connectionaborted",
            ErrorCode::ConnectionClosed => "connectionclosed",
            ErrorCode::ConnectionFailed => "connectionfailed",
            ErrorCode::ConnectionRefused => "connectionrefused",
            ErrorCode::ConnectionReset => "connectionreset",
            ErrorCode::InternetDisconnected => "internetdisconnected",
            ErrorCode::NameNotResolved => "namenotresolved",
            ErrorCode::TimedOut => "timedout",
            ErrorCode::Failed => "failed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = UnknownErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = match s.to_lowercase().as_str() {
            "aborted" => ErrorCode::Aborted,
            "accessdenied" => ErrorCode::AccessDenied,
            "addressunreachable" => ErrorCode::AddressUnreachable,
            "blockedbyclient" | "blocked" => ErrorCode::BlockedByClient,
            "blockedbyresponse" => ErrorCode::BlockedByResponse,
            "connectionaborted" => ErrorCode::ConnectionAborted,
            "connectionclosed" => ErrorCode::ConnectionClosed,
            "connectionfailed" => ErrorCode::ConnectionFailed,
            "connectionrefused" => ErrorCode::ConnectionRefused,
            "connectionreset" => ErrorCode::ConnectionReset,
            "internetdisconnected" => ErrorCode::InternetDisconnected,
            "namenotresolved" => ErrorCode::NameNotResolved,
            "timedout" => ErrorCode::TimedOut,
            "failed" => ErrorCode::Failed,
            _ => return Err(UnknownErrorCode(s.to_string())),
        };
        Ok(code)
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = UnknownErrorCode;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Terminal action chosen at finalization, with its parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Continue(Option<ContinueOverrides>),
    Respond(ResponsePayload),
    Abort(ErrorCode),
}

impl Resolution {
    pub fn disposition(&self) -> Disposition {
        match self {
            Resolution::Continue(_) => Disposition::Continue,
            Resolution::Respond(_) => Disposition::Respond,
            Resolution::Abort(_) => Disposition::Abort,
        }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::Continue(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_precedence_order() {
        assert!(Disposition::Abort > Disposition::Respond);
        assert!(Disposition::Respond > Disposition::Continue);
        assert_eq!(
            [Disposition::Respond, Disposition::Abort, Disposition::Continue]
                .into_iter()
                .max(),
            Some(Disposition::Abort)
        );
    }

    #[test]
    fn test_disposition_topic() {
        assert_eq!(Disposition::Continue.topic(), Topic::Continued);
        assert_eq!(Disposition::Respond.topic(), Topic::Responded);
        assert_eq!(Disposition::Abort.topic(), Topic::Aborted);
    }

    #[test]
    fn test_error_code_parse() {
        assert_eq!("blockedbyclient".parse::<ErrorCode>().unwrap(), ErrorCode::BlockedByClient);
        assert_eq!("TimedOut".parse::<ErrorCode>().unwrap(), ErrorCode::TimedOut);
        assert_eq!("blocked".parse::<ErrorCode>().unwrap(), ErrorCode::BlockedByClient);

        let err = "nope".parse::<ErrorCode>().unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_error_code_serde_matches_as_str() {
        let json = serde_json::to_string(&ErrorCode::NameNotResolved).unwrap();
        assert_eq!(json, "\"namenotresolved\"");

        let code: ErrorCode = serde_yaml::from_str("connectionrefused").unwrap();
        assert_eq!(code, ErrorCode::ConnectionRefused);

        let code: ErrorCode = serde_yaml::from_str("Blocked").unwrap();
        assert_eq!(code, ErrorCode::BlockedByClient);
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"blockedbyclient\"");

        let err = serde_yaml::from_str::<ErrorCode>("teapot").unwrap_err();
        assert!(err.to_string().contains("teapot"));
    }

    #[test]
    fn test_response_payload_defaults() {
        let payload = ResponsePayload::new("hello");
        assert_eq!(payload.status_code(), 200);

        let payload = payload.with_status(404).with_content_type("text/plain");
        assert_eq!(payload.status_code(), 404);
        assert_eq!(payload.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_continue_overrides_kebab_fields() {
        let yaml = "url: https://example.com/\npost-data: a=b\nheaders:\n  x-test: '1'\n";
        let overrides: ContinueOverrides = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(overrides.post_data.as_deref(), Some("a=b"));
        assert_eq!(overrides.headers.get("x-test").map(String::as_str), Some("1"));
        assert!(!overrides.is_empty());
        assert!(ContinueOverrides::default().is_empty());
    }
}
