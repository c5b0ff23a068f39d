use crate::error::{ProbeError, TransportError};
use crate::schema::WireSchema;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// One HTTP request, built fresh for every call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
    pub timeout_secs: u64,
    pub bearer_token: Option<String>,
}

/// What came back over the wire before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    Text(String),
    Empty,
}

impl Body {
    /// Non-JSON bodies degrade to text instead of failing.
    pub fn parse(text: String) -> Self {
        if text.trim().is_empty() {
            return Self::Empty;
        }
        match serde_json::from_str(&text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(text),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Json(value) => value.get(name),
            Self::Text(_) | Self::Empty => None,
        }
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    pub fn raw(&self) -> String {
        match self {
            Self::Json(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            Self::Text(text) => text.clone(),
            Self::Empty => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSummary {
    /// `None` when the request never produced an HTTP response.
    pub status: Option<u16>,
    pub body: Body,
    pub success: bool,
    pub message: Option<String>,
    pub transport_error: Option<TransportError>,
}

impl ResponseSummary {
    pub fn from_raw(raw: RawResponse) -> Self {
        let body = Body::parse(raw.text);
        let success_field = body.field("success").is_none_or(is_truthy);
        let message = body
            .str_field("message")
            .or_else(|| body.str_field("error"))
            .map(str::to_string);
        Self {
            status: Some(raw.status),
            success: raw.status == 200 && success_field,
            body,
            message,
            transport_error: None,
        }
    }

    pub fn from_transport_error(err: TransportError) -> Self {
        Self {
            status: None,
            body: Body::Empty,
            success: false,
            message: Some(err.to_string()),
            transport_error: Some(err),
        }
    }

    /// Classifies this summary into the error taxonomy.
    ///
    /// With `expect_json`, a successful response whose body is not JSON is a
    /// protocol error.
    pub fn into_result(self, expect_json: bool) -> Result<Self, ProbeError> {
        if let Some(err) = self.transport_error {
            return Err(ProbeError::Transport(err));
        }
        let status = self.status.unwrap_or_default();
        if !self.success {
            let message = self
                .message
                .clone()
                .or_else(|| match &self.body {
                    Body::Text(text) => Some(crate::format::truncate(text.trim(), 200)),
                    Body::Json(_) if status == 200 => {
                        Some("server reported success: false".to_string())
                    }
                    Body::Json(_) | Body::Empty => None,
                })
                .unwrap_or_else(|| "no message from server".to_string());
            return Err(ProbeError::Server { status, message });
        }
        if expect_json {
            match &self.body {
                Body::Json(_) => {}
                Body::Text(text) => {
                    return Err(ProbeError::Protocol {
                        raw: crate::format::truncate(text, 500),
                    });
                }
                Body::Empty => {
                    return Err(ProbeError::Protocol {
                        raw: "(empty body)".to_string(),
                    });
                }
            }
        }
        Ok(self)
    }
}

/// Truthiness as the bot servers' JSON bodies use it.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Whether the bot is still occupied, as far as a status body tells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    Busy,
    Idle,
    Unknown,
}

impl BotState {
    /// First match wins: `botBusy`, then our id in `bots[]`, then
    /// `activeBots`, then a session `state`.
    pub fn from_body(body: &Body, bot_id: Option<&str>, schema: &WireSchema) -> Self {
        if let Some(busy) = body.field("botBusy").and_then(Value::as_bool) {
            return if busy { Self::Busy } else { Self::Idle };
        }
        if let (Some(bots), Some(id)) = (body.field("bots").and_then(Value::as_array), bot_id) {
            let listed = bots
                .iter()
                .any(|bot| schema.id_of(bot).as_deref() == Some(id));
            return if listed { Self::Busy } else { Self::Idle };
        }
        if let Some(active) = body.field("activeBots").and_then(Value::as_u64) {
            return if active > 0 { Self::Busy } else { Self::Idle };
        }
        match session_state(body) {
            Some("joining" | "joined") => Self::Busy,
            Some("completed" | "error") => Self::Idle,
            _ => Self::Unknown,
        }
    }
}

/// `state` of a per-session status body, either nested under `status` or at
/// the top level.
pub fn session_state(body: &Body) -> Option<&str> {
    body.field("status")
        .and_then(|status| status.get("state"))
        .or_else(|| body.field("state"))
        .and_then(Value::as_str)
}

impl fmt::Display for BotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => f.write_str("busy"),
            Self::Idle => f.write_str("idle"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}
