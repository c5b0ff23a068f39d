//! Naming conventions observed across deployments of the bot server.
//!
//! Different server builds disagree on endpoint paths and on the JSON field
//! names used for the meeting URL, display name and bot id. Rather than
//! hard-coding one contract, each convention is a row in a small lookup table
//! and any entry can be overridden from the config file.
//!
//! The status and leave paths may contain an `{id}` placeholder. When they
//! do, the bot id travels in the path instead of the request body.

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireSchema {
    pub name: &'static str,
    pub meeting_field: String,
    pub name_field: String,
    pub id_field: String,
    pub health_path: String,
    pub join_path: String,
    pub status_path: String,
    pub leave_path: String,
    pub logs_path: String,
}

struct Convention {
    name: &'static str,
    meeting_field: &'static str,
    name_field: &'static str,
    id_field: &'static str,
    paths: [&'static str; 5],
}

// paths: health, join, status, leave, logs
const CONVENTIONS: &[Convention] = &[
    Convention {
        name: "meeting-url",
        meeting_field: "meetingUrl",
        name_field: "displayName",
        id_field: "botId",
        paths: ["/health", "/join-meeting", "/status", "/leave-meeting", "/logs"],
    },
    Convention {
        name: "url",
        meeting_field: "url",
        name_field: "username",
        id_field: "botId",
        paths: ["/health", "/join", "/status", "/leave", "/logs"],
    },
    Convention {
        name: "session",
        meeting_field: "url",
        name_field: "displayName",
        id_field: "sessionId",
        paths: [
            "/api/health",
            "/api/join-meeting",
            "/api/meeting-status/{id}",
            "/api/leave-meeting/{id}",
            "/api/logs",
        ],
    },
];

const ID_PLACEHOLDER: &str = "{id}";

pub const DEFAULT_SCHEMA: &str = "meeting-url";

/// Per-entry overrides from the `[paths]` table of the config file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathOverrides {
    pub health: Option<String>,
    pub join: Option<String>,
    pub status: Option<String>,
    pub leave: Option<String>,
    pub logs: Option<String>,
}

/// Per-entry overrides from the `[fields]` table of the config file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldOverrides {
    pub meeting: Option<String>,
    pub name: Option<String>,
    pub id: Option<String>,
}

impl WireSchema {
    pub fn lookup(name: &str) -> Option<Self> {
        CONVENTIONS.iter().find(|c| c.name == name).map(|c| {
            let [health, join, status, leave, logs] = c.paths;
            Self {
                name: c.name,
                meeting_field: c.meeting_field.to_string(),
                name_field: c.name_field.to_string(),
                id_field: c.id_field.to_string(),
                health_path: health.to_string(),
                join_path: join.to_string(),
                status_path: status.to_string(),
                leave_path: leave.to_string(),
                logs_path: logs.to_string(),
            }
        })
    }

    pub fn known_names() -> Vec<&'static str> {
        CONVENTIONS.iter().map(|c| c.name).collect()
    }

    #[must_use]
    pub fn with_overrides(mut self, paths: &PathOverrides, fields: &FieldOverrides) -> Self {
        let apply = |target: &mut String, value: &Option<String>| {
            if let Some(v) = value {
                target.clone_from(v);
            }
        };
        apply(&mut self.health_path, &paths.health);
        apply(&mut self.join_path, &paths.join);
        apply(&mut self.status_path, &paths.status);
        apply(&mut self.leave_path, &paths.leave);
        apply(&mut self.logs_path, &paths.logs);
        apply(&mut self.meeting_field, &fields.meeting);
        apply(&mut self.name_field, &fields.name);
        apply(&mut self.id_field, &fields.id);
        self
    }

    pub fn status_needs_id(&self) -> bool {
        self.status_path.contains(ID_PLACEHOLDER)
    }

    pub fn leave_needs_id_in_path(&self) -> bool {
        self.leave_path.contains(ID_PLACEHOLDER)
    }

    /// Status path with `{id}` filled in. `None` when the path needs an id
    /// and none is known.
    pub fn status_path_for(&self, id: Option<&str>) -> Option<String> {
        match id {
            Some(id) => Some(fill_id(&self.status_path, id)),
            None if self.status_needs_id() => None,
            None => Some(self.status_path.clone()),
        }
    }

    /// Path and body of a leave request for `id`.
    pub fn leave_request(&self, id: &str) -> (String, Option<Value>) {
        if self.leave_needs_id_in_path() {
            (fill_id(&self.leave_path, id), None)
        } else {
            let mut body = Map::new();
            body.insert(self.id_field.clone(), Value::String(id.to_string()));
            (self.leave_path.clone(), Some(Value::Object(body)))
        }
    }

    /// Reads a bot id from a join response or a `bots[]` entry. Numeric ids
    /// are stringified. Falls back to the other conventions' id fields.
    pub fn id_of(&self, value: &Value) -> Option<String> {
        std::iter::once(self.id_field.as_str())
            .chain(CONVENTIONS.iter().map(|c| c.id_field))
            .find_map(|field| match value.get(field)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }

    /// Reads a bot's meeting URL from a `bots[]` entry, trying this schema's
    /// field first and then every other known convention.
    pub fn meeting_url_of<'a>(&self, bot: &'a Value) -> Option<&'a str> {
        std::iter::once(self.meeting_field.as_str())
            .chain(CONVENTIONS.iter().map(|c| c.meeting_field))
            .find_map(|field| bot.get(field).and_then(Value::as_str))
    }
}

fn fill_id(template: &str, id: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(id.as_bytes()).collect();
    template.replace(ID_PLACEHOLDER, &encoded)
}
