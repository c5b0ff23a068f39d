use crate::cli::{Cli, CliCommand};
use crate::error::ProbeError;
use crate::schema::{DEFAULT_SCHEMA, FieldOverrides, PathOverrides, WireSchema};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3002";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_POLL_ATTEMPTS: u32 = 12;
const MAX_SECS: u64 = 3600;
const MAX_POLL_ATTEMPTS: u32 = 1000;

/// Contents of the optional TOML config file. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub schema: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub api_key: Option<String>,
    pub display_name: Option<String>,
    pub poll_interval_seconds: Option<u64>,
    pub poll_attempts: Option<u32>,
    #[serde(default)]
    pub paths: PathOverrides,
    #[serde(default)]
    pub fields: FieldOverrides,
}

impl FileConfig {
    /// Loads `explicit` if given, otherwise the default location if it exists.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Option<Self>> {
        match explicit {
            Some(path) => Self::load_from_path(path).map(Some),
            None => match config_file_path() {
                Some(path) if path.exists() => Self::load_from_path(&path).map(Some),
                _ => Ok(None),
            },
        }
    }

    pub fn load_from_path(config_path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(config_path).map_err(|e| {
            anyhow::anyhow!("Cannot read config at {}: {}", config_path.display(), e)
        })?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Invalid TOML in {}: {}", config_path.display(), e))?;
        Ok(config)
    }
}

fn config_file_path() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    Some(
        home.join(".config")
            .join("meetbot-probe")
            .join("config.toml"),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub attempts: u32,
}

/// Resolved, validated settings shared by every command.
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub schema: WireSchema,
    pub timeout_seconds: u64,
    pub api_key: Option<String>,
    pub raw: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Health,
    Join {
        meeting_url: String,
        name: Option<String>,
        poll: Option<PollSettings>,
        leave_after: bool,
    },
    Status {
        bot_id: Option<String>,
    },
    Leave {
        bot_id: String,
    },
    Logs {
        lines: usize,
    },
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub settings: Settings,
    pub command: Command,
}

/// Resolves CLI arguments (which already include environment variables) and
/// the config file into an [`Invocation`]. Performs no network I/O.
pub fn resolve(cli: Cli) -> Result<Invocation, ProbeError> {
    let file = FileConfig::load(cli.config.as_deref())
        .map_err(|e| ProbeError::configuration(format!("{e:#}")))?
        .unwrap_or_default();
    resolve_with(cli, file)
}

pub fn resolve_with(cli: Cli, file: FileConfig) -> Result<Invocation, ProbeError> {
    let base_url = validate_base_url(
        cli.base_url
            .as_deref()
            .or(file.base_url.as_deref())
            .unwrap_or(DEFAULT_BASE_URL),
    )?;

    let schema_name = cli
        .schema
        .as_deref()
        .or(file.schema.as_deref())
        .unwrap_or(DEFAULT_SCHEMA);
    let schema = WireSchema::lookup(schema_name)
        .ok_or_else(|| {
            ProbeError::configuration(format!(
                "unknown schema '{schema_name}' (expected one of: {})",
                WireSchema::known_names().join(", ")
            ))
        })?
        .with_overrides(&file.paths, &file.fields);

    let timeout_seconds = cli
        .timeout
        .or(file.timeout_seconds)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    check_seconds("timeout", timeout_seconds)?;

    let api_key = cli
        .api_key
        .or(file.api_key)
        .filter(|key| !key.trim().is_empty());

    let command = match cli.command {
        CliCommand::Health => Command::Health,
        CliCommand::Status { bot_id } => {
            let bot_id = non_blank(bot_id);
            if bot_id.is_none() && schema.status_needs_id() {
                return Err(ProbeError::configuration(format!(
                    "status requires --bot-id <id> with schema '{}'",
                    schema.name
                )));
            }
            Command::Status { bot_id }
        }
        CliCommand::Logs { lines } => {
            if lines == 0 {
                return Err(ProbeError::configuration("--lines must be at least 1"));
            }
            Command::Logs { lines }
        }
        CliCommand::Leave { bot_id } => {
            let bot_id = non_blank(bot_id)
                .ok_or_else(|| ProbeError::configuration("leave requires --bot-id <id>"))?;
            Command::Leave { bot_id }
        }
        CliCommand::Join {
            meeting_url,
            name,
            poll,
            poll_interval,
            poll_attempts,
            leave_after,
        } => {
            let meeting_url = meeting_url
                .ok_or_else(|| ProbeError::configuration("join requires --meeting-url <url>"))?;
            validate_meeting_url(&meeting_url)?;
            let poll = if poll {
                let interval = poll_interval
                    .or(file.poll_interval_seconds)
                    .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
                check_seconds("poll interval", interval)?;
                let attempts = poll_attempts
                    .or(file.poll_attempts)
                    .unwrap_or(DEFAULT_POLL_ATTEMPTS);
                if attempts == 0 || attempts > MAX_POLL_ATTEMPTS {
                    return Err(ProbeError::configuration(format!(
                        "poll attempts must be between 1 and {MAX_POLL_ATTEMPTS}"
                    )));
                }
                Some(PollSettings {
                    interval: Duration::from_secs(interval),
                    attempts,
                })
            } else {
                None
            };
            Command::Join {
                meeting_url,
                name: name.or(file.display_name).filter(|n| !n.trim().is_empty()),
                poll,
                leave_after,
            }
        }
    };

    Ok(Invocation {
        settings: Settings {
            base_url,
            schema,
            timeout_seconds,
            api_key,
            raw: cli.raw,
        },
        command,
    })
}

fn non_blank(id: Option<String>) -> Option<String> {
    id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty())
}

fn check_seconds(what: &str, secs: u64) -> Result<(), ProbeError> {
    if secs == 0 || secs > MAX_SECS {
        return Err(ProbeError::configuration(format!(
            "{what} must be between 1 and {MAX_SECS} seconds"
        )));
    }
    Ok(())
}

fn parse_http_url(what: &str, raw: &str) -> Result<Url, ProbeError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ProbeError::configuration(format!("invalid {what} '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ProbeError::configuration(format!(
            "{what} must be an http(s) URL with a host, got '{raw}'"
        )));
    }
    Ok(url)
}

/// Returns the base URL without a trailing slash so paths can be appended.
fn validate_base_url(raw: &str) -> Result<String, ProbeError> {
    parse_http_url("base URL", raw)?;
    Ok(raw.trim().trim_end_matches('/').to_string())
}

fn validate_meeting_url(raw: &str) -> Result<(), ProbeError> {
    parse_http_url("meeting URL", raw).map(|_| ())
}
