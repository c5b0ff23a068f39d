use crate::cli::Cli;
use crate::client::{Client, Transport};
use crate::config::{self, Command, Invocation, PollSettings, Settings};
use crate::error::ProbeError;
use crate::format::{self, emit};
use crate::models::{self, Body, Method, ResponseSummary};
use crate::poll::{self, PollOutcome};
use serde_json::{Map, Value};
use std::io::Write;
use tokio_util::sync::CancellationToken;

const HEALTH_FIELDS: &[&str] = &[
    "status",
    "version",
    "botInitialized",
    "botBusy",
    "currentMeeting",
];

/// Resolves `cli`, runs the command, and returns the process exit code.
///
/// Configuration problems are reported before any request is made.
pub async fn run<T: Transport>(
    cli: Cli,
    transport: T,
    cancel: CancellationToken,
    out: &mut dyn Write,
) -> u8 {
    let invocation = match config::resolve(cli) {
        Ok(invocation) => invocation,
        Err(err) => {
            tracing::debug!("Rejected invocation: {err}");
            emit(out, format::failed_line(&err));
            emit(out, format::usage_hint());
            return err.exit_code();
        }
    };
    let client = Client::new(transport, &invocation.settings, cancel);
    dispatch(&client, &invocation, out).await
}

pub async fn dispatch<T: Transport>(
    client: &Client<T>,
    invocation: &Invocation,
    out: &mut dyn Write,
) -> u8 {
    let settings = &invocation.settings;
    let result = match &invocation.command {
        Command::Health => health(client, settings, out).await,
        Command::Join {
            meeting_url,
            name,
            poll,
            leave_after,
        } => {
            let request = JoinRequest {
                meeting_url,
                name: name.as_deref(),
                poll: poll.as_ref(),
                leave_after: *leave_after,
            };
            join(client, settings, &request, out).await
        }
        Command::Status { bot_id } => status(client, settings, bot_id.as_deref(), out).await,
        Command::Leave { bot_id } => leave(client, settings, bot_id, out).await,
        Command::Logs { lines } => logs(client, settings, *lines, out).await,
    };

    match result {
        Ok(summary) => {
            emit(out, format::ok_line(&summary));
            0
        }
        Err(err) => {
            emit(out, format::failed_line(&err));
            err.exit_code()
        }
    }
}

fn print_raw(settings: &Settings, summary: &ResponseSummary, out: &mut dyn Write) {
    if !settings.raw {
        return;
    }
    if let Some(status) = summary.status {
        emit(out, format!("  HTTP {status}"));
        let raw = summary.body.raw();
        if !raw.is_empty() {
            emit(out, raw);
        }
    }
}

fn print_message(summary: &ResponseSummary, out: &mut dyn Write) {
    if let Some(message) = &summary.message {
        emit(out, format!("  message: {message}"));
    }
}

async fn health<T: Transport>(
    client: &Client<T>,
    settings: &Settings,
    out: &mut dyn Write,
) -> Result<String, ProbeError> {
    let path = &settings.schema.health_path;
    emit(out, format!("Checking {}", client.url_for(path)));
    let summary = client
        .call(Method::Get, path, None, settings.timeout_seconds)
        .await;
    print_raw(settings, &summary, out);
    let summary = summary.into_result(false)?;

    match &summary.body {
        Body::Json(_) => {
            for field in HEALTH_FIELDS {
                if let Some(value) = summary.body.field(field) {
                    emit(out, format::field_line(field, value));
                }
            }
        }
        Body::Text(text) => emit(out, format!("  {}", format::truncate(text.trim(), 200))),
        Body::Empty => {}
    }

    Ok(format!("server at {} is up", settings.base_url))
}

struct JoinRequest<'a> {
    meeting_url: &'a str,
    name: Option<&'a str>,
    poll: Option<&'a PollSettings>,
    leave_after: bool,
}

async fn join<T: Transport>(
    client: &Client<T>,
    settings: &Settings,
    request: &JoinRequest<'_>,
    out: &mut dyn Write,
) -> Result<String, ProbeError> {
    let schema = &settings.schema;
    let meeting_url = request.meeting_url;
    let mut payload = Map::new();
    payload.insert(
        schema.meeting_field.clone(),
        Value::String(meeting_url.to_string()),
    );
    if let Some(name) = request.name {
        payload.insert(schema.name_field.clone(), Value::String(name.to_string()));
    }

    emit(
        out,
        format!(
            "Joining {meeting_url} via {}",
            client.url_for(&schema.join_path)
        ),
    );
    let summary = client
        .call(
            Method::Post,
            &schema.join_path,
            Some(Value::Object(payload)),
            settings.timeout_seconds,
        )
        .await;
    print_raw(settings, &summary, out);
    let summary = summary.into_result(true)?;
    print_message(&summary, out);

    let id_field = &schema.id_field;
    let bot_id = match &summary.body {
        Body::Json(value) => schema.id_of(value),
        Body::Text(_) | Body::Empty => None,
    };
    match &bot_id {
        Some(id) => emit(out, format!("  {id_field}: {id}")),
        None => tracing::warn!("Join succeeded but the server returned no {id_field}"),
    }

    let mut result = match &bot_id {
        Some(id) => format!("join request accepted, bot {id}"),
        None => format!("join request accepted (server returned no {id_field})"),
    };

    if let Some(watch) = request.poll {
        emit(
            out,
            format!(
                "Polling status every {}s, up to {} time(s)",
                watch.interval.as_secs(),
                watch.attempts
            ),
        );
        let outcome =
            poll::poll_until_idle(client, settings, watch, bot_id.as_deref(), out).await;
        if let PollOutcome::Cancelled { .. } = outcome {
            tracing::info!("Polling interrupted");
        }
        result.push_str("; ");
        result.push_str(&outcome.describe());
    }

    if request.leave_after {
        let Some(id) = bot_id else {
            emit(out, format!("  {result}"));
            return Err(ProbeError::MissingId {
                field: id_field.clone(),
            });
        };
        // Runs even after an interrupt.
        let left = request_leave(client, settings, &id, LeaveMode::ToCompletion, out).await;
        if let Err(err) = left {
            emit(out, format!("  {result}"));
            return Err(err);
        }
        result.push_str("; bot left the meeting");
    }

    Ok(result)
}

async fn status<T: Transport>(
    client: &Client<T>,
    settings: &Settings,
    bot_id: Option<&str>,
    out: &mut dyn Write,
) -> Result<String, ProbeError> {
    let Some(path) = settings.schema.status_path_for(bot_id) else {
        return Err(ProbeError::configuration("status requires --bot-id <id>"));
    };
    let summary = client
        .call(Method::Get, &path, None, settings.timeout_seconds)
        .await;
    print_raw(settings, &summary, out);
    let summary = summary.into_result(true)?;
    let body = &summary.body;

    if let Some(state) = models::session_state(body) {
        emit(out, format!("  state: {state}"));
        if let Some(error) = body
            .field("status")
            .and_then(|status| status.get("error"))
            .filter(|error| !error.is_null())
        {
            emit(out, format::field_line("error", error));
        }
        let session = bot_id.unwrap_or("session");
        return Ok(format!("{session} is {state}"));
    }

    let bots = body.field("bots").and_then(Value::as_array);
    let active = body
        .field("activeBots")
        .and_then(Value::as_u64)
        .or_else(|| bots.map(|b| b.len() as u64));

    if let Some(count) = active {
        emit(out, format!("  activeBots: {count}"));
    }
    for bot in bots.into_iter().flatten() {
        let id = settings
            .schema
            .id_of(bot)
            .unwrap_or_else(|| "<no id>".to_string());
        let runtime = bot.get("runtimeSeconds").and_then(Value::as_u64);
        emit(
            out,
            format::bot_line(&id, settings.schema.meeting_url_of(bot), runtime),
        );
    }
    if active.is_none() {
        for field in HEALTH_FIELDS {
            if let Some(value) = body.field(field) {
                emit(out, format::field_line(field, value));
            }
        }
    }

    Ok(match active {
        Some(count) => format!("{count} active bot(s)"),
        None => "status retrieved".to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaveMode {
    Cancellable,
    ToCompletion,
}

async fn request_leave<T: Transport>(
    client: &Client<T>,
    settings: &Settings,
    bot_id: &str,
    mode: LeaveMode,
    out: &mut dyn Write,
) -> Result<ResponseSummary, ProbeError> {
    let (path, body) = settings.schema.leave_request(bot_id);
    emit(out, format!("Asking bot {bot_id} to leave"));
    let summary = match mode {
        LeaveMode::Cancellable => {
            client
                .call(Method::Post, &path, body, settings.timeout_seconds)
                .await
        }
        LeaveMode::ToCompletion => {
            client
                .call_to_completion(Method::Post, &path, body, settings.timeout_seconds)
                .await
        }
    };
    print_raw(settings, &summary, out);
    let summary = summary.into_result(true)?;
    print_message(&summary, out);
    Ok(summary)
}

async fn leave<T: Transport>(
    client: &Client<T>,
    settings: &Settings,
    bot_id: &str,
    out: &mut dyn Write,
) -> Result<String, ProbeError> {
    request_leave(client, settings, bot_id, LeaveMode::Cancellable, out).await?;
    Ok(format!("bot {bot_id} left the meeting"))
}

async fn logs<T: Transport>(
    client: &Client<T>,
    settings: &Settings,
    lines: usize,
    out: &mut dyn Write,
) -> Result<String, ProbeError> {
    let path = &settings.schema.logs_path;
    let summary = client
        .call(Method::Get, path, None, settings.timeout_seconds)
        .await;
    print_raw(settings, &summary, out);
    let summary = summary.into_result(false)?;

    let text = match &summary.body {
        Body::Json(Value::String(text)) => text.clone(),
        Body::Json(_) => summary.body.raw(),
        Body::Text(text) => text.clone(),
        Body::Empty => String::new(),
    };
    let tail = format::tail_lines(&text, lines);
    for line in &tail {
        emit(out, line);
    }
    Ok(format!("{} log line(s)", tail.len()))
}
