use crate::client::{Client, Transport};
use crate::config::{PollSettings, Settings};
use crate::error::{ProbeError, TransportError};
use crate::format::emit;
use crate::models::{BotState, Method};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Idle { attempts: u32 },
    StillBusy { attempts: u32 },
    Cancelled { attempts: u32 },
    /// The status path needs a bot id and the join response had none.
    NoBotId,
}

impl PollOutcome {
    pub fn describe(&self) -> String {
        match self {
            Self::Idle { attempts } => format!("bot idle after {attempts} status check(s)"),
            Self::StillBusy { attempts } => {
                format!("bot still busy after {attempts} status check(s)")
            }
            Self::Cancelled { attempts } => {
                format!("polling cancelled after {attempts} status check(s)")
            }
            Self::NoBotId => "polling skipped, no bot id to check".to_string(),
        }
    }
}

/// Waits `interval`, checks status, and repeats until the bot reports idle or
/// the attempt budget runs out. A failed check counts as an attempt.
pub async fn poll_until_idle<T: Transport>(
    client: &Client<T>,
    settings: &Settings,
    poll: &PollSettings,
    bot_id: Option<&str>,
    out: &mut dyn Write,
) -> PollOutcome {
    let Some(status_path) = settings.schema.status_path_for(bot_id) else {
        return PollOutcome::NoBotId;
    };
    let max = poll.attempts;
    let mut attempts = 0;

    while attempts < max {
        tokio::select! {
            biased;
            () = client.cancel_token().cancelled() => {
                return PollOutcome::Cancelled { attempts };
            }
            () = tokio::time::sleep(poll.interval) => {}
        }
        attempts += 1;

        let summary = client
            .call(Method::Get, &status_path, None, settings.timeout_seconds)
            .await;

        match summary.into_result(true) {
            Ok(summary) => {
                let state = BotState::from_body(&summary.body, bot_id, &settings.schema);
                tracing::debug!(attempt = attempts, %state, "Status check");
                emit(out, format!("  [{attempts}/{max}] bot {state}"));
                if state == BotState::Idle {
                    return PollOutcome::Idle { attempts };
                }
            }
            Err(ProbeError::Transport(TransportError::Cancelled)) => {
                return PollOutcome::Cancelled { attempts };
            }
            Err(err) => {
                tracing::warn!(attempt = attempts, "Status check failed: {err}");
                emit(out, format!("  [{attempts}/{max}] status check failed: {err}"));
            }
        }
    }

    PollOutcome::StillBusy { attempts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::WireSchema;
    use crate::testing::{ScriptedTransport, json_response};
    use serde_json::json;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn settings() -> Settings {
        settings_for("meeting-url")
    }

    fn settings_for(schema: &str) -> Settings {
        Settings {
            base_url: "http://localhost:3003".to_string(),
            schema: WireSchema::lookup(schema).unwrap(),
            timeout_seconds: 5,
            api_key: None,
            raw: false,
        }
    }

    fn poll(attempts: u32) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(10),
            attempts,
        }
    }

    fn busy() -> Result<crate::models::RawResponse, TransportError> {
        Ok(json_response(200, &json!({"botBusy": true})))
    }

    fn idle() -> Result<crate::models::RawResponse, TransportError> {
        Ok(json_response(200, &json!({"botBusy": false})))
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_first_idle() {
        let transport = ScriptedTransport::new(vec![busy(), busy(), idle(), busy()]);
        let client = Client::new(&transport, &settings(), CancellationToken::new());
        let mut out = Vec::new();

        let started = tokio::time::Instant::now();
        let outcome = poll_until_idle(&client, &settings(), &poll(10), None, &mut out).await;

        assert_eq!(outcome, PollOutcome::Idle { attempts: 3 });
        assert_eq!(transport.calls(), 3);
        assert!(started.elapsed() >= Duration::from_secs(30));
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("[3/10] bot idle"));
        assert!(transport.requests().iter().all(|r| r.url.ends_with("/status")));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget() {
        let transport = ScriptedTransport::new(vec![busy(), busy(), busy()]);
        let client = Client::new(&transport, &settings(), CancellationToken::new());
        let mut out = Vec::new();

        let outcome = poll_until_idle(&client, &settings(), &poll(2), None, &mut out).await;

        assert_eq!(outcome, PollOutcome::StillBusy { attempts: 2 });
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_check_counts_and_continues() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::ConnectionRefused("http://localhost:3003/status".to_string())),
            Ok(json_response(500, &json!({"error": "boom"}))),
            idle(),
        ]);
        let client = Client::new(&transport, &settings(), CancellationToken::new());
        let mut out = Vec::new();

        let outcome = poll_until_idle(&client, &settings(), &poll(5), None, &mut out).await;

        assert_eq!(outcome, PollOutcome::Idle { attempts: 3 });
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("[1/5] status check failed"));
        assert!(printed.contains("[2/5] status check failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn listing_without_our_bot_is_idle() {
        let transport = ScriptedTransport::new(vec![
            Ok(json_response(
                200,
                &json!({"success": true, "activeBots": 1, "bots": [{"botId": "b1"}]}),
            )),
            Ok(json_response(
                200,
                &json!({"success": true, "activeBots": 0, "bots": []}),
            )),
        ]);
        let client = Client::new(&transport, &settings(), CancellationToken::new());
        let mut out = Vec::new();

        let outcome = poll_until_idle(&client, &settings(), &poll(5), Some("b1"), &mut out).await;

        assert_eq!(outcome, PollOutcome::Idle { attempts: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn session_status_is_checked_by_id() {
        let session = |state: &str| {
            Ok(json_response(
                200,
                &json!({"success": true, "status": {"state": state, "error": null}}),
            ))
        };
        let transport = ScriptedTransport::new(vec![session("joining"), session("completed")]);
        let settings = settings_for("session");
        let client = Client::new(&transport, &settings, CancellationToken::new());
        let mut out = Vec::new();

        let outcome =
            poll_until_idle(&client, &settings, &poll(5), Some("1712345678901"), &mut out).await;

        assert_eq!(outcome, PollOutcome::Idle { attempts: 2 });
        assert!(
            transport
                .requests()
                .iter()
                .all(|r| r.url == "http://localhost:3003/api/meeting-status/1712345678901")
        );
    }

    #[tokio::test]
    async fn session_status_without_id_is_skipped() {
        let transport = ScriptedTransport::default();
        let settings = settings_for("session");
        let client = Client::new(&transport, &settings, CancellationToken::new());
        let mut out = Vec::new();

        let outcome = poll_until_idle(&client, &settings, &poll(5), None, &mut out).await;

        assert_eq!(outcome, PollOutcome::NoBotId);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_wait() {
        let transport = ScriptedTransport::new(vec![busy(), busy()]);
        let cancel = CancellationToken::new();
        let client = Client::new(&transport, &settings(), cancel.clone());
        let mut out = Vec::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            canceller.cancel();
        });

        let outcome = poll_until_idle(&client, &settings(), &poll(10), None, &mut out).await;

        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 1 });
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_drops_in_flight_check() {
        let transport = ScriptedTransport::hanging();
        let cancel = CancellationToken::new();
        let client = Client::new(&transport, &settings(), cancel.clone());
        let mut out = Vec::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(11)).await;
            canceller.cancel();
        });

        let outcome = poll_until_idle(&client, &settings(), &poll(10), None, &mut out).await;

        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 1 });
    }
}
