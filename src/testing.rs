use crate::cli::Cli;
use crate::client::Transport;
use crate::error::TransportError;
use crate::models::{RawResponse, RequestDescriptor};
use clap::{CommandFactory, FromArgMatches};
use std::cell::RefCell;
use std::collections::VecDeque;

type Scripted = Result<RawResponse, TransportError>;

/// Replays canned responses in order and records every request it sees.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: RefCell<VecDeque<Scripted>>,
    requests: RefCell<Vec<RequestDescriptor>>,
    hang: bool,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Scripted>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn with_json(status: u16, body: serde_json::Value) -> Self {
        Self::new(vec![Ok(json_response(status, &body))])
    }

    pub fn with_text(status: u16, text: &str) -> Self {
        Self::new(vec![Ok(RawResponse {
            status,
            text: text.to_string(),
        })])
    }

    /// Never answers.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<RequestDescriptor> {
        self.requests.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }
}

pub fn json_response(status: u16, body: &serde_json::Value) -> RawResponse {
    RawResponse {
        status,
        text: body.to_string(),
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportError> {
        self.requests.borrow_mut().push(request.clone());
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other("no scripted response left".to_string())))
    }
}

/// The CLI definition with every environment fallback removed.
pub fn command_without_env() -> clap::Command {
    let command = Cli::command();
    let bound: Vec<clap::Id> = command
        .get_arguments()
        .filter(|arg| arg.get_env().is_some())
        .map(|arg| arg.get_id().clone())
        .collect();
    bound.into_iter().fold(command, |command, id| {
        command.mut_arg(id, |arg| arg.env(None))
    })
}

/// Parses `args` (without the program name) as the CLI would, but without the
/// `MEETBOT_*` environment fallbacks so the developer's shell cannot leak in.
pub fn parse_cli(args: &[&str]) -> Result<Cli, clap::Error> {
    let argv = std::iter::once("meetbot-probe").chain(args.iter().copied());
    let matches = command_without_env().try_get_matches_from(argv)?;
    Cli::from_arg_matches(&matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_cli_ignores_environment() {
        assert!(
            Cli::command()
                .get_arguments()
                .any(|arg| arg.get_env().is_some())
        );
        assert!(
            command_without_env()
                .get_arguments()
                .all(|arg| arg.get_env().is_none())
        );
    }
}
