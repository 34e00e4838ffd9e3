//! `conduit session`: interactive streaming session.
//!
//! Lines are sent as messages; `/approve`, `/deny`, `/new`, `/resume [id]`
//! and `/quit` control the session.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::ConduitConfig;
use crate::error::ConduitError;
use crate::session::{SessionClient, SessionEvent};

use super::SessionArgs;

/// A parsed line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Message(String),
    Approve,
    Deny,
    NewChat,
    Resume(Option<String>),
    Quit,
    Empty,
}

impl InputCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let mut parts = line.splitn(2, char::is_whitespace);
        match parts.next() {
            None | Some("") => Self::Empty,
            Some("/approve") => Self::Approve,
            Some("/deny") => Self::Deny,
            Some("/new") => Self::NewChat,
            Some("/quit") | Some("/exit") => Self::Quit,
            Some("/resume") => Self::Resume(
                parts
                    .next()
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(ToString::to_string),
            ),
            Some(_) => Self::Message(line.to_string()),
        }
    }
}

pub async fn handle_session(args: SessionArgs, mut config: ConduitConfig) -> Result<(), ConduitError> {
    if let Some(url) = args.url {
        config.session.url = Some(url);
    }
    if let Some(workspace) = args.workspace {
        config.session.workspace = Some(workspace);
    }

    let mut client = SessionClient::from_config(&config.session)?;
    client.connect().await?;
    if let Some(chat_id) = args.resume {
        client.resume(Some(chat_id))?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let outcome = match InputCommand::parse(&line) {
                    InputCommand::Empty => Ok(()),
                    InputCommand::Quit => break,
                    InputCommand::Approve => client.approve().map(|sent| report_noop(sent, "no approval pending")),
                    InputCommand::Deny => client.deny().map(|sent| report_noop(sent, "no approval pending")),
                    InputCommand::NewChat => client.new_chat(),
                    InputCommand::Resume(id) => client.resume(id).map(|sent| report_noop(sent, "no chat to resume")),
                    InputCommand::Message(text) => client
                        .send_message(text, &[])
                        .map(|sent| report_noop(sent, "a turn is already in progress")),
                };
                if let Err(error) = outcome {
                    eprintln!("! {error}");
                }
            }
            event = client.next_event() => {
                let Some(event) = event else { break };
                if render(&event) {
                    break;
                }
            }
        }
    }

    client.disconnect().await
}

fn report_noop(sent: bool, reason: &str) {
    if !sent {
        eprintln!("! {reason}");
    }
}

/// Print one event. Returns `true` when the session is over.
fn render(event: &SessionEvent) -> bool {
    match event {
        SessionEvent::ContentDelta { text } => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        SessionEvent::Status { text } => eprintln!("… {text}"),
        SessionEvent::ToolCallStarted { call } => eprintln!("\n⚡ {} ({})", call.name, call.id),
        SessionEvent::ToolCallFinished { call_id, success } => {
            eprintln!("  {} {call_id}", if *success { "✅" } else { "❌" });
        }
        SessionEvent::ApprovalRequired(request) => {
            eprintln!("\n? {} (/approve or /deny)", request.description);
        }
        SessionEvent::TurnCompleted { message } => {
            println!();
            for source in &message.sources {
                println!("  [{}] {}", source.title, source.url);
            }
        }
        SessionEvent::TurnFailed { message } => eprintln!("\n❌ {message}"),
        SessionEvent::SessionAssigned { chat_id } => eprintln!("(chat {chat_id})"),
        SessionEvent::ProtocolError { message } => tracing::debug!(error = %message, "frame dropped"),
        SessionEvent::Connected { resumed } => {
            eprintln!("{}", if *resumed { "(reconnected, resuming chat)" } else { "(connected)" });
        }
        SessionEvent::Disconnected { reason } => eprintln!("(disconnected: {reason})"),
        SessionEvent::Reconnecting { attempt, delay_ms } => {
            eprintln!("(reconnecting in {delay_ms} ms, attempt {attempt})");
        }
        SessionEvent::ConnectionError { message } => eprintln!("! {message}"),
        SessionEvent::Closed { reason } => {
            if let Some(reason) = reason {
                eprintln!("(session closed: {reason})");
            }
            return true;
        }
        SessionEvent::TurnStarted | SessionEvent::ApprovalResolved { .. } => {}
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_control_commands() {
        assert_eq!(InputCommand::parse("/approve"), InputCommand::Approve);
        assert_eq!(InputCommand::parse("  /deny "), InputCommand::Deny);
        assert_eq!(InputCommand::parse("/new"), InputCommand::NewChat);
        assert_eq!(InputCommand::parse("/resume"), InputCommand::Resume(None));
        assert_eq!(
            InputCommand::parse("/resume chat-3"),
            InputCommand::Resume(Some("chat-3".into()))
        );
        assert_eq!(InputCommand::parse(""), InputCommand::Empty);
        assert_eq!(
            InputCommand::parse("fix the tests"),
            InputCommand::Message("fix the tests".into())
        );
    }
}
