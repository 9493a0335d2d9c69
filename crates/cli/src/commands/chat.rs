//! `clinicdesk chat`: interactive or single-message assistant chat.

use anyhow::Context;
use clinicdesk_agent::{
    ConversationObserver, ConversationUpdate, Orchestrator, RunReport, Termination, action_title,
    render,
};
use clinicdesk_config::AppConfig;
use clinicdesk_core::action::ActionStatus;
use clinicdesk_core::message::{ConversationState, Role};
use clinicdesk_core::record::RecordStore;
use clinicdesk_store::{FileRecordStore, HttpRecordStore};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

pub async fn run(message: Option<String>, server: Option<String>) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;

    let (store, records): (Arc<dyn RecordStore>, String) = match server {
        Some(url) => (Arc::new(HttpRecordStore::new(&url)), url),
        None => (
            Arc::new(FileRecordStore::new(&config.store.data_dir)),
            config.store.data_dir.clone(),
        ),
    };

    let provider = clinicdesk_providers::build_from_config(&config)
        .context("Failed to configure model provider")?
        .default()
        .context("No default provider configured")?;
    let registry = Arc::new(clinicdesk_actions::default_registry(store));
    let orchestrator = Orchestrator::from_config(provider, registry, &config);

    if let Some(msg) = message {
        let printer = TerminalPrinter::default();
        let outcome = orchestrator
            .submit(ConversationState::new(), msg, &printer)
            .await;
        println!();
        log_report(&outcome.report);
        if let Termination::Failed { message } = outcome.report.termination {
            anyhow::bail!("Assistant failed: {message}");
        }
        return Ok(());
    }

    println!();
    println!("  clinicdesk assistant (interactive mode)");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", orchestrator.model());
    println!("  Records:   {records}");
    println!("  Actions:   {}", orchestrator.registry().len());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut conversation = ConversationState::new();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q") {
            break;
        }

        let printer = TerminalPrinter::default();
        let outcome = orchestrator.submit(conversation, line, &printer).await;
        log_report(&outcome.report);
        conversation = outcome.conversation;
        println!("\n");
    }

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}

fn log_report(report: &RunReport) {
    match &report.termination {
        Termination::Failed { message } => warn!(
            iterations = report.iterations,
            error = %message,
            "Assistant run failed"
        ),
        termination => debug!(
            iterations = report.iterations,
            actions = report.actions_executed,
            termination = ?termination,
            "Assistant run finished"
        ),
    }
}

/// Tracks how much of the current assistant turn has been shown.
#[derive(Default)]
struct Echo {
    turn_id: Option<String>,
    shown: String,
}

impl Echo {
    fn start(&mut self, turn_id: &str) {
        self.turn_id = Some(turn_id.to_string());
        self.shown.clear();
    }

    /// What to print for the latest text of the current turn, if anything.
    ///
    /// Growth prints only the new suffix. Text that shrank back to a prefix
    /// of what is shown prints nothing. Anything else (the apology that
    /// replaces a failed stream) is reprinted whole.
    fn advance(&mut self, turn_id: &str, text: &str) -> Option<Fresh> {
        if self.turn_id.as_deref() != Some(turn_id) {
            return None;
        }
        let body = render(text).body;
        if self.shown.starts_with(body.as_str()) {
            return None;
        }
        let fresh = match body.strip_prefix(self.shown.as_str()) {
            Some(suffix) => Fresh::Append(suffix.to_string()),
            None => Fresh::Replace(body.clone()),
        };
        self.shown = body;
        Some(fresh)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Fresh {
    Append(String),
    Replace(String),
}

/// Prints assistant text as it streams, plus one line per action transition.
#[derive(Default)]
struct TerminalPrinter {
    echo: Mutex<Echo>,
}

impl ConversationObserver for TerminalPrinter {
    fn on_update(&self, update: &ConversationUpdate) {
        let Ok(mut echo) = self.echo.lock() else {
            return;
        };
        match update {
            ConversationUpdate::TurnStarted {
                turn_id,
                role: Role::Assistant,
            } => {
                echo.start(turn_id);
                print!("\n  Assistant > ");
            }
            ConversationUpdate::TurnText { turn_id, text, .. } => {
                match echo.advance(turn_id, text) {
                    Some(Fresh::Append(suffix)) => print!("{suffix}"),
                    Some(Fresh::Replace(body)) => print!("\n  Assistant > {body}"),
                    None => {}
                }
            }
            ConversationUpdate::ActionStatus {
                name,
                status,
                result,
                ..
            } => match status {
                ActionStatus::Executing => print!("\n  [..] {}", action_title(name)),
                ActionStatus::Success => print!("\n  [ok] {}", action_title(name)),
                ActionStatus::Error => {
                    let reason = result
                        .as_ref()
                        .and_then(|r| r.error_message.as_deref())
                        .unwrap_or("failed");
                    print!("\n  [!!] {}: {reason}", action_title(name));
                }
                ActionStatus::Pending => {}
            },
            _ => {}
        }
        let _ = std::io::stdout().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinicdesk_agent::orchestrator::TRANSPORT_APOLOGY;

    #[test]
    fn echo_prints_only_new_visible_text() {
        let mut echo = Echo::default();
        echo.start("t1");

        assert_eq!(echo.advance("t1", "Hel"), Some(Fresh::Append("Hel".into())));
        assert_eq!(echo.advance("t1", "Hello"), Some(Fresh::Append("lo".into())));
        assert_eq!(echo.advance("t1", "Hello"), None);
    }

    #[test]
    fn echo_hides_action_blocks() {
        let mut echo = Echo::default();
        echo.start("t1");

        assert_eq!(
            echo.advance("t1", "Booking."),
            Some(Fresh::Append("Booking.".into()))
        );
        assert_eq!(echo.advance("t1", "Booking.\n<tool_block><params>{\"tool\":"), None);
        assert_eq!(
            echo.advance(
                "t1",
                "Booking.\n<tool_block><params>{\"tool\":\"x\"}</params></tool_block>"
            ),
            None
        );
    }

    #[test]
    fn echo_reprints_replaced_text() {
        let mut echo = Echo::default();
        echo.start("t1");

        assert!(echo.advance("t1", "Let me look that up").is_some());
        assert_eq!(
            echo.advance("t1", TRANSPORT_APOLOGY),
            Some(Fresh::Replace(TRANSPORT_APOLOGY.into()))
        );
        assert_eq!(echo.advance("t1", TRANSPORT_APOLOGY), None);
    }

    #[test]
    fn echo_keeps_text_that_only_shrank() {
        let mut echo = Echo::default();
        echo.start("t1");

        assert!(echo.advance("t1", "Checking <tool_bl").is_some());
        assert_eq!(echo.advance("t1", "Checking <tool_block>"), None);
    }

    #[test]
    fn echo_ignores_other_turns() {
        let mut echo = Echo::default();
        echo.start("t2");
        assert_eq!(echo.advance("t1", "stale"), None);
    }
}
