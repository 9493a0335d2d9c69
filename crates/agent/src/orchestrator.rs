//! The orchestration loop.
//!
//! One call to [`Orchestrator::submit`] handles one user message:
//!
//! 1. **Stream** the assistant turn until the model stops or a block closes
//! 2. **Execute** every block found, one after another, in order
//! 3. **Resubmit** the formatted results as a user turn and stream again
//!
//! The loop ends when a stream finishes without a block, when the blocks it
//! produced are all malformed, when the iteration ceiling is reached, or on a
//! transport failure.

use clinicdesk_config::AppConfig;
use clinicdesk_core::action::{ActionRecord, ActionRegistry, ParsedBlock};
use clinicdesk_core::error::ProviderError;
use clinicdesk_core::message::{ConversationState, Message, Role, Turn};
use clinicdesk_core::provider::{Provider, ProviderRequest};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::parser::parse_blocks;
use crate::prompt;
use crate::results::format_results;
use crate::stream_consumer::{StreamOutcome, stream_until_block};
use crate::update::{ConversationObserver, ConversationUpdate, Phase, Termination};

pub const ITERATION_NOTICE: &str = "\n\n---\n\n*Maximum tool iterations reached. Please send a follow-up message if you need more actions.*";

pub const TRANSPORT_APOLOGY: &str = "Sorry, I encountered an error. Please try again.";

pub const DEFAULT_MAX_ITERATIONS: u32 = 9999;

/// Summary of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub termination: Termination,
    pub final_phase: Phase,
    /// Rounds of action execution
    pub iterations: u32,
    pub actions_executed: usize,
}

/// The conversation handed back after a run, and what happened.
#[derive(Debug)]
pub struct RunOutcome {
    pub conversation: ConversationState,
    pub report: RunReport,
}

/// Drives the stream → execute → resubmit cycle for a conversation.
pub struct Orchestrator {
    /// The model backend
    provider: Arc<dyn Provider>,

    /// Actions the model may request
    registry: Arc<ActionRegistry>,

    model: String,
    temperature: f32,
    max_tokens: Option<u32>,

    /// Instructions plus action catalog, sent ahead of every history
    system_prompt: String,

    /// Ceiling on execution rounds per user message
    max_iterations: u32,

    /// Wall-clock limit on a single stream
    iteration_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ActionRegistry>,
        model: impl Into<String>,
    ) -> Self {
        let system_prompt = prompt::system_prompt(None, &registry.specs());
        Self {
            provider,
            registry,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            system_prompt,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            iteration_timeout: None,
        }
    }

    /// Model, sampling, and assistant settings from the loaded config.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        registry: Arc<ActionRegistry>,
        config: &AppConfig,
    ) -> Self {
        Self::new(provider, registry, config.active_model())
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_max_iterations(config.assistant.max_iterations)
            .with_iteration_timeout(config.assistant.iteration_timeout())
            .with_instructions(config.assistant.system_prompt.as_deref())
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the maximum number of execution rounds per user message.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_iteration_timeout(mut self, limit: Option<Duration>) -> Self {
        self.iteration_timeout = limit;
        self
    }

    /// Replace the built-in instructions; the catalog is always appended.
    pub fn with_instructions(mut self, instructions: Option<&str>) -> Self {
        self.system_prompt = prompt::system_prompt(instructions, &self.registry.specs());
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// The model every request is sent to.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Run one user message to completion.
    ///
    /// Assumes no other run is in flight for `conversation`; callers that
    /// share conversations must serialise submissions.
    pub async fn submit(
        &self,
        conversation: ConversationState,
        user_text: impl Into<String>,
        observer: &dyn ConversationObserver,
    ) -> RunOutcome {
        let mut run = Run {
            conversation,
            observer,
            phase: Phase::Idle,
            iterations: 0,
            actions_executed: 0,
        };

        info!(
            conversation_id = %run.conversation.id,
            turns = run.conversation.len(),
            "Processing user message"
        );

        let user_turn = run.conversation.push(Turn::user(user_text));
        run.announce(&user_turn);

        let termination = loop {
            let history = run.conversation.history();
            let turn_id = run.conversation.push(Turn::assistant(""));
            run.emit(ConversationUpdate::TurnStarted {
                turn_id: turn_id.clone(),
                role: Role::Assistant,
            });
            run.set_phase(Phase::Streaming);

            let outcome = match self.stream_turn(history, &turn_id, observer).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        conversation_id = %run.conversation.id,
                        iteration = run.iterations,
                        error = %e,
                        "Model stream failed"
                    );
                    run.set_text(&turn_id, TRANSPORT_APOLOGY.to_string());
                    run.complete(&turn_id);
                    run.set_phase(Phase::Aborted);
                    break Termination::Failed {
                        message: e.to_string(),
                    };
                }
            };

            let StreamOutcome {
                text,
                stopped_for_block,
                ..
            } = outcome;
            run.set_text(&turn_id, text.clone());

            if !stopped_for_block {
                run.complete(&turn_id);
                run.set_phase(Phase::Done);
                break Termination::Done;
            }

            run.set_phase(Phase::BlockDetected);

            if run.iterations >= self.max_iterations {
                warn!(
                    conversation_id = %run.conversation.id,
                    iterations = run.iterations,
                    "Max tool iterations reached"
                );
                run.append_text(&turn_id, ITERATION_NOTICE);
                run.complete(&turn_id);
                run.set_phase(Phase::Aborted);
                break Termination::Exhausted;
            }

            let blocks = parse_blocks(&text);
            if blocks.is_empty() {
                debug!("Closed block held no usable params, finishing");
                run.complete(&turn_id);
                run.set_phase(Phase::Done);
                break Termination::Done;
            }

            run.iterations += 1;
            run.set_phase(Phase::Executing);
            let actions = self.execute(&mut run, &turn_id, &blocks).await;
            let results = format_results(&actions);
            if let Some(turn) = run.conversation.turn_mut(&turn_id) {
                turn.actions = actions;
            }
            run.complete(&turn_id);

            run.set_phase(Phase::Resubmitting);
            let results_turn = run
                .conversation
                .push(Turn::tool_results(results));
            run.announce(&results_turn);
        };

        let report = RunReport {
            termination,
            final_phase: run.phase,
            iterations: run.iterations,
            actions_executed: run.actions_executed,
        };
        run.emit(ConversationUpdate::Finished {
            termination: report.termination.clone(),
            iterations: report.iterations,
            actions_executed: report.actions_executed,
        });
        info!(
            conversation_id = %run.conversation.id,
            iterations = report.iterations,
            actions = report.actions_executed,
            termination = ?report.termination,
            "Run finished"
        );

        RunOutcome {
            conversation: run.conversation,
            report,
        }
    }

    async fn stream_turn(
        &self,
        history: Vec<Message>,
        turn_id: &str,
        observer: &dyn ConversationObserver,
    ) -> Result<StreamOutcome, ProviderError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(&self.system_prompt));
        messages.extend(history);

        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stop: vec![],
        };

        let on_delta = |text: &str, pending: Option<&str>| {
            observer.on_update(&ConversationUpdate::TurnText {
                turn_id: turn_id.to_string(),
                text: text.to_string(),
                pending_action: pending.map(str::to_string),
            });
        };
        let streaming = stream_until_block(self.provider.as_ref(), request, on_delta);

        match self.iteration_timeout {
            Some(limit) => tokio::time::timeout(limit, streaming)
                .await
                .unwrap_or_else(|_| {
                    Err(ProviderError::Timeout(format!(
                        "no complete response within {}s",
                        limit.as_secs()
                    )))
                }),
            None => streaming.await,
        }
    }

    /// Run every block's action sequentially, each to completion before the next starts.
    async fn execute(
        &self,
        run: &mut Run<'_>,
        turn_id: &str,
        blocks: &[ParsedBlock],
    ) -> Vec<ActionRecord> {
        let mut actions: Vec<ActionRecord> = blocks.iter().map(ActionRecord::pending).collect();
        for action in &actions {
            run.action_status(turn_id, action);
        }

        for action in &mut actions {
            action.start();
            run.action_status(turn_id, action);

            debug!(action = %action.name, id = %action.id, "Executing action");
            let result = self.registry.dispatch(&action.name, &action.parameters).await;
            if !result.succeeded {
                debug!(
                    action = %action.name,
                    error = result.error_message.as_deref().unwrap_or_default(),
                    "Action failed"
                );
            }

            action.finish(result);
            run.actions_executed += 1;
            run.action_status(turn_id, action);
        }

        actions
    }
}

/// Mutable state of one in-flight run.
struct Run<'a> {
    conversation: ConversationState,
    observer: &'a dyn ConversationObserver,
    phase: Phase,
    iterations: u32,
    actions_executed: usize,
}

impl Run<'_> {
    fn emit(&self, update: ConversationUpdate) {
        self.observer.on_update(&update);
    }

    fn set_phase(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, iteration = self.iterations, "Phase change");
        self.phase = phase;
        self.emit(ConversationUpdate::PhaseChanged {
            phase,
            iteration: self.iterations,
        });
    }

    fn set_text(&mut self, turn_id: &str, text: String) {
        if let Some(turn) = self.conversation.turn_mut(turn_id) {
            turn.text = text.clone();
        }
        self.emit(ConversationUpdate::TurnText {
            turn_id: turn_id.to_string(),
            text,
            pending_action: None,
        });
    }

    fn append_text(&mut self, turn_id: &str, suffix: &str) {
        let text = match self.conversation.turn(turn_id) {
            Some(turn) => format!("{}{suffix}", turn.text),
            None => suffix.to_string(),
        };
        self.set_text(turn_id, text);
    }

    fn complete(&self, turn_id: &str) {
        self.emit(ConversationUpdate::TurnCompleted {
            turn_id: turn_id.to_string(),
        });
    }

    /// Report a finished turn that was pushed whole.
    fn announce(&self, turn_id: &str) {
        let Some(turn) = self.conversation.turn(turn_id) else {
            return;
        };
        self.emit(ConversationUpdate::TurnStarted {
            turn_id: turn.id.clone(),
            role: turn.role,
        });
        self.emit(ConversationUpdate::TurnText {
            turn_id: turn.id.clone(),
            text: turn.text.clone(),
            pending_action: None,
        });
        self.complete(turn_id);
    }

    fn action_status(&self, turn_id: &str, action: &ActionRecord) {
        self.emit(ConversationUpdate::ActionStatus {
            turn_id: turn_id.to_string(),
            action_id: action.id.clone(),
            name: action.name.clone(),
            status: action.status,
            result: action.result.clone(),
        });
    }
}
