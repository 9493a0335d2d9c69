//! The assistant loop: the heart of clinicdesk.
//!
//! The orchestrator follows a **Stream → Execute → Resubmit** cycle:
//!
//! 1. **Receive** a user message and append it to the conversation
//! 2. **Stream** the model's reply, watching for an action block
//! 3. **Cancel** the stream the moment a block closes
//! 4. **Execute** each requested action in order against the record store
//! 5. **Resubmit** the results as a user turn and loop back to step 2
//!
//! The loop continues until the model replies without a block or the
//! iteration ceiling is reached. Every transition is reported to a
//! [`ConversationObserver`].

pub mod display;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod results;
pub mod stream_consumer;
pub mod update;

#[cfg(test)]
mod testing;

pub use display::{RenderedTurn, action_title, render};
pub use orchestrator::{Orchestrator, RunOutcome, RunReport};
pub use parser::{BlockScanner, has_unclosed_block, parse_blocks, peek_action_name};
pub use stream_consumer::{StreamOutcome, stream_until_block};
pub use update::{
    ChannelObserver, ConversationObserver, ConversationUpdate, NoopObserver, Phase, Termination,
};
