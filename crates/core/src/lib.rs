//! # clinicdesk core
//!
//! Domain types, traits, and error definitions for the clinic assistant.
//! This crate has **no framework dependencies**: it defines the domain model
//! that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Each collaborator of the assistant (model backend, record store, action
//! executors) is a trait here. Implementations live in their own crates so
//! they can be swapped via configuration and replaced by mocks in tests.

pub mod action;
pub mod error;
pub mod message;
pub mod provider;
pub mod record;

// Re-export key types at crate root for ergonomics
pub use action::{
    Action, ActionRecord, ActionRegistry, ActionSpec, ActionStatus, Params, ParsedBlock,
    ToolResult,
};
pub use error::{ActionError, Error, ProviderError, Result, StoreError};
pub use message::{ConversationId, ConversationState, Message, Role, Turn, TurnKind};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk, Usage};
pub use record::{RecordStore, Resource, ResourceKind};
