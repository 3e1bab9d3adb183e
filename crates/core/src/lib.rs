//! Core logic of the assistant: the conversation loop, tool dispatch, and
//! the events reported while a conversation runs.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

pub mod conversation;
mod error;
pub mod event;
mod model_client;
mod orchestrator;
pub mod tool;

pub use error::Error;
pub use model_client::RetryPolicy;
pub use orchestrator::{
    ChatRequest, DEFAULT_TURN_BUDGET, Orchestrator, OrchestratorBuilder,
};
pub use tool::Tool;
