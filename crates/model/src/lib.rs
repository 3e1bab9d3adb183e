//! An abstraction layer for the chat model backends.
//!
//! This crate establishes a unified protocol for the orchestrator to talk
//! to any supported chat-completions backend, so that the conversation
//! loop never depends on a concrete wire format.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
