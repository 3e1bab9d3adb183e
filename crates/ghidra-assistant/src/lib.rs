//! A reverse engineering assistant that answers questions about binaries
//! analyzed by a Ghidra backend.
//!
//! The crate wires the analysis tools and an OpenAI-compatible model into
//! the conversation loop of [`ghidra_assistant_core`], and exposes it over
//! HTTP. It ships a server binary, and can also be used as a library.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod assistant;
pub mod backend;
pub mod config;
pub mod server;
pub mod tools;

pub use assistant::{Assistant, AssistantBuilder, SYSTEM_PROMPT};

/// Re-exports of [`ghidra_assistant_core`] crate.
pub mod core {
    pub use ghidra_assistant_core::*;
}
