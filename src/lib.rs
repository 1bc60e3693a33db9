//! `legal-swarm` runtime library.
//!
//! Five specialist legal agents (`legal`) chained by a linear flow (`flow`,
//! `rearrange`), each a named system prompt plus model parameters (`agent`)
//! executed against a blocking model backend (`provider`). The same backend
//! serves the chat, translation and document-analysis surfaces exposed by the
//! `legal-swarm` CLI and its JSON API (`server`).
//!
//! Invariants:
//! - agent descriptors and the flow are built once and never mutated
//! - flows are strictly linear; every step names a known agent
//! - an unknown agent selector yields a sentinel string, not an error

pub mod agent;
pub mod analysis;
pub mod chat;
pub mod config;
pub mod error;
pub mod flow;
pub mod install;
pub mod legal;
pub mod plan;
pub mod prompt;
pub mod provider;
pub mod rearrange;
pub mod server;
pub mod state;
pub mod trace;
pub mod translate;
