//! studybuddy chat core: the agentic turn controller and its collaborators.
//!
//! - [`turn`]: [`ChatRuntime::send_message`], the round loop and streaming
//! - [`actions`] / [`action_flow`]: confirm/cancel parsing and resolution
//! - [`fallback`]: replies synthesized from tool data
//! - [`citations`]: per-turn citation dedup
//! - [`compress`]: history summarization
//! - [`autocapture`]: recurring-intent habit proposals
//! - [`cli`]: the `studybuddy` binary's commands

pub mod action_flow;
pub mod actions;
pub mod autocapture;
pub mod bootstrap;
pub mod cache;
pub mod citations;
pub mod cli;
pub mod compress;
pub mod fallback;
pub mod stream;
pub mod turn;

pub use cache::SessionCache;
pub use turn::{ChatRuntime, TurnEvent, TurnInput, TurnOutcome};
