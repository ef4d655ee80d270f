//! Conversation persistence for studybuddy.
//!
//! [`ConversationStore`] is the contract the turn controller and the tool
//! layer depend on: append-only chat messages, pending actions awaiting
//! confirmation, and paged history. [`MemoryStore`] implements it in memory
//! with optional JSON snapshots on disk.

pub mod store;

pub use store::{ConversationStore, MemoryStore};
