//! Shared types for the studybuddy chat core: errors, configuration, the
//! conversation data model, and provider-agnostic message/stream types.

pub mod capability;
pub mod config;
pub mod conversation;
pub mod error;
pub mod stream;
pub mod tool;
pub mod trace;
