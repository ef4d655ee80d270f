//! Tools for the studybuddy chat core.
//!
//! - [`registry`]: name → handler map and the executor the turn loop calls
//! - [`compact`]: generic size bounding for tool results
//! - [`shaping`]: per-tool compaction, citation, and fallback rules
//! - [`mutation`]: applies confirmed pending actions
//! - [`demo`]: in-memory data and handlers backing the CLI

pub mod compact;
pub mod demo;
pub mod mutation;
pub mod registry;
pub mod shaping;

pub use mutation::MutationExecutor;
pub use registry::{ToolContext, ToolHandler, ToolOutcome, ToolRegistry};
pub use shaping::{ShaperRegistry, ToolShaper};
