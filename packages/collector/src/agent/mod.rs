//! Agent runtime, tools and prompts.

pub mod prompts;
pub mod runtime;
pub mod tools;

pub use runtime::{AgentOutcome, AgentRunner, AgentSpec, Termination};
pub use tools::{
    crawler_toolset, crawler_toolset_with_downloads, ItemAccumulator, SharedAccumulator,
};
