//! Agent execution: the think -> act -> observe loop and its wrappers.
//!
//! [`runner::Agent`] is the core loop; [`sub_agent::SubAgent`] adds the
//! specialization, priority, and concurrency attributes the
//! [`crate::routing::TaskRouter`] selects on. [`events`] defines the
//! streaming event protocol and the one-way progress callback.

pub mod events;
pub mod memory;
pub mod runner;
pub mod sub_agent;

pub use events::{AgentEvent, AgentProgress, ProgressFn};
pub use runner::{Agent, AgentResult, ResultMetadata, DEFAULT_MAX_ITERATIONS};
pub use sub_agent::{AgentLoad, SubAgent, DEFAULT_MAX_CONCURRENT, DEFAULT_PRIORITY};
