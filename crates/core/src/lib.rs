//! Reconstruction engine for multi-agent chat sessions.
//!
//! Replays an append-only, per-session event stream into display rows,
//! delegation groups, conversational turns and session timers.

pub mod activity;
pub mod delegation;
pub mod event;
pub mod jsonl;
pub mod merge;
pub mod options;
pub mod rows;
pub mod stream;
pub mod timer;
pub mod turns;
pub mod view;

pub use activity::ActivitySignal;
pub use delegation::{DelegationGroup, DelegationStatus};
pub use event::{Event, EventKind, FinishReason};
pub use options::ReconstructOptions;
pub use rows::{Row, RowKind, ToolResult};
pub use stream::{EventLog, IngestOutcome};
pub use timer::{AgentTimer, GlobalTimer, SessionTimers};
pub use turns::{ModelLabel, Turn};
pub use view::{SessionView, reconstruct_tree};

#[cfg(any(test, feature = "testing"))]
pub mod testing;
