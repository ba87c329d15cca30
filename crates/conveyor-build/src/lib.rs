//! Build pipelines: an ordered list of spawned external commands with
//! short-circuit-on-error chaining.
//!
//! Unlike the review fan-out, build steps share a working directory and run
//! strictly in sequence. Step output streams into a progress log, and an
//! error finder over that output can fail a step whose process exited zero.

pub mod builder;
pub mod progress_log;
pub mod spawn;

pub use builder::{AppInfo, BuildGoalExecutor, BuildHandle, BuildStatus, Builder, SpawnBuilder};
pub use progress_log::{InMemoryProgressLog, ProgressLog};
pub use spawn::{
    failure_on_nonzero, failure_on_pattern, spawn_and_watch, ErrorFinder, SpawnCommand,
    SpawnResult,
};
