//! `leadstack-ops` — operational surface of the integration core.
//!
//! Each maintenance command is an ordinary library function over a
//! [`PlatformContext`]; the binary in `main.rs` is a thin `clap` layer that
//! maps subcommands to these functions and their results to exit codes.

pub mod cache;
pub mod cleanup;
pub mod context;
pub mod drain;
pub mod health;

pub use cache::{CacheClearReport, CacheKind, clear_cache};
pub use cleanup::{CleanupReport, cleanup_sagas};
pub use context::PlatformContext;
pub use drain::{DrainArgs, drain_queue};
pub use health::{
    Check, HealthArgs, HealthReport, Issue, IssueKind, ModuleFilter, validate_integrations,
};
