use std::time::Duration;

use leadstack_events::{DrainOptions, DrainReport};

use crate::context::PlatformContext;

#[derive(Debug, Copy, Clone)]
pub struct DrainArgs {
    pub limit: usize,
    pub timeout: Duration,
    /// Also process events past the stale threshold.
    pub force: bool,
}

impl Default for DrainArgs {
    fn default() -> Self {
        Self {
            limit: 100,
            timeout: Duration::from_secs(300),
            force: false,
        }
    }
}

/// Drain the pending event queue. Succeeds (exit 0) only if every processed
/// event was handled without error.
pub fn drain_queue(ctx: &PlatformContext, args: DrainArgs) -> DrainReport {
    ctx.dispatcher.process_queue(DrainOptions {
        limit: args.limit,
        timeout: args.timeout,
        force: args.force,
    })
}
