use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::error;

use leadstack_ops::{
    CacheKind, Check, DrainArgs, HealthArgs, ModuleFilter, PlatformContext, cleanup_sagas,
    clear_cache, drain_queue, validate_integrations,
};

#[derive(Parser)]
#[command(name = "leadstack-ops")]
#[command(about = "Maintenance commands for the Leadstack integration core.")]
struct Cli {
    /// Log at info level instead of warnings only.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process pending events; fails if any event errors
    DrainQueue {
        #[arg(long, default_value_t = 100)]
        limit: usize,
        #[arg(long, default_value_t = 300)]
        timeout_seconds: u64,
        /// Also process events past the stale threshold
        #[arg(long)]
        force: bool,
    },
    /// Check integration health and report issues
    ValidateIntegrations {
        /// Restrict to one module, or "all"
        #[arg(long, default_value = "all")]
        module: ModuleFilter,
        #[arg(long = "type", value_enum, default_value_t = Check::All)]
        check: Check,
        /// Apply safe remediations before reporting
        #[arg(long)]
        fix: bool,
    },
    /// Delete terminal sagas past the 30-day retention window
    CleanupSagas,
    /// Discard cached state
    ClearCache {
        #[arg(long = "type", value_enum, default_value_t = CacheKind::All)]
        kind: CacheKind,
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    leadstack_observability::init_with_default(if cli.verbose { "info" } else { "warn" });

    // A long-lived deployment would hand an already-populated context in
    // here; the binary builds a fresh one and operates on it.
    let ctx = PlatformContext::new();
    match run(&cli.command, &ctx) {
        Ok(code) => code,
        Err(e) => {
            error!(error = ?e, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn run(command: &Command, ctx: &PlatformContext) -> anyhow::Result<ExitCode> {
    match command {
        Command::DrainQueue {
            limit,
            timeout_seconds,
            force,
        } => {
            let report = drain_queue(
                ctx,
                DrainArgs {
                    limit: *limit,
                    timeout: Duration::from_secs(*timeout_seconds),
                    force: *force,
                },
            );
            print_json(&report)?;
            Ok(exit_if(report.errors == 0))
        }
        Command::ValidateIntegrations { module, check, fix } => {
            let report = validate_integrations(
                ctx,
                HealthArgs {
                    module: *module,
                    check: *check,
                    fix: *fix,
                },
            );
            print_json(&report)?;
            Ok(exit_if(report.healthy()))
        }
        Command::CleanupSagas => {
            let report = cleanup_sagas(ctx);
            print_json(&report)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::ClearCache { kind, force } => {
            if !force && !confirmed(*kind)? {
                println!("aborted");
                return Ok(ExitCode::SUCCESS);
            }
            let report = clear_cache(ctx, *kind);
            print_json(&report)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn confirmed(kind: CacheKind) -> anyhow::Result<bool> {
    print!("clear {kind:?} caches? queued events and cached decisions are discarded [y/N] ");
    io::stdout().flush().context("flushing confirmation prompt")?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("reading confirmation")?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn print_json(report: &impl serde::Serialize) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("serializing report")?;
    println!("{json}");
    Ok(())
}

fn exit_if(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
