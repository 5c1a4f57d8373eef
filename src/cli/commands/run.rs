//! Run command - produce an artifact through the cache

use crate::cache::QueryResult;
use crate::cli::args::{OutputFormat, RunArgs};
use crate::cli::commands::{build_inputs, open_cache};
use crate::config::Config;
use crate::error::{StowError, StowResult};
use crate::fsutil;
use crate::ui::{self, UiContext};
use std::io;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// Environment variable telling the producer where to write
pub const OUTPUT_ENV: &str = "STOW_OUTPUT";

/// Execute the run command
pub fn execute(args: RunArgs, config: &Config) -> StowResult<()> {
    let inputs = build_inputs(&args.query)?;
    let (program, program_args) = args
        .program
        .split_first()
        .ok_or_else(|| StowError::User("No producer command given".to_string()))?;
    let producer = |target: &Path| run_producer(program, program_args, target);

    if !config.cache.enabled {
        let output = args.output.as_deref().ok_or_else(|| {
            StowError::User("--output is required while the cache is disabled".to_string())
        })?;
        info!("Cache disabled, running producer directly");
        fsutil::delete_path(output)?;
        fsutil::ensure_parent_dir(output)?;
        return producer(output);
    }

    let cache = open_cache(config)?;
    let result = match &args.output {
        Some(output) => cache.create_file(output, &inputs, producer)?,
        None => cache.create_file_in_cache_if_absent(&inputs, producer)?,
    };
    debug!("Cache hits: {}, misses: {}", cache.hits(), cache.misses());

    print_result(&result, args.format)
}

/// Spawn the producer with its target path in the environment.
///
/// The producer's stdout is sent to our stderr so that stdout carries
/// only the query result.
fn run_producer(program: &str, args: &[String], target: &Path) -> StowResult<()> {
    debug!("Running producer {} for {}", program, target.display());

    let status = Command::new(program)
        .args(args)
        .env(OUTPUT_ENV, target)
        .stdout(io::stderr())
        .status()
        .map_err(|e| StowError::command_failed(program, e))?;

    if !status.success() {
        return Err(StowError::command_exec(program, status.to_string()));
    }
    Ok(())
}

fn print_result(result: &QueryResult, format: OutputFormat) -> StowResult<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
        OutputFormat::Text => {
            let ctx = UiContext::detect();
            ui::key_value(&ctx, "event", &result.event().to_string());
            ui::key_value(&ctx, "cached", &result.cached_file().display().to_string());
            if let Some(cause) = result.cause_of_corruption() {
                ui::step_warn_hint(&ctx, "Cache entry was corrupted", &cause.to_string());
            }
        }
    }
    Ok(())
}
