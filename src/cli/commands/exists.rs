//! Exists command - check for a valid cache entry

use crate::cli::args::QueryArgs;
use crate::cli::commands::{build_inputs, open_cache};
use crate::config::Config;
use crate::error::StowResult;

/// Execute the exists command
pub fn execute(args: QueryArgs, config: &Config) -> StowResult<()> {
    let inputs = build_inputs(&args)?;
    let exists = config.cache.enabled && open_cache(config)?.cache_entry_exists(&inputs)?;
    println!("{}", exists);
    Ok(())
}
