//! Path command - print the location of a cached artifact

use crate::cli::args::QueryArgs;
use crate::cli::commands::{build_inputs, open_cache};
use crate::config::Config;
use crate::error::StowResult;

/// Execute the path command
pub fn execute(args: QueryArgs, config: &Config) -> StowResult<()> {
    let inputs = build_inputs(&args)?;
    let cache = open_cache(config)?;
    println!("{}", cache.file_in_cache(&inputs).display());
    Ok(())
}
