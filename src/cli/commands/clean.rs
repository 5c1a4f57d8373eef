//! Clean command - delete the cache directory

use crate::cli::args::CleanArgs;
use crate::cli::commands::open_cache;
use crate::config::Config;
use crate::error::StowResult;
use crate::ui::{self, UiContext};

/// Execute the clean command
pub fn execute(args: CleanArgs, config: &Config) -> StowResult<()> {
    let ctx = UiContext::detect().with_auto_yes(args.yes);
    let cache = open_cache(config)?;
    let dir = cache.cache_dir().display().to_string();

    if !cache.cache_dir().exists() {
        ui::step_info(&ctx, &format!("Nothing to clean at {}", dir));
        return Ok(());
    }

    if !ui::confirm(&ctx, &format!("Delete cache directory {}?", dir), false)? {
        ui::step_warn_hint(&ctx, "Cache left untouched", "Use --yes to skip the prompt");
        return Ok(());
    }

    cache.delete()?;
    ui::step_ok_detail(&ctx, "Cache deleted", &dir);
    Ok(())
}
