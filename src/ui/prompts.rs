//! Interactive prompts with CI/non-interactive fallback

use super::context::UiContext;
use crate::error::{StowError, StowResult};

/// Prompt for confirmation, returns default if non-interactive or auto-yes
pub fn confirm(ctx: &UiContext, message: &str, default: bool) -> StowResult<bool> {
    // Auto-yes mode bypasses prompts
    if ctx.auto_yes() {
        return Ok(true);
    }

    // Non-interactive mode returns default
    if !ctx.is_interactive() {
        return Ok(default);
    }

    cliclack::confirm(message)
        .initial_value(default)
        .interact()
        .map_err(|e| StowError::User(format!("Prompt failed: {}", e)))
}
