//! Terminal output helpers
//!
//! Uses `cliclack` styling in interactive terminals and plain bracketed
//! prefixes (`[OK]`, `[WARN]`, ...) when output is piped or running in CI.

mod context;
mod output;
mod prompts;

pub use context::UiContext;
pub use output::{
    key_value, remark, step_info, step_ok, step_ok_detail, step_warn_hint,
};
pub use prompts::confirm;
