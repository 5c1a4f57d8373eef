//! Config command - show or edit configuration

use crate::cache::LockingScope;
use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, LogFormat};
use crate::error::{StowError, StowResult};
use crate::ui::{self, UiContext};
use std::path::PathBuf;

const VALID_KEYS: [&str; 4] = [
    "general.log_format",
    "cache.enabled",
    "cache.directory",
    "cache.locking",
];

/// Execute the config command
pub fn execute(args: ConfigArgs, manager: &ConfigManager, config: &Config) -> StowResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force)?,
        Some(ConfigAction::Set { key, value }) => set_value(manager, config, &key, &value)?,
    }

    Ok(())
}

fn show_config(config: &Config) -> StowResult<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn init_config(manager: &ConfigManager, force: bool) -> StowResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default())?;
    ui::step_ok_detail(
        &ctx,
        "Configuration initialized",
        &path.display().to_string(),
    );

    Ok(())
}

fn set_value(manager: &ConfigManager, config: &Config, key: &str, value: &str) -> StowResult<()> {
    let ctx = UiContext::detect();
    let mut config = config.clone();
    apply(&mut config, key, value).inspect_err(|_| {
        if !VALID_KEYS.contains(&key) {
            ui::remark(&ctx, &format!("Valid keys: {}", VALID_KEYS.join(", ")));
        }
    })?;

    manager.save(&config)?;
    ui::step_ok(&ctx, &format!("Set {} = {}", key, value));
    Ok(())
}

/// Apply one dot-separated key to `config`
fn apply(config: &mut Config, key: &str, value: &str) -> StowResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "log_format"] => config.general.log_format = parse_log_format(value)?,
        ["cache", "enabled"] => config.cache.enabled = parse_bool(value)?,
        ["cache", "directory"] => config.cache.directory = Some(PathBuf::from(value)),
        ["cache", "locking"] => config.cache.locking = parse_locking(value)?,
        _ => return Err(StowError::User(format!("Unknown config key: {}", key))),
    }
    Ok(())
}

fn parse_bool(value: &str) -> StowResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(StowError::User(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}

fn parse_log_format(value: &str) -> StowResult<LogFormat> {
    match value {
        "text" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        _ => Err(StowError::User(format!(
            "Invalid log format: {}. Use text/json",
            value
        ))),
    }
}

fn parse_locking(value: &str) -> StowResult<LockingScope> {
    match value {
        "multi-process" => Ok(LockingScope::MultiProcess),
        "single-process" => Ok(LockingScope::SingleProcess),
        _ => Err(StowError::User(format!(
            "Invalid locking scope: {}. Use multi-process/single-process",
            value
        ))),
    }
}
