//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Stow - content-addressed artifact cache
///
/// Runs a command only when its declared inputs changed, reusing the
/// artifact it produced last time otherwise.
#[derive(Parser, Debug)]
#[command(name = "stow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "STOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache directory (overrides cache.directory)
    #[arg(long, global = true, env = "STOW_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Produce an artifact through the cache
    Run(RunArgs),

    /// Check whether a valid cache entry exists
    Exists(QueryArgs),

    /// Print where the cached artifact for the inputs lives
    Path(QueryArgs),

    /// Delete the whole cache directory
    Clean(CleanArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Inputs identifying one cache entry
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Cache namespace the inputs belong to
    #[arg(long = "command", value_name = "NAMESPACE")]
    pub namespace: String,

    /// Input parameter as KIND:NAME=VALUE, in order.
    /// KIND is one of path, hash, stat, str, bool, long.
    #[arg(short, long = "input", value_name = "KIND:NAME=VALUE", required = true, value_parser = parse_input_param)]
    pub inputs: Vec<InputParam>,
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Where the artifact should end up (default: produce it inside the cache)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Producer program and arguments. Receives the target path in STOW_OUTPUT.
    #[arg(last = true, required = true)]
    pub program: Vec<String>,
}

/// Arguments for the clean command
#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., cache.locking)
        key: String,
        /// Value to set
        value: String,
    },
}

/// Output format for query results
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}

/// One typed input parameter from the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputParam {
    pub name: String,
    pub value: InputValue,
}

/// Value of an input parameter, by kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputValue {
    /// File path, compared textually
    Path(PathBuf),
    /// SHA-256 of the file's contents
    Hash(PathBuf),
    /// Path, length and mtime of the file
    Stat(PathBuf),
    Str(String),
    Bool(bool),
    Long(i64),
}

/// Parse an input parameter in KIND:NAME=VALUE format
fn parse_input_param(s: &str) -> Result<InputParam, String> {
    let (kind, rest) = s
        .split_once(':')
        .ok_or_else(|| format!("invalid KIND:NAME=VALUE format: no ':' found in '{s}'"))?;
    let (name, raw) = rest
        .split_once('=')
        .ok_or_else(|| format!("invalid KIND:NAME=VALUE format: no '=' found in '{s}'"))?;

    let value = match kind {
        "path" => InputValue::Path(PathBuf::from(raw)),
        "hash" => InputValue::Hash(PathBuf::from(raw)),
        "stat" => InputValue::Stat(PathBuf::from(raw)),
        "str" => InputValue::Str(raw.to_string()),
        "bool" => InputValue::Bool(
            raw.parse()
                .map_err(|_| format!("invalid boolean '{raw}': use true/false"))?,
        ),
        "long" => InputValue::Long(
            raw.parse()
                .map_err(|_| format!("invalid integer '{raw}'"))?,
        ),
        other => {
            return Err(format!(
                "unknown input kind '{other}': use path, hash, stat, str, bool or long"
            ))
        }
    };

    Ok(InputParam {
        name: name.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_input_param_kinds() {
        let param = parse_input_param("path:file=src/a.txt").unwrap();
        assert_eq!(param.name, "file");
        assert_eq!(param.value, InputValue::Path(PathBuf::from("src/a.txt")));

        let param = parse_input_param("bool:optimize=false").unwrap();
        assert_eq!(param.value, InputValue::Bool(false));

        let param = parse_input_param("long:minSdk=-21").unwrap();
        assert_eq!(param.value, InputValue::Long(-21));
    }

    #[test]
    fn parse_input_param_value_with_separators() {
        let param = parse_input_param("str:flags=a=b:c").unwrap();
        assert_eq!(param.name, "flags");
        assert_eq!(param.value, InputValue::Str("a=b:c".to_string()));
    }

    #[test]
    fn parse_input_param_invalid() {
        assert!(parse_input_param("file=a").is_err());
        assert!(parse_input_param("path:file").is_err());
        assert!(parse_input_param("blob:file=a").is_err());
        assert!(parse_input_param("bool:x=maybe").is_err());
        assert!(parse_input_param("long:x=1.5").is_err());
    }

    #[test]
    fn cli_parses_run() {
        let cli = Cli::parse_from([
            "stow",
            "run",
            "--command",
            "TEST",
            "-i",
            "path:file=input",
            "-i",
            "str:mode=fast",
            "--output",
            "out.txt",
            "--",
            "sh",
            "-c",
            "echo hi > \"$STOW_OUTPUT\"",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.query.namespace, "TEST");
                assert_eq!(args.query.inputs.len(), 2);
                assert_eq!(args.query.inputs[1].name, "mode");
                assert_eq!(args.output, Some(PathBuf::from("out.txt")));
                assert!(matches!(args.format, OutputFormat::Text));
                assert_eq!(args.program[0], "sh");
                assert_eq!(args.program.len(), 3);
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_run_requires_program_and_inputs() {
        assert!(Cli::try_parse_from(["stow", "run", "--command", "TEST", "-i", "str:a=b"]).is_err());
        assert!(Cli::try_parse_from(["stow", "run", "--command", "TEST", "--", "true"]).is_err());
    }

    #[test]
    fn cli_parses_exists() {
        let cli = Cli::parse_from(["stow", "exists", "--command", "TEST", "-i", "bool:x=true"]);
        match cli.command {
            Commands::Exists(args) => {
                assert_eq!(args.inputs[0].value, InputValue::Bool(true));
            }
            _ => panic!("expected Exists command"),
        }
    }

    #[test]
    fn cli_parses_clean() {
        let cli = Cli::parse_from(["stow", "clean", "--yes"]);
        match cli.command {
            Commands::Clean(args) => assert!(args.yes),
            _ => panic!("expected Clean command"),
        }
    }

    #[test]
    fn cli_global_cache_dir() {
        let cli = Cli::parse_from(["stow", "clean", "--cache-dir", "/tmp/stow"]);
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/stow")));
    }

    #[test]
    fn cli_verbose_levels() {
        let cli = Cli::parse_from(["stow", "config"]);
        assert_eq!(cli.verbose, 0);

        let cli = Cli::parse_from(["stow", "-v", "config"]);
        assert_eq!(cli.verbose, 1);

        let cli = Cli::parse_from(["stow", "-vv", "config"]);
        assert_eq!(cli.verbose, 2);
    }
}
