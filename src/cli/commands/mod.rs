//! CLI command implementations

pub mod clean;
pub mod config;
pub mod exists;
pub mod path;
pub mod run;

pub use clean::execute as clean;
pub use config::execute as config;
pub use exists::execute as exists;
pub use path::execute as path;
pub use run::execute as run;

use crate::cache::{FileCache, Inputs};
use crate::cli::args::{InputValue, QueryArgs};
use crate::config::Config;
use crate::error::StowResult;

/// Build cache inputs from command-line parameters, in order
pub(crate) fn build_inputs(args: &QueryArgs) -> StowResult<Inputs> {
    let mut builder = Inputs::builder(args.namespace.as_str());
    for param in &args.inputs {
        let name = param.name.as_str();
        builder = match &param.value {
            InputValue::Path(path) => builder.put_file_path(name, path),
            InputValue::Hash(path) => builder.put_file_hash(name, path)?,
            InputValue::Stat(path) => builder.put_file_path_length_timestamp(name, path)?,
            InputValue::Str(value) => builder.put_string(name, value.as_str()),
            InputValue::Bool(value) => builder.put_bool(name, *value),
            InputValue::Long(value) => builder.put_long(name, *value),
        };
    }
    builder.build()
}

/// Open the configured cache
pub(crate) fn open_cache(config: &Config) -> StowResult<FileCache> {
    FileCache::new(&config.cache_dir(), config.cache.locking)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::InputParam;
    use std::path::PathBuf;

    #[test]
    fn inputs_follow_argument_order() {
        let args = QueryArgs {
            namespace: "TEST".to_string(),
            inputs: vec![
                InputParam {
                    name: "file".to_string(),
                    value: InputValue::Path(PathBuf::from("input")),
                },
                InputParam {
                    name: "jumbo".to_string(),
                    value: InputValue::Bool(true),
                },
                InputParam {
                    name: "minSdk".to_string(),
                    value: InputValue::Long(21),
                },
            ],
        };
        let inputs = build_inputs(&args).unwrap();
        assert_eq!(
            inputs.canonical_string(),
            "COMMAND=TEST\nfile=input\njumbo=true\nminSdk=21"
        );
    }

    #[test]
    fn missing_hash_input_fails() {
        let args = QueryArgs {
            namespace: "TEST".to_string(),
            inputs: vec![InputParam {
                name: "file".to_string(),
                value: InputValue::Hash(PathBuf::from("/definitely/not/here")),
            }],
        };
        assert!(build_inputs(&args).unwrap_err().is_configuration());
    }
}
