//! Integration tests for Stow

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn stow(home: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("stow");
        cmd.env("STOW_CONFIG", home.path().join("config.toml"))
            .env("STOW_CACHE_DIR", home.path().join("cache"));
        cmd
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        stow(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("content-addressed artifact cache"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        stow(&home)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("stow"));
    }

    #[test]
    fn config_path() {
        let home = TempDir::new().unwrap();
        stow(&home)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let home = TempDir::new().unwrap();
        stow(&home)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("multi-process"));
    }

    #[test]
    fn config_init_and_set() {
        let home = TempDir::new().unwrap();
        stow(&home).args(["config", "init"]).assert().success();
        assert!(home.path().join("config.toml").is_file());

        stow(&home)
            .args(["config", "set", "cache.locking", "single-process"])
            .assert()
            .success();
        stow(&home)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("locking = \"single-process\""));
    }

    #[test]
    fn config_set_unknown_key() {
        let home = TempDir::new().unwrap();
        stow(&home)
            .args(["config", "set", "cache.size", "10"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let home = TempDir::new().unwrap();
        std::fs::write(home.path().join("config.toml"), "[cache\n").unwrap();
        stow(&home)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));

        // init --force repairs it
        stow(&home)
            .args(["config", "init", "--force"])
            .assert()
            .success();
        stow(&home).args(["config", "show"]).assert().success();
    }

    #[test]
    fn path_is_inside_cache_dir() {
        let home = TempDir::new().unwrap();
        stow(&home)
            .args(["path", "--command", "TEST", "-i", "path:file=input"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cache"))
            .stdout(predicate::str::ends_with("artifact\n"));
    }

    #[test]
    fn exists_on_empty_cache() {
        let home = TempDir::new().unwrap();
        stow(&home)
            .args(["exists", "--command", "TEST", "-i", "str:a=b"])
            .assert()
            .success()
            .stdout("false\n");
    }

    #[test]
    fn hash_input_requires_file() {
        let home = TempDir::new().unwrap();
        stow(&home)
            .args(["exists", "--command", "TEST", "-i", "hash:src=missing.txt"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("is not a file"));
    }

    #[test]
    fn bad_input_param_rejected() {
        let home = TempDir::new().unwrap();
        stow(&home)
            .args(["exists", "--command", "TEST", "-i", "blob:a=b"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("unknown input kind"));
    }

    #[test]
    fn clean_without_cache() {
        let home = TempDir::new().unwrap();
        stow(&home)
            .args(["clean", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing to clean"));
    }
}

#[cfg(unix)]
mod run_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const WRITE_X: &str = "printf X > \"$STOW_OUTPUT\"";

    fn stow(home: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("stow");
        cmd.env("STOW_CONFIG", home.path().join("config.toml"))
            .env("STOW_CACHE_DIR", home.path().join("cache"));
        cmd
    }

    fn run_with_output(home: &TempDir, output: &Path, script: &str) -> Command {
        let mut cmd = stow(home);
        cmd.args(["run", "--command", "TEST", "-i", "path:file=input", "-o"])
            .arg(output)
            .args(["--", "sh", "-c", script]);
        cmd
    }

    #[test]
    fn miss_then_hit() {
        let home = TempDir::new().unwrap();
        let output_a = home.path().join("out/a");
        let output_b = home.path().join("out/b");

        run_with_output(&home, &output_a, WRITE_X)
            .assert()
            .success()
            .stdout(predicate::str::contains("event: missed"));
        assert_eq!(fs::read_to_string(&output_a).unwrap(), "X");

        // A hit must not run the producer
        run_with_output(&home, &output_b, "exit 1")
            .assert()
            .success()
            .stdout(predicate::str::contains("event: hit"));
        assert_eq!(fs::read_to_string(&output_b).unwrap(), "X");

        stow(&home)
            .args(["exists", "--command", "TEST", "-i", "path:file=input"])
            .assert()
            .success()
            .stdout("true\n");
    }

    #[test]
    fn json_result() {
        let home = TempDir::new().unwrap();
        let assert = stow(&home)
            .args([
                "run", "--command", "TEST", "-i", "str:a=b", "--format", "json", "--", "sh", "-c",
            ])
            .arg(format!("echo noise; {}", WRITE_X))
            .assert()
            .success();

        let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
        let result: serde_json::Value = serde_json::from_str(&stdout).unwrap();
        assert_eq!(result["event"], "missed");
        let cached = result["cached_file"].as_str().unwrap();
        assert_eq!(fs::read_to_string(cached).unwrap(), "X");
    }

    #[test]
    fn failing_producer_leaves_no_entry() {
        let home = TempDir::new().unwrap();
        let output = home.path().join("out");

        run_with_output(&home, &output, "printf partial > \"$STOW_OUTPUT\"; exit 7")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Artifact producer failed"));

        stow(&home)
            .args(["exists", "--command", "TEST", "-i", "path:file=input"])
            .assert()
            .success()
            .stdout("false\n");

        run_with_output(&home, &output, WRITE_X)
            .assert()
            .success()
            .stdout(predicate::str::contains("event: missed"));
    }

    #[test]
    fn output_in_cache_dir_rejected() {
        let home = TempDir::new().unwrap();
        let cache_dir = home.path().join("cache");

        run_with_output(&home, &cache_dir.join("out"), WRITE_X)
            .assert()
            .failure()
            .stderr(predicate::str::contains("must not be located in the cache directory"));
        run_with_output(&home, home.path(), WRITE_X)
            .assert()
            .failure()
            .stderr(predicate::str::contains("must not contain the cache directory"));
        run_with_output(&home, &cache_dir, WRITE_X)
            .assert()
            .failure()
            .stderr(predicate::str::contains("must not be the same as the cache directory"));

        assert!(!cache_dir.exists());
    }

    #[test]
    fn clean_deletes_cache() {
        let home = TempDir::new().unwrap();
        run_with_output(&home, &home.path().join("out"), WRITE_X)
            .assert()
            .success();
        assert!(home.path().join("cache").is_dir());

        stow(&home)
            .args(["clean", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cache deleted"));
        assert!(!home.path().join("cache").exists());
    }

    #[test]
    fn disabled_cache_always_runs_producer() {
        let home = TempDir::new().unwrap();
        fs::write(home.path().join("config.toml"), "[cache]\nenabled = false\n").unwrap();
        let counter = home.path().join("counter");
        let script = format!("echo run >> '{}'; {}", counter.display(), WRITE_X);

        for _ in 0..2 {
            run_with_output(&home, &home.path().join("out"), &script)
                .assert()
                .success();
        }
        assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 2);
        assert!(!home.path().join("cache").exists());
    }

    #[test]
    fn concurrent_processes_run_producer_once() {
        const PROCESSES: usize = 4;
        let home = TempDir::new().unwrap();
        let counter = home.path().join("counter");
        let script = format!(
            "echo run >> '{}'; sleep 0.3; {}",
            counter.display(),
            WRITE_X
        );

        std::thread::scope(|s| {
            for i in 0..PROCESSES {
                let (home, script) = (&home, &script);
                s.spawn(move || {
                    let output = home.path().join(format!("out-{}", i));
                    run_with_output(home, &output, script).assert().success();
                    assert_eq!(fs::read_to_string(&output).unwrap(), "X");
                });
            }
        });

        assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 1);
    }
}
