//! Runs the external collector that writes the raw table.
//!
//! The API clients live outside this crate; the collector is any command
//! that accepts the tag and writes a raw CSV table to the given path.

use crate::config::FetcherConfig;
use crate::error::{Error, Result};
use crate::table::temp_path;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// Names from `required` that are unset or empty according to `lookup`
pub fn missing_credentials<F>(required: &[String], lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    required
        .iter()
        .filter(|name| lookup(name.as_str()).map_or(true, |value| value.trim().is_empty()))
        .cloned()
        .collect()
}

/// Fail with every missing credential if any required variable is unset
pub fn check_credentials(required: &[String]) -> Result<()> {
    let missing = missing_credentials(required, |name| std::env::var(name).ok());
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingCredentials(missing))
    }
}

/// Substitute `{tag}`, `{limit}` and `{output}` in the collector's argv
pub fn expand_command(fetcher: &FetcherConfig, tag: &str, output: &Path) -> Vec<String> {
    let output = output.to_string_lossy();
    let limit = fetcher.limit.to_string();
    fetcher
        .command
        .iter()
        .map(|arg| {
            arg.replace("{tag}", tag)
                .replace("{limit}", &limit)
                .replace("{output}", &output)
        })
        .collect()
}

/// Check credentials, run the collector, and move its table to `output`
///
/// The collector writes to a staging file next to `output`; `output` is only
/// replaced when the collector exits cleanly and the staging file exists.
pub fn run_fetcher(fetcher: &FetcherConfig, tag: &str, output: &Path) -> Result<()> {
    check_credentials(&fetcher.required_env)?;

    let staging = temp_path(output)?;
    let argv = expand_command(fetcher, tag, &staging);
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::Config("Fetcher command must not be empty".to_string()))?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::remove_file(&staging) {
        Err(e) if e.kind() != ErrorKind::NotFound => return Err(Error::Io(e)),
        _ => {}
    }

    info!(tag, program = %program, "running collector");
    let result = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| Error::Fetch(format!("Failed to start {}: {}", program, e)))?;

    let stdout = String::from_utf8_lossy(&result.stdout);
    if !stdout.trim().is_empty() {
        debug!(output = %stdout.trim(), "collector stdout");
    }

    if !result.status.success() {
        let _ = std::fs::remove_file(&staging);
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(Error::Fetch(format!(
            "{} exited with {}: {}",
            program,
            result.status,
            stderr.trim()
        )));
    }

    if !staging.is_file() {
        return Err(Error::Fetch(format!(
            "No results found for tag '{}': collector wrote no table at {}",
            tag,
            staging.display()
        )));
    }

    std::fs::rename(&staging, output)?;
    debug!(path = %output.display(), "collector table in place");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn fetcher(command: &[&str]) -> FetcherConfig {
        FetcherConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
            limit: 7,
            required_env: vec![],
        }
    }

    #[test]
    fn test_missing_credentials() {
        let env: HashMap<&str, &str> = [("REDDIT_CLIENT_ID", "abc"), ("REDDIT_USER_AGENT", " ")]
            .into_iter()
            .collect();
        let required = vec![
            "REDDIT_CLIENT_ID".to_string(),
            "REDDIT_CLIENT_SECRET".to_string(),
            "REDDIT_USER_AGENT".to_string(),
        ];

        let missing = missing_credentials(&required, |name| env.get(name).map(|v| v.to_string()));
        assert_eq!(missing, vec!["REDDIT_CLIENT_SECRET", "REDDIT_USER_AGENT"]);
    }

    #[test]
    fn test_check_credentials_reports_all_missing() {
        let required = vec![
            "MARKET_PULSE_TEST_UNSET_A".to_string(),
            "MARKET_PULSE_TEST_UNSET_B".to_string(),
        ];
        let err = check_credentials(&required).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing API credentials: MARKET_PULSE_TEST_UNSET_A, MARKET_PULSE_TEST_UNSET_B"
        );
    }

    #[test]
    fn test_expand_command() {
        let cfg = fetcher(&["python", "fetch.py", "--tag", "{tag}", "--limit={limit}", "{output}"]);
        let argv = expand_command(&cfg, "gpt-5", Path::new("/data/raw/social_data_gpt-5.csv"));
        assert_eq!(
            argv,
            vec![
                "python",
                "fetch.py",
                "--tag",
                "gpt-5",
                "--limit=7",
                "/data/raw/social_data_gpt-5.csv"
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_run_fetcher_writes_table() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("raw").join("social_data_rust.csv");
        let cfg = fetcher(&[
            "sh",
            "-c",
            "printf 'source,type,post_id,author,text,url\\n' > \"$0\"",
            "{output}",
        ]);

        run_fetcher(&cfg, "rust", &output).unwrap();
        assert!(output.is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_fetcher_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.csv");
        let cfg = fetcher(&["sh", "-c", "echo rate limited >&2; exit 3"]);

        let err = run_fetcher(&cfg, "rust", &output).unwrap_err();
        assert!(matches!(err, Error::Fetch(ref msg) if msg.contains("rate limited")));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_fetcher_without_output_is_no_results() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.csv");
        let cfg = fetcher(&["true"]);

        let err = run_fetcher(&cfg, "rust", &output).unwrap_err();
        assert!(matches!(err, Error::Fetch(ref msg) if msg.contains("No results")));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_fetcher_ignores_table_from_earlier_run() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("social_data_demo.csv");
        let stale = "source,type,post_id,author,text,url\nReddit,post,old,a,yesterday's post,u\n";
        std::fs::write(&output, stale).unwrap();
        let cfg = fetcher(&["true"]);

        let err = run_fetcher(&cfg, "demo", &output).unwrap_err();
        assert!(matches!(err, Error::Fetch(ref msg) if msg.contains("No results")));
        // the earlier table is left alone, but the run does not succeed on it
        assert_eq!(std::fs::read_to_string(&output).unwrap(), stale);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_fetcher_replaces_earlier_table() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("social_data_demo.csv");
        std::fs::write(&output, "stale").unwrap();
        let cfg = fetcher(&["sh", "-c", "printf 'fresh' > \"$0\"", "{output}"]);

        run_fetcher(&cfg, "demo", &output).unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "fresh");
        assert!(!dir.path().join(".social_data_demo.csv.tmp").exists());
    }

    #[test]
    fn test_run_fetcher_checks_credentials_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = fetcher(&["definitely-not-a-real-command"]);
        cfg.required_env = vec!["MARKET_PULSE_TEST_UNSET_C".to_string()];

        let err = run_fetcher(&cfg, "rust", &dir.path().join("out.csv")).unwrap_err();
        assert!(matches!(err, Error::MissingCredentials(ref names) if names.len() == 1));
    }
}
