use std::fs;
use std::path::Path;
use std::process::{Command, Output};

/// Run the binary inside `dir` with an isolated home
fn run_cli(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_market-pulse"))
        .args(args)
        .current_dir(dir)
        .env("HOME", dir)
        .env("MARKET_PULSE_MODEL_DIR", dir.join("models"))
        .env_remove("MARKET_PULSE_DIR")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run market-pulse")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

const SCENARIO: &str = "source,type,post_id,author,text,url\n\
    Reddit,post,p1,u/alice,I love it http://x.com,https://reddit.com/p1\n\
    Reddit,comment,p1,u/bob,great stuff,https://reddit.com/p1\n\
    Reddit,post,p2,u/carol,bad experience,https://reddit.com/p2\n";

#[test]
fn test_no_arguments_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_cli(dir.path(), &[]);

    assert!(output.status.success());
    insta::assert_snapshot!(stdout(&output).trim_end(), @r"
    Usage: market-pulse <tag> [OPTIONS]

    Available commands:
      <tag>   Fetch, clean and score social posts for a tag
      clean   Clean a raw table into one document per post
      score   Score a cleaned table with the pretrained model
      terms   List the most frequent words of a cleaned table
    ");
}

#[test]
fn test_clean_command() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("raw.csv"), SCENARIO).unwrap();

    let output = run_cli(dir.path(), &["clean", "raw.csv", "out/cleaned.csv"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("(2 documents)"));

    let cleaned = fs::read_to_string(dir.path().join("out").join("cleaned.csv")).unwrap();
    assert_eq!(
        cleaned,
        "post_id,text\np1,I love it  great stuff\np2,bad experience\n"
    );
}

#[test]
fn test_clean_command_reports_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("raw.csv"), "source,author\nReddit,u/a\n").unwrap();

    let output = run_cli(dir.path(), &["clean", "raw.csv", "cleaned.csv"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("clean stage failed"), "stderr: {err}");
    assert!(err.contains("missing required columns"), "stderr: {err}");
    assert!(!dir.path().join("cleaned.csv").exists());
}

#[test]
fn test_terms_command() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("cleaned.csv"),
        "post_id,text\np1,Rust is fast and Rust is safe\np2,fast builds\n",
    )
    .unwrap();

    let output = run_cli(dir.path(), &["terms", "cleaned.csv", "--top", "3"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    insta::assert_snapshot!(stdout(&output).trim_end(), @r"
    Top terms:
      fast: 2
      rust: 2
      builds: 1
    ");
}

#[test]
fn test_tag_without_raw_table_fails_with_stage() {
    let dir = tempfile::tempdir().unwrap();

    let output = run_cli(dir.path(), &["nothing-here", "--skip-fetch", "--data-dir", "data"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("clean stage failed"), "stderr: {err}");
}

#[test]
fn test_tag_without_collector_fails_in_fetch_stage() {
    let dir = tempfile::tempdir().unwrap();

    let output = run_cli(dir.path(), &["nothing-here"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("fetch stage failed"), "stderr: {err}");
    assert!(err.contains("No collector configured"), "stderr: {err}");
}

#[test]
fn test_invalid_tag_is_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let output = run_cli(dir.path(), &["../escape", "--skip-fetch"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("path separators"));
}

#[test]
fn test_limit_without_collector_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("data").join("raw")).unwrap();
    fs::write(dir.path().join("data").join("raw").join("social_data_demo.csv"), SCENARIO).unwrap();

    let output = run_cli(dir.path(), &["demo", "--limit", "3"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("--limit needs a collector"), "stderr: {err}");
    assert!(!dir.path().join("data").join("cleaned").exists());

    let output = run_cli(dir.path(), &["demo", "--skip-fetch", "--limit", "3"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("--limit has no effect with --skip-fetch"));
}
