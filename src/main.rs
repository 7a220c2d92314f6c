use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use market_pulse::config::{load_config_file, ConfigBuilder};
use market_pulse::error::StageExt;
use market_pulse::prelude::*;
use market_pulse::{cleaner, sentiment, table, terms, SentimentModel};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "market-pulse.yml";

/// Fetch, clean and score social posts for a tag
#[derive(Parser, Debug)]
#[command(name = "market-pulse")]
#[command(about = "Score the aggregate sentiment of social posts for a tag")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,

    #[command(flatten)]
    global: GlobalArgs,
}

/// Options for the full pipeline (`market-pulse <tag>`)
#[derive(ClapArgs, Debug)]
struct RunArgs {
    /// Tag to analyse, e.g. gpt-5
    tag: Option<String>,

    /// Use the existing raw table instead of running the collector
    #[arg(long)]
    skip_fetch: bool,

    /// Items the collector fetches per platform
    #[arg(long)]
    limit: Option<usize>,

    /// Also print the N most frequent words (word-cloud input)
    #[arg(long, default_value_t = 0)]
    terms: usize,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(ClapArgs, Debug)]
struct GlobalArgs {
    /// Configuration file (default: ./market-pulse.yml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding raw/ and cleaned/ tables (default: ./data, or MARKET_PULSE_DIR env var)
    #[arg(long = "data-dir", global = true)]
    data_dir: Option<PathBuf>,

    /// Model cache directory (default: $HOME/.market-pulse/models, or MARKET_PULSE_MODEL_DIR env var)
    #[arg(long = "model-dir", global = true)]
    model_dir: Option<PathBuf>,

    /// Show debug logs
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Clean a raw table into one document per post
    Clean {
        /// Raw table (source,type,post_id,author,text,url)
        input: PathBuf,
        /// Destination for the cleaned table (post_id,text)
        output: PathBuf,
    },

    /// Score a cleaned table with the pretrained model
    Score {
        /// Cleaned table (post_id,text)
        cleaned: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the most frequent words of a cleaned table
    Terms {
        /// Cleaned table (post_id,text)
        cleaned: PathBuf,

        /// Number of terms to list
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
}

#[derive(Serialize)]
struct TermCount<'a> {
    term: &'a str,
    count: usize,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    tag: &'a str,
    cleaned_table: &'a Path,
    report: &'a SentimentReport,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    terms: Vec<TermCount<'a>>,
}

fn print_available_commands() {
    println!("Usage: market-pulse <tag> [OPTIONS]");
    println!();
    println!("Available commands:");
    println!("  <tag>   Fetch, clean and score social posts for a tag");
    println!("  clean   Clean a raw table into one document per post");
    println!("  score   Score a cleaned table with the pretrained model");
    println!("  terms   List the most frequent words of a cleaned table");
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "market_pulse=debug" } else { "market_pulse=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(global: &GlobalArgs) -> anyhow::Result<Config> {
    let mut builder = ConfigBuilder::new();

    // Config file first, then environment, then flags
    let config_path = global.config.clone().or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.is_file().then_some(default)
    });
    if let Some(path) = config_path {
        builder = builder.file(load_config_file(&path)?);
    }

    if let Ok(dir) = std::env::var("MARKET_PULSE_DIR") {
        builder = builder.data_dir(dir);
    }
    if let Ok(dir) = std::env::var("MARKET_PULSE_MODEL_DIR") {
        builder = builder.cache_dir(dir);
    }

    if let Some(dir) = &global.data_dir {
        builder = builder.data_dir(dir);
    }
    if let Some(dir) = &global.model_dir {
        builder = builder.cache_dir(dir);
    }

    Ok(builder.build()?)
}

fn print_report(report: &SentimentReport) {
    println!("Overall average sentiment scores:");
    for (label, score) in report.distribution.iter() {
        println!("{}: {:.4}", label, score);
    }
    println!(
        "Scored {} documents ({} skipped, {} chunks)",
        report.documents_scored, report.documents_skipped, report.chunks_scored
    );
}

fn print_terms(terms: &[(String, usize)]) {
    println!("Top terms:");
    for (term, count) in terms {
        println!("  {}: {}", term, count);
    }
}

fn run_pipeline(run: RunArgs, global: &GlobalArgs) -> anyhow::Result<()> {
    let Some(tag) = run.tag else {
        print_available_commands();
        return Ok(());
    };

    let mut config = build_config(global)?;
    if let Some(limit) = run.limit {
        match config.fetcher.as_mut() {
            _ if run.skip_fetch => anyhow::bail!("--limit has no effect with --skip-fetch"),
            Some(fetcher) => fetcher.limit = limit,
            None => anyhow::bail!(
                "--limit needs a collector; set fetcher.command in {}",
                DEFAULT_CONFIG_FILE
            ),
        }
    }

    let pipeline = Pipeline::new(config);
    let options = RunOptions {
        fetch: !run.skip_fetch,
        top_terms: run.terms,
    };
    let output = pipeline.run(&tag, options)?;

    if run.json {
        let summary = RunSummary {
            tag: &tag,
            cleaned_table: &output.corpus.cleaned_path,
            report: &output.report,
            terms: output
                .terms
                .iter()
                .map(|(term, count)| TermCount { term, count: *count })
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Filtered CSV saved to {}", output.corpus.cleaned_path.display());
        print_report(&output.report);
        if !output.terms.is_empty() {
            print_terms(&output.terms);
        }
    }

    Ok(())
}

fn run_clean_command(input: &Path, output: &Path) -> anyhow::Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let documents = cleaner::clean_table(input, output).in_stage(Stage::Clean)?;
    println!(
        "Filtered CSV saved to {} ({} documents)",
        output.display(),
        documents.len()
    );
    Ok(())
}

fn run_score_command(cleaned: &Path, json: bool, global: &GlobalArgs) -> anyhow::Result<()> {
    let config = build_config(global)?;
    let mut model = SentimentModel::load(&config.model).in_stage(Stage::Score)?;
    let report = sentiment::score_table(&mut model, cleaned).in_stage(Stage::Score)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn run_terms_command(cleaned: &Path, top: usize, global: &GlobalArgs) -> anyhow::Result<()> {
    let config = build_config(global)?;
    let documents = table::read_cleaned(cleaned).in_stage(Stage::Terms)?;
    let terms = terms::term_frequencies(&documents, &config.stopwords, top);
    print_terms(&terms);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.global.verbose);

    // API credentials for the collector may live in .env
    dotenvy::dotenv().ok();

    match args.command {
        Some(Command::Clean { input, output }) => run_clean_command(&input, &output),
        Some(Command::Score { cleaned, json }) => run_score_command(&cleaned, json, &args.global),
        Some(Command::Terms { cleaned, top }) => run_terms_command(&cleaned, top, &args.global),
        None => run_pipeline(args.run, &args.global),
    }
}
