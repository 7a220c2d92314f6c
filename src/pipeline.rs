//! Orchestrates fetch, clean and score for one tag.
//!
//! Every stage completes before the next starts. The first failure stops the
//! run and comes back as a [`PipelineError`] naming the stage.

use crate::cleaner;
use crate::config::Config;
use crate::error::{Error, PipelineError, Stage, StageExt};
use crate::fetch;
use crate::model::SentimentModel;
use crate::sentiment::{self, SentimentClassifier};
use crate::terms;
use crate::types::{CleanedDocument, SentimentReport};
use std::path::PathBuf;
use tracing::info;

type StageResult<T> = std::result::Result<T, PipelineError>;

/// Knobs for a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Run the configured collector before cleaning
    pub fetch: bool,
    /// Number of word-cloud terms to report; 0 skips the term table
    pub top_terms: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            fetch: true,
            top_terms: 0,
        }
    }
}

/// Cleaned documents for a tag and where they live on disk
#[derive(Debug, Clone)]
pub struct PreparedCorpus {
    pub tag: String,
    pub raw_path: PathBuf,
    pub cleaned_path: PathBuf,
    pub documents: Vec<CleanedDocument>,
}

/// Everything a run produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub corpus: PreparedCorpus,
    pub report: SentimentReport,
    pub terms: Vec<(String, usize)>,
}

/// Main processor for a tag's social data
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Make sure the raw table for `tag` exists, running the collector if configured
    pub fn fetch(&self, tag: &str) -> StageResult<PathBuf> {
        let raw_path = self.config.raw_table_path(tag).in_stage(Stage::Fetch)?;

        match &self.config.fetcher {
            Some(fetcher) => {
                fetch::run_fetcher(fetcher, tag, &raw_path).in_stage(Stage::Fetch)?;
            }
            None if !raw_path.is_file() => {
                return Err(PipelineError::new(
                    Stage::Fetch,
                    Error::Fetch(format!(
                        "No collector configured and no raw table at {}",
                        raw_path.display()
                    )),
                ));
            }
            None => info!(path = %raw_path.display(), "using existing raw table"),
        }

        Ok(raw_path)
    }

    /// Clean the raw table for `tag` into its cleaned table
    pub fn clean(&self, tag: &str) -> StageResult<PreparedCorpus> {
        let raw_path = self.config.raw_table_path(tag).in_stage(Stage::Clean)?;
        let cleaned_path = self.config.cleaned_table_path(tag).in_stage(Stage::Clean)?;

        if let Some(parent) = cleaned_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(Error::from)
                .in_stage(Stage::Clean)?;
        }
        let documents = cleaner::clean_table(&raw_path, &cleaned_path).in_stage(Stage::Clean)?;

        Ok(PreparedCorpus {
            tag: tag.to_string(),
            raw_path,
            cleaned_path,
            documents,
        })
    }

    /// Fetch (optionally) and clean
    pub fn prepare(&self, tag: &str, options: RunOptions) -> StageResult<PreparedCorpus> {
        if options.fetch {
            self.fetch(tag)?;
        }
        self.clean(tag)
    }

    /// Score a prepared corpus with an already loaded classifier
    pub fn score_with<C>(
        &self,
        corpus: &PreparedCorpus,
        classifier: &mut C,
    ) -> StageResult<SentimentReport>
    where
        C: SentimentClassifier + ?Sized,
    {
        sentiment::score_corpus(classifier, &corpus.documents).in_stage(Stage::Score)
    }

    /// Word-cloud term table for a prepared corpus
    pub fn terms(&self, corpus: &PreparedCorpus, top: usize) -> Vec<(String, usize)> {
        terms::term_frequencies(&corpus.documents, &self.config.stopwords, top)
    }

    /// Full run with the configured pretrained model
    pub fn run(&self, tag: &str, options: RunOptions) -> StageResult<PipelineOutput> {
        let corpus = self.prepare(tag, options)?;
        let mut model = SentimentModel::load(&self.config.model).in_stage(Stage::Score)?;
        self.finish(corpus, &mut model, options)
    }

    /// Full run with a caller-supplied classifier
    pub fn run_with<C>(
        &self,
        tag: &str,
        options: RunOptions,
        classifier: &mut C,
    ) -> StageResult<PipelineOutput>
    where
        C: SentimentClassifier + ?Sized,
    {
        let corpus = self.prepare(tag, options)?;
        self.finish(corpus, classifier, options)
    }

    fn finish<C>(
        &self,
        corpus: PreparedCorpus,
        classifier: &mut C,
        options: RunOptions,
    ) -> StageResult<PipelineOutput>
    where
        C: SentimentClassifier + ?Sized,
    {
        let report = self.score_with(&corpus, classifier)?;
        let terms = if options.top_terms > 0 {
            self.terms(&corpus, options.top_terms)
        } else {
            Vec::new()
        };

        info!(tag = %corpus.tag, documents = report.documents_scored, "pipeline finished");
        Ok(PipelineOutput {
            corpus,
            report,
            terms,
        })
    }
}
