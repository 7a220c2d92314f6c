//! Sentiment pulse for a social-media tag.
//!
//! This library cleans collected posts into one document per post, scores
//! them chunk by chunk with a pretrained classifier, and averages the scores
//! into a single sentiment distribution for the tag.

pub mod cleaner;
pub mod config;
pub mod error;
pub mod fetch;
pub mod model;
pub mod pipeline;
pub mod sentiment;
pub mod table;
pub mod terms;
pub mod types;

pub use cleaner::{clean, clean_table, remove_urls};
pub use config::{Config, ConfigBuilder, FetcherConfig, ModelConfig};
pub use error::{Error, PipelineError, Result, Stage};
pub use model::SentimentModel;
pub use pipeline::{Pipeline, PipelineOutput, PreparedCorpus, RunOptions};
pub use sentiment::{score, score_corpus, SentimentClassifier};
pub use types::{
    CleanedDocument, PostType, RawRow, SentimentDistribution, SentimentReport, Source,
};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{Config, ConfigBuilder};
    pub use crate::error::{Error, PipelineError, Result, Stage};
    pub use crate::pipeline::{Pipeline, RunOptions};
    pub use crate::sentiment::SentimentClassifier;
    pub use crate::types::{CleanedDocument, RawRow, SentimentDistribution, SentimentReport};
}
