use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Platform a raw row was collected from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "Reddit")]
    Reddit,
    #[serde(rename = "X (Twitter)", alias = "Twitter")]
    Twitter,
}

/// Kind of social item a raw row holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Post,
    Comment,
    Tweet,
}

/// One post, comment or tweet as written by the collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub source: Source,
    #[serde(rename = "type")]
    pub kind: PostType,
    /// Shared by a post and all of its comments
    pub post_id: String,
    pub author: String,
    pub text: String,
    pub url: String,
}

/// All text belonging to one post, URL-stripped and space-joined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanedDocument {
    pub post_id: String,
    pub text: String,
}

impl CleanedDocument {
    pub fn new(post_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            post_id: post_id.into(),
            text: text.into(),
        }
    }
}

/// Probability per sentiment label, in the model's label order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SentimentDistribution {
    scores: IndexMap<String, f64>,
}

impl SentimentDistribution {
    /// Pair labels with probabilities by index
    pub fn from_parts(labels: &[String], probabilities: &[f64]) -> Result<Self> {
        if labels.len() != probabilities.len() {
            return Err(Error::Inference(format!(
                "model produced {} scores for {} labels",
                probabilities.len(),
                labels.len()
            )));
        }
        let scores = labels
            .iter()
            .cloned()
            .zip(probabilities.iter().copied())
            .collect();
        Ok(Self { scores })
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.scores.get(label).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.scores.iter().map(|(label, score)| (label.as_str(), *score))
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Sum of all probabilities; 1.0 up to rounding
    pub fn total(&self) -> f64 {
        self.scores.values().sum()
    }

    /// Label with the highest probability
    pub fn dominant(&self) -> Option<(&str, f64)> {
        self.iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }
}

/// Corpus-level result of a scoring run
#[derive(Debug, Clone, Serialize)]
pub struct SentimentReport {
    pub distribution: SentimentDistribution,
    pub documents_scored: usize,
    /// Documents with no text left to classify
    pub documents_skipped: usize,
    pub chunks_scored: usize,
    pub generated_at: DateTime<Utc>,
}
