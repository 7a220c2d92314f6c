//! Chunk-wise sentiment scoring and aggregation.
//!
//! A document is preprocessed, split into chunks that fit the model's input
//! window, and every chunk is classified. Chunk distributions are averaged
//! into a document distribution, and document distributions are averaged
//! into one distribution for the whole corpus.

use crate::error::{Error, Result};
use crate::table;
use crate::types::{CleanedDocument, SentimentDistribution, SentimentReport};
use ndarray::Array1;
use std::path::Path;
use tracing::{debug, info, warn};

/// Slots the model adds around every sequence (`<s>` and `</s>` for RoBERTa)
pub const BOUNDARY_TOKENS: usize = 2;

/// A sequence classifier with its tokenizer.
///
/// Implemented by [`crate::model::SentimentModel`] for the ONNX model.
pub trait SentimentClassifier {
    /// Label names, indexed like the logits
    fn labels(&self) -> &[String];

    /// Longest sequence the model accepts, boundary tokens included
    fn max_length(&self) -> usize;

    /// Token ids for `text`, without boundary tokens
    fn tokenize(&self, text: &str) -> Result<Vec<u32>>;

    /// Text for a run of token ids
    fn detokenize(&self, ids: &[u32]) -> Result<String>;

    /// Raw logits for one chunk of text
    fn logits(&mut self, chunk: &str) -> Result<Vec<f32>>;
}

/// Replace mentions with `@user` and links with `http`
pub fn preprocess(text: &str) -> String {
    text.split_whitespace()
        .map(|token| {
            if token.starts_with('@') && token.len() > 1 {
                "@user"
            } else if token.starts_with("http") {
                "http"
            } else {
                token
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split `text` into contiguous chunks of at most `max_length - 2` tokens
pub fn chunk_text<C>(classifier: &C, text: &str) -> Result<Vec<String>>
where
    C: SentimentClassifier + ?Sized,
{
    let window = classifier
        .max_length()
        .checked_sub(BOUNDARY_TOKENS)
        .filter(|w| *w > 0)
        .ok_or_else(|| {
            Error::Config(format!(
                "max_length {} leaves no room for text",
                classifier.max_length()
            ))
        })?;

    let ids = classifier.tokenize(text)?;
    ids.chunks(window)
        .map(|chunk| classifier.detokenize(chunk))
        .collect()
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Result<Array1<f64>> {
    if logits.is_empty() {
        return Err(Error::Inference("model returned no logits".to_string()));
    }
    if logits.iter().any(|x| !x.is_finite()) {
        return Err(Error::Inference(format!(
            "model returned non-finite logits: {:?}",
            logits
        )));
    }

    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let exps: Array1<f64> = logits.iter().map(|&x| (x as f64 - max).exp()).collect();
    let sum = exps.sum();
    Ok(exps / sum)
}

/// Element-wise arithmetic mean; `None` for no rows
pub fn mean(rows: &[Array1<f64>]) -> Option<Array1<f64>> {
    let first = rows.first()?;
    let mut acc = Array1::<f64>::zeros(first.len());
    for row in rows {
        acc += row;
    }
    Some(acc / rows.len() as f64)
}

/// Probability distribution for one chunk
pub fn score_chunk<C>(classifier: &mut C, chunk: &str) -> Result<Array1<f64>>
where
    C: SentimentClassifier + ?Sized,
{
    let logits = classifier.logits(chunk)?;
    let expected = classifier.labels().len();
    if logits.len() != expected {
        return Err(Error::Inference(format!(
            "model produced {} logits for {} labels",
            logits.len(),
            expected
        )));
    }
    softmax(&logits)
}

/// Averaged distribution of one document
#[derive(Debug, Clone)]
pub struct DocumentScore {
    pub post_id: String,
    pub chunks: usize,
    pub probabilities: Array1<f64>,
}

/// Score one document; `None` if it has no text to classify
pub fn score_document<C>(
    classifier: &mut C,
    document: &CleanedDocument,
) -> Result<Option<DocumentScore>>
where
    C: SentimentClassifier + ?Sized,
{
    let text = preprocess(&document.text);
    let chunks = chunk_text(classifier, &text)?;

    let mut chunk_scores = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        chunk_scores.push(score_chunk(classifier, chunk)?);
    }

    let Some(probabilities) = mean(&chunk_scores) else {
        return Ok(None);
    };

    debug!(post_id = %document.post_id, chunks = chunks.len(), "scored document");
    Ok(Some(DocumentScore {
        post_id: document.post_id.clone(),
        chunks: chunks.len(),
        probabilities,
    }))
}

/// Score a corpus: mean over documents of the mean over their chunks.
///
/// Documents without text are skipped and do not count towards the mean.
/// Fails with [`Error::EmptyCorpus`] when nothing is left to average.
pub fn score_corpus<C>(
    classifier: &mut C,
    documents: &[CleanedDocument],
) -> Result<SentimentReport>
where
    C: SentimentClassifier + ?Sized,
{
    if documents.is_empty() {
        return Err(Error::EmptyCorpus);
    }

    let mut document_scores = Vec::with_capacity(documents.len());
    let mut skipped = 0;
    let mut chunks_scored = 0;
    for document in documents {
        match score_document(classifier, document)? {
            Some(score) => {
                chunks_scored += score.chunks;
                document_scores.push(score.probabilities);
            }
            None => {
                warn!(post_id = %document.post_id, "skipping document with no text");
                skipped += 1;
            }
        }
    }

    let corpus = mean(&document_scores).ok_or(Error::EmptyCorpus)?.to_vec();
    let distribution = SentimentDistribution::from_parts(classifier.labels(), &corpus)?;

    info!(
        documents = document_scores.len(),
        skipped,
        chunks = chunks_scored,
        "scored corpus"
    );
    Ok(SentimentReport {
        distribution,
        documents_scored: document_scores.len(),
        documents_skipped: skipped,
        chunks_scored,
        generated_at: chrono::Utc::now(),
    })
}

/// Corpus-level distribution over the model's labels
pub fn score<C>(classifier: &mut C, documents: &[CleanedDocument]) -> Result<SentimentDistribution>
where
    C: SentimentClassifier + ?Sized,
{
    Ok(score_corpus(classifier, documents)?.distribution)
}

/// Read a cleaned table and score it
pub fn score_table<C>(classifier: &mut C, path: &Path) -> Result<SentimentReport>
where
    C: SentimentClassifier + ?Sized,
{
    let documents = table::read_cleaned(path)?;
    score_corpus(classifier, &documents)
}
