//! Pretrained sentiment classifier backed by ONNX Runtime.
//!
//! Artifacts (`tokenizer.json`, `config.json` and the ONNX graph) are pulled
//! from a model hub on first use and cached on disk. The model is loaded once
//! per run and handed to the scoring functions in [`crate::sentiment`].

use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::sentiment::SentimentClassifier;
use crate::table::write_atomic;
use ort::session::{Session, SessionInputValue};
use ort::value::Value;
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokenizers::tokenizer::{Tokenizer, TruncationDirection, TruncationParams, TruncationStrategy};
use tracing::{debug, info, warn};

const TOKENIZER_FILE: &str = "tokenizer.json";
const CONFIG_FILE: &str = "config.json";

/// The parts of a hub `config.json` the classifier needs
#[derive(Debug, Deserialize)]
struct HubModelConfig {
    id2label: BTreeMap<String, String>,
    #[serde(default)]
    max_position_embeddings: Option<usize>,
    #[serde(default)]
    pad_token_id: Option<usize>,
    #[serde(default)]
    model_type: Option<String>,
}

/// Architectures whose position ids start after the padding index
const PADDING_OFFSET_MODELS: [&str; 4] = ["roberta", "xlm-roberta", "camembert", "longformer"];

impl HubModelConfig {
    /// Token positions the model can actually embed
    fn usable_positions(&self) -> Option<usize> {
        let limit = self.max_position_embeddings?;
        let offset = match (self.model_type.as_deref(), self.pad_token_id) {
            (Some(kind), Some(pad)) if PADDING_OFFSET_MODELS.contains(&kind) => pad + 1,
            _ => 0,
        };
        Some(limit.saturating_sub(offset))
    }

    fn clamp_max_length(&self, max_length: usize) -> usize {
        match self.usable_positions() {
            Some(limit) if max_length > limit => {
                warn!(max_length, limit, "max_length exceeds model positions, clamping");
                limit
            }
            _ => max_length,
        }
    }
}

/// Label names ordered by class index
pub fn labels_from_config(contents: &str) -> Result<Vec<String>> {
    let config: HubModelConfig = serde_json::from_str(contents)
        .map_err(|e| Error::ModelLoad(format!("Invalid model config: {}", e)))?;
    ordered_labels(&config.id2label)
}

fn ordered_labels(id2label: &BTreeMap<String, String>) -> Result<Vec<String>> {
    let mut indexed = Vec::with_capacity(id2label.len());
    for (key, label) in id2label {
        let idx: usize = key
            .parse()
            .map_err(|_| Error::ModelLoad(format!("Label index '{}' is not a number", key)))?;
        indexed.push((idx, label.clone()));
    }
    indexed.sort_by_key(|(idx, _)| *idx);

    if indexed.is_empty() {
        return Err(Error::ModelLoad("Model config defines no labels".to_string()));
    }
    for (expected, (idx, _)) in indexed.iter().enumerate() {
        if *idx != expected {
            return Err(Error::ModelLoad(format!(
                "Label indices are not contiguous: missing {}",
                expected
            )));
        }
    }
    Ok(indexed.into_iter().map(|(_, label)| label).collect())
}

/// Local paths of a model's files
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub onnx: PathBuf,
    pub tokenizer: PathBuf,
    pub config: PathBuf,
}

/// Download URL of a file in the model repository
pub fn artifact_url(config: &ModelConfig, file: &str) -> String {
    format!(
        "{}/{}/resolve/{}/{}",
        config.endpoint.trim_end_matches('/'),
        config.repo,
        config.revision,
        file
    )
}

/// Cache directory for one repository revision
pub fn model_cache_dir(config: &ModelConfig) -> PathBuf {
    config
        .cache_dir
        .join(config.repo.replace('/', "--"))
        .join(&config.revision)
}

/// Make sure every artifact is in the cache, downloading what is missing
pub fn ensure_artifacts(config: &ModelConfig) -> Result<ModelArtifacts> {
    Ok(ModelArtifacts {
        tokenizer: ensure_file(config, TOKENIZER_FILE)?,
        config: ensure_file(config, CONFIG_FILE)?,
        onnx: ensure_file(config, &config.onnx_file)?,
    })
}

fn ensure_file(config: &ModelConfig, file: &str) -> Result<PathBuf> {
    let local = model_cache_dir(config).join(file);
    if local.is_file() {
        debug!(path = %local.display(), "using cached model file");
        return Ok(local);
    }

    if let Some(parent) = local.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::ModelLoad(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }

    let url = artifact_url(config, file);
    info!(%url, "downloading model file");
    let bytes = download(&url)?;
    write_atomic(&local, &bytes)
        .map_err(|e| Error::ModelLoad(format!("Failed to cache {}: {}", local.display(), e)))?;
    Ok(local)
}

fn download(url: &str) -> Result<Vec<u8>> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::ModelLoad(format!("Failed to download {}: {}", url, e)))?;
    let bytes = response
        .bytes()
        .map_err(|e| Error::ModelLoad(format!("Failed to read {}: {}", url, e)))?;
    Ok(bytes.to_vec())
}

/// Sequence classifier with its tokenizer and label table
pub struct SentimentModel {
    session: Session,
    /// Untruncated, used to split text into chunks
    splitter: Tokenizer,
    /// Truncated to `max_length`, used to encode chunks for inference
    encoder: Tokenizer,
    labels: Vec<String>,
    max_length: usize,
    uses_token_type_ids: bool,
}

impl SentimentModel {
    /// Fetch (if needed) and load the configured model
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let artifacts = ensure_artifacts(config)?;
        Self::from_files(&artifacts, config.max_length)
    }

    /// Load a model from local files
    pub fn from_files(artifacts: &ModelArtifacts, max_length: usize) -> Result<Self> {
        let config_json = std::fs::read_to_string(&artifacts.config).map_err(|e| {
            Error::ModelLoad(format!("Failed to read {}: {}", artifacts.config.display(), e))
        })?;
        let hub_config: HubModelConfig = serde_json::from_str(&config_json)
            .map_err(|e| Error::ModelLoad(format!("Invalid model config: {}", e)))?;
        let labels = ordered_labels(&hub_config.id2label)?;

        let max_length = hub_config.clamp_max_length(max_length);
        if max_length <= crate::sentiment::BOUNDARY_TOKENS {
            return Err(Error::ModelLoad(format!(
                "Model accepts only {} positions",
                max_length
            )));
        }

        let splitter = load_tokenizer(&artifacts.tokenizer, None)?;
        let encoder = load_tokenizer(&artifacts.tokenizer, Some(max_length))?;

        let session = Session::builder()
            .and_then(|builder| builder.commit_from_file(&artifacts.onnx))
            .map_err(|e| {
                Error::ModelLoad(format!("Failed to load {}: {}", artifacts.onnx.display(), e))
            })?;
        let uses_token_type_ids = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        info!(labels = ?labels, max_length, "loaded sentiment model");
        Ok(Self {
            session,
            splitter,
            encoder,
            labels,
            max_length,
            uses_token_type_ids,
        })
    }
}

fn load_tokenizer(path: &Path, truncate_to: Option<usize>) -> Result<Tokenizer> {
    let mut tokenizer = Tokenizer::from_file(path)
        .map_err(|e| Error::ModelLoad(format!("Failed to load tokenizer: {}", e)))?;

    tokenizer.with_padding(None);
    let truncation = truncate_to.map(|max_length| TruncationParams {
        max_length,
        stride: 0,
        strategy: TruncationStrategy::LongestFirst,
        direction: TruncationDirection::Right,
    });
    tokenizer
        .with_truncation(truncation)
        .map_err(|e| Error::ModelLoad(format!("Failed to configure truncation: {}", e)))?;

    Ok(tokenizer)
}

fn tensor(values: &[u32]) -> Result<Value> {
    let data: Vec<i64> = values.iter().map(|&x| x as i64).collect();
    let value = Value::from_array((vec![1_i64, data.len() as i64], data))
        .map_err(|e| Error::Inference(format!("Failed to build input tensor: {}", e)))?;
    Ok(value.into_dyn())
}

impl SentimentClassifier for SentimentModel {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn max_length(&self) -> usize {
        self.max_length
    }

    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .splitter
            .encode(text, false)
            .map_err(|e| Error::Inference(format!("Tokenizer encode failed: {}", e)))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn detokenize(&self, ids: &[u32]) -> Result<String> {
        self.splitter
            .decode(ids, false)
            .map_err(|e| Error::Inference(format!("Tokenizer decode failed: {}", e)))
    }

    fn logits(&mut self, chunk: &str) -> Result<Vec<f32>> {
        let encoding = self
            .encoder
            .encode(chunk, true)
            .map_err(|e| Error::Inference(format!("Tokenizer encode failed: {}", e)))?;

        let mut model_inputs: Vec<(Cow<'_, str>, SessionInputValue<'_>)> = vec![
            ("input_ids".into(), tensor(encoding.get_ids())?.into()),
            ("attention_mask".into(), tensor(encoding.get_attention_mask())?.into()),
        ];
        // RoBERTa exports have no segment input; BERT-style exports do
        if self.uses_token_type_ids {
            model_inputs.push(("token_type_ids".into(), tensor(encoding.get_type_ids())?.into()));
        }

        let outputs = self
            .session
            .run(model_inputs)
            .map_err(|e| Error::Inference(format!("Model run failed: {}", e)))?;

        // logits shape: [batch, labels]
        let logits = outputs["logits"]
            .try_extract_array::<f32>()
            .map_err(|e| Error::Inference(format!("Unexpected model output: {}", e)))?;
        let shape = logits.shape();
        if shape.len() != 2 || shape[0] != 1 {
            return Err(Error::Inference(format!("Unexpected logits shape {:?}", shape)));
        }

        Ok(logits.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_config() -> ModelConfig {
        ModelConfig {
            repo: "Xenova/twitter-roberta-base-sentiment-latest".to_string(),
            revision: "main".to_string(),
            onnx_file: "onnx/model.onnx".to_string(),
            endpoint: "https://huggingface.co/".to_string(),
            cache_dir: PathBuf::from("/cache"),
            max_length: 512,
        }
    }

    #[test]
    fn test_labels_from_config() {
        let json = r#"{
            "architectures": ["RobertaForSequenceClassification"],
            "id2label": {"0": "negative", "1": "neutral", "2": "positive"},
            "max_position_embeddings": 514
        }"#;
        assert_eq!(
            labels_from_config(json).unwrap(),
            vec!["negative", "neutral", "positive"]
        );
    }

    #[test]
    fn test_labels_sorted_numerically() {
        let labels: BTreeMap<String, String> = (0..12)
            .map(|i| (i.to_string(), format!("label_{i}")))
            .collect();
        let ordered = ordered_labels(&labels).unwrap();
        assert_eq!(ordered[2], "label_2");
        assert_eq!(ordered[10], "label_10");
    }

    #[test]
    fn test_labels_must_be_contiguous() {
        let json = r#"{"id2label": {"0": "negative", "2": "positive"}}"#;
        assert!(matches!(labels_from_config(json), Err(Error::ModelLoad(_))));
        assert!(matches!(labels_from_config("{}"), Err(Error::ModelLoad(_))));
        assert!(matches!(
            labels_from_config(r#"{"id2label": {}}"#),
            Err(Error::ModelLoad(_))
        ));
    }

    fn hub_config(json: &str) -> HubModelConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_roberta_positions_skip_padding_offset() {
        let config = hub_config(
            r#"{
                "model_type": "roberta",
                "id2label": {"0": "negative", "1": "neutral", "2": "positive"},
                "max_position_embeddings": 514,
                "pad_token_id": 1
            }"#,
        );
        assert_eq!(config.usable_positions(), Some(512));
        assert_eq!(config.clamp_max_length(514), 512);
        assert_eq!(config.clamp_max_length(513), 512);
        assert_eq!(config.clamp_max_length(512), 512);
        assert_eq!(config.clamp_max_length(128), 128);
    }

    #[test]
    fn test_bert_positions_start_at_zero() {
        let config = hub_config(
            r#"{
                "model_type": "bert",
                "id2label": {"0": "NEGATIVE", "1": "POSITIVE"},
                "max_position_embeddings": 512,
                "pad_token_id": 0
            }"#,
        );
        assert_eq!(config.clamp_max_length(600), 512);

        let bare = hub_config(r#"{"id2label": {"0": "a"}}"#);
        assert_eq!(bare.clamp_max_length(4096), 4096);
    }

    #[test]
    fn test_artifact_url() {
        assert_eq!(
            artifact_url(&model_config(), "onnx/model.onnx"),
            "https://huggingface.co/Xenova/twitter-roberta-base-sentiment-latest/resolve/main/onnx/model.onnx"
        );
    }

    #[test]
    fn test_model_cache_dir() {
        assert_eq!(
            model_cache_dir(&model_config()),
            PathBuf::from("/cache/Xenova--twitter-roberta-base-sentiment-latest/main")
        );
    }

    #[test]
    fn test_load_missing_files_is_model_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ModelArtifacts {
            onnx: dir.path().join("model.onnx"),
            tokenizer: dir.path().join("tokenizer.json"),
            config: dir.path().join("config.json"),
        };
        assert!(matches!(
            SentimentModel::from_files(&artifacts, 512),
            Err(Error::ModelLoad(_))
        ));
    }
}
