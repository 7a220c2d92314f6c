use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// ONNX export of `cardiffnlp/twitter-roberta-base-sentiment-latest`
pub const DEFAULT_MODEL_REPO: &str = "Xenova/twitter-roberta-base-sentiment-latest";
pub const DEFAULT_ONNX_FILE: &str = "onnx/model.onnx";
pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";
pub const DEFAULT_MAX_LENGTH: usize = 512;
pub const DEFAULT_FETCH_LIMIT: usize = 5;

/// Credentials the Reddit collector needs
pub const DEFAULT_REQUIRED_ENV: [&str; 3] = [
    "REDDIT_CLIENT_ID",
    "REDDIT_CLIENT_SECRET",
    "REDDIT_USER_AGENT",
];

/// Where the pretrained classifier comes from and how it is run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    /// Hub repository holding `tokenizer.json`, `config.json` and the ONNX graph
    pub repo: String,
    pub revision: String,
    /// Path of the ONNX graph inside the repository
    pub onnx_file: String,
    pub endpoint: String,
    pub cache_dir: PathBuf,
    /// Longest token sequence the model accepts, boundary tokens included
    pub max_length: usize,
}

/// External collector invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetcherConfig {
    /// argv; `{tag}`, `{limit}` and `{output}` are substituted
    pub command: Vec<String>,
    pub limit: usize,
    pub required_env: Vec<String>,
}

/// Configuration for a pipeline run
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub model: ModelConfig,
    pub fetcher: Option<FetcherConfig>,
    /// Extra words left out of the term table
    pub stopwords: Vec<String>,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.model.repo.trim().is_empty() {
            return Err(Error::Config("Model repository must not be empty".to_string()));
        }

        // Two slots are reserved for the model's boundary tokens
        if self.model.max_length <= 2 {
            return Err(Error::Config(format!(
                "max_length must be greater than 2, got {}",
                self.model.max_length
            )));
        }

        if self.data_dir.exists() && !self.data_dir.is_dir() {
            return Err(Error::Config(format!(
                "Data directory is not a directory: {}",
                self.data_dir.display()
            )));
        }

        if let Some(fetcher) = &self.fetcher {
            if fetcher.command.is_empty() {
                return Err(Error::Config("Fetcher command must not be empty".to_string()));
            }
        }

        Ok(())
    }

    /// Raw table written by the collector for `tag`
    pub fn raw_table_path(&self, tag: &str) -> Result<PathBuf> {
        validate_tag(tag)?;
        Ok(self
            .data_dir
            .join("raw")
            .join(format!("social_data_{}.csv", tag)))
    }

    /// Cleaned table produced for `tag`
    pub fn cleaned_table_path(&self, tag: &str) -> Result<PathBuf> {
        validate_tag(tag)?;
        Ok(self
            .data_dir
            .join("cleaned")
            .join(format!("filtered_social_data_{}.csv", tag)))
    }
}

/// Tags become part of file names
pub fn validate_tag(tag: &str) -> Result<()> {
    if tag.trim().is_empty() {
        return Err(Error::Config("Tag must not be empty".to_string()));
    }
    if tag.contains(['/', '\\']) || tag == "." || tag == ".." {
        return Err(Error::Config(format!(
            "Tag '{}' cannot contain path separators",
            tag
        )));
    }
    Ok(())
}

/// Get the default model cache directory: $HOME/.market-pulse/models
pub fn default_cache_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| {
            Error::Config(
                "Could not determine home directory. Set HOME or USERPROFILE environment variable."
                    .to_string(),
            )
        })?;

    Ok(PathBuf::from(home).join(".market-pulse").join("models"))
}

/// On-disk configuration (market-pulse.yml); every field is optional
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub model: FileModelConfig,
    pub fetcher: Option<FileFetcherConfig>,
    #[serde(default)]
    pub stopwords: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FileModelConfig {
    pub repo: Option<String>,
    pub revision: Option<String>,
    pub onnx_file: Option<String>,
    pub endpoint: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub max_length: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct FileFetcherConfig {
    pub command: Vec<String>,
    pub limit: Option<usize>,
    pub required_env: Option<Vec<String>>,
}

/// Load and parse a YAML configuration file
pub fn load_config_file(path: &Path) -> Result<FileConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_yaml::from_str(&contents)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Builder for creating configurations
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    data_dir: PathBuf,
    repo: String,
    revision: String,
    onnx_file: String,
    endpoint: String,
    cache_dir: Option<PathBuf>,
    max_length: usize,
    fetcher: Option<FetcherConfig>,
    stopwords: Vec<String>,
}

impl ConfigBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            repo: DEFAULT_MODEL_REPO.to_string(),
            revision: "main".to_string(),
            onnx_file: DEFAULT_ONNX_FILE.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            cache_dir: None,
            max_length: DEFAULT_MAX_LENGTH,
            fetcher: None,
            stopwords: Vec::new(),
        }
    }

    /// Overlay the values present in a configuration file
    pub fn file(mut self, file: FileConfig) -> Self {
        if let Some(dir) = file.data_dir {
            self.data_dir = dir;
        }
        let model = file.model;
        if let Some(repo) = model.repo {
            self.repo = repo;
        }
        if let Some(revision) = model.revision {
            self.revision = revision;
        }
        if let Some(onnx_file) = model.onnx_file {
            self.onnx_file = onnx_file;
        }
        if let Some(endpoint) = model.endpoint {
            self.endpoint = endpoint;
        }
        if let Some(cache_dir) = model.cache_dir {
            self.cache_dir = Some(cache_dir);
        }
        if let Some(max_length) = model.max_length {
            self.max_length = max_length;
        }
        if let Some(fetcher) = file.fetcher {
            self.fetcher = Some(FetcherConfig {
                command: fetcher.command,
                limit: fetcher.limit.unwrap_or(DEFAULT_FETCH_LIMIT),
                required_env: fetcher.required_env.unwrap_or_else(|| {
                    DEFAULT_REQUIRED_ENV.iter().map(|s| s.to_string()).collect()
                }),
            });
        }
        self.stopwords.extend(file.stopwords);
        self
    }

    /// Set the data directory
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the model repository
    pub fn model_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = repo.into();
        self
    }

    /// Set the model cache directory
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Set the model's maximum sequence length
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set the external collector
    pub fn fetcher(mut self, fetcher: FetcherConfig) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Add a word-cloud stopword
    pub fn add_stopword(mut self, word: impl Into<String>) -> Self {
        self.stopwords.push(word.into());
        self
    }

    /// Build the final configuration
    pub fn build(self) -> Result<Config> {
        let cache_dir = match self.cache_dir {
            Some(dir) => dir,
            None => default_cache_dir()?,
        };

        let config = Config {
            data_dir: self.data_dir,
            model: ModelConfig {
                repo: self.repo,
                revision: self.revision,
                onnx_file: self.onnx_file,
                endpoint: self.endpoint,
                cache_dir,
                max_length: self.max_length,
            },
            fetcher: self.fetcher,
            stopwords: self.stopwords,
        };
        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ConfigBuilder {
        ConfigBuilder::new().cache_dir("/tmp/market-pulse-models")
    }

    #[test]
    fn test_defaults() {
        let config = builder().build().unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.model.repo, "Xenova/twitter-roberta-base-sentiment-latest");
        assert_eq!(config.model.onnx_file, "onnx/model.onnx");
        assert_eq!(config.model.revision, "main");
        assert_eq!(config.model.max_length, 512);
        assert!(config.fetcher.is_none());
    }

    #[test]
    fn test_table_paths() {
        let config = builder().data_dir("/srv/pulse").build().unwrap();
        assert_eq!(
            config.raw_table_path("gpt-5").unwrap(),
            PathBuf::from("/srv/pulse/raw/social_data_gpt-5.csv")
        );
        assert_eq!(
            config.cleaned_table_path("gpt-5").unwrap(),
            PathBuf::from("/srv/pulse/cleaned/filtered_social_data_gpt-5.csv")
        );
    }

    #[test]
    fn test_rejects_bad_tags() {
        let config = builder().build().unwrap();
        assert!(config.raw_table_path("").is_err());
        assert!(config.raw_table_path("  ").is_err());
        assert!(config.raw_table_path("../etc").is_err());
        assert!(config.cleaned_table_path("a\\b").is_err());
    }

    #[test]
    fn test_rejects_small_max_length() {
        let err = builder().max_length(2).build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(builder().max_length(3).build().is_ok());
    }

    #[test]
    fn test_file_overlay() {
        let yaml = r#"
data_dir: /var/pulse
model:
  repo: someone/other-sentiment
  max_length: 128
fetcher:
  command: ["python", "fetch.py", "--tag", "{tag}"]
stopwords: [lol]
"#;
        let file: FileConfig = serde_yaml::from_str(yaml).unwrap();
        let config = builder().file(file).add_stopword("tbh").build().unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/pulse"));
        assert_eq!(config.model.repo, "someone/other-sentiment");
        assert_eq!(config.model.revision, "main");
        assert_eq!(config.model.max_length, 128);
        let fetcher = config.fetcher.unwrap();
        assert_eq!(fetcher.limit, DEFAULT_FETCH_LIMIT);
        assert_eq!(fetcher.required_env.len(), 3);
        assert_eq!(config.stopwords, vec!["lol".to_string(), "tbh".to_string()]);
    }

    #[test]
    fn test_empty_fetcher_command_is_invalid() {
        let err = builder()
            .fetcher(FetcherConfig {
                command: vec![],
                limit: 5,
                required_env: vec![],
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
