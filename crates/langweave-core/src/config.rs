//! Configuration parsing and validation
//!
//! This module handles loading and validating langweave configuration files.
//!
//! # Configuration Files
//!
//! - `langweave.yaml` - Project root configuration
//! - `stages/*.yaml` - Individual analysis stage definitions
//! - `connectors/*.yaml` - Connector definitions referenced as `file.key`
//!
//! `${NAME}` macros in any of these files are expanded from the project
//! `vars`, then from the environment, before the YAML is parsed.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::analysis::{AnalysisKind, EncodingType, Features};
use crate::client::ApiConfig;
use crate::connectors::ConnectorConfig;
use crate::error::{Error, Result};

/// Project configuration file name
pub const PROJECT_FILE: &str = "langweave.yaml";

static MACRO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.-]*)\}").expect("macro pattern is valid")
});

static LANGUAGE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]{2,3}(-[A-Za-z0-9]{2,8})*$").expect("language code pattern is valid")
});

/// Root project configuration from `langweave.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,

    /// Natural Language API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Variables available to `${NAME}` macros
    #[serde(default)]
    pub vars: HashMap<String, serde_yaml::Value>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// What to do when analysing one record fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandling {
    /// Drop the record and continue
    #[default]
    #[serde(alias = "skipOnError")]
    SkipOnError,
    /// Route an error entry to the stage's error connector
    #[serde(alias = "sendToError")]
    SendToError,
    /// Abort the stage
    #[serde(alias = "stopOnError")]
    StopOnError,
}

/// A stage definition from `stages/*.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage name (must be unique within project)
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Analysis method
    pub method: AnalysisKind,

    /// Input field holding the text to analyse
    pub source_field: String,

    /// Language of the text; detected by the API when absent
    #[serde(default)]
    pub language_code: Option<String>,

    /// Offset encoding requested from the API
    #[serde(default)]
    pub encoding: Option<EncodingType>,

    /// Error policy for recoverable failures
    #[serde(default)]
    pub on_error: ErrorHandling,

    /// Records analysed concurrently
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Features for `annotate_text`
    #[serde(default)]
    pub features: Option<Features>,

    /// Input connector reference
    pub input: String,

    /// Output connector reference
    pub output: String,

    /// Error connector reference, required by `send_to_error`
    #[serde(default)]
    pub errors: Option<String>,
}

/// Default number of records analysed at once
pub const DEFAULT_CONCURRENCY: usize = 4;

impl StageConfig {
    /// Analysis kind with configured annotate features applied
    pub fn analysis_kind(&self) -> AnalysisKind {
        match self.features {
            Some(features) => self.method.with_features(features),
            None => self.method,
        }
    }

    /// Effective offset encoding
    pub fn encoding(&self) -> EncodingType {
        self.encoding.unwrap_or_default()
    }

    /// Effective concurrency
    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(DEFAULT_CONCURRENCY)
    }

    /// Check the stage, reporting every problem at once
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("stage name must not be empty".to_string());
        }
        if self.source_field.trim().is_empty() {
            problems.push("source_field must not be empty".to_string());
        }
        if let Some(code) = &self.language_code
            && !LANGUAGE_CODE_RE.is_match(code)
        {
            problems.push(format!(
                "language_code '{}' is not a valid ISO-639-1 code",
                code
            ));
        }
        if self.concurrency == Some(0) {
            problems.push("concurrency must be at least 1".to_string());
        }
        if self.on_error == ErrorHandling::SendToError && self.errors.is_none() {
            problems.push("on_error: send_to_error requires an 'errors' connector".to_string());
        }
        if self.features.is_some() && !matches!(self.method, AnalysisKind::AnnotateText(_)) {
            problems.push(format!(
                "features are only supported by annotate_text, not {}",
                self.method
            ));
        }
        if let Err(Error::ConfigInvalid { message }) = self.analysis_kind().validate() {
            problems.push(message);
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::ConfigInvalid {
                message: format!("stage '{}': {}", self.name, problems.join("; ")),
            })
        }
    }
}

/// Main configuration container
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Base path of the project
    pub base_path: PathBuf,
}

impl Config {
    /// Load configuration from a directory
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the project directory or langweave.yaml file
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = Config::load("./my-project")?;
    /// println!("Project: {}", config.project.name);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let (config_path, base_path) = if path.is_dir() {
            (path.join(PROJECT_FILE), path.to_path_buf())
        } else {
            (
                path.to_path_buf(),
                path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            )
        };

        if !config_path.exists() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&config_path)?;
        // Project vars are not known yet, so only the environment is consulted.
        let expanded = expand_macros(&contents, &HashMap::new(), Some(&config_path))?;
        let project: ProjectConfig = serde_yaml::from_str(&expanded)?;

        Ok(Self { project, base_path })
    }

    /// Load all stage definitions from `stages/*.yaml`, sorted by file name
    pub fn load_stages(&self) -> Result<Vec<StageConfig>> {
        let stages_dir = self.base_path.join("stages");
        if !stages_dir.exists() {
            return Ok(vec![]);
        }

        let mut stages = Vec::new();
        let mut entries: Vec<_> = std::fs::read_dir(&stages_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
            })
            .collect();
        entries.sort_by_key(|e| e.path());

        for entry in entries {
            let contents = self.read_expanded(&entry.path())?;
            let stage: StageConfig = serde_yaml::from_str(&contents)?;
            stages.push(stage);
        }
        Ok(stages)
    }

    /// Load one stage by name
    pub fn load_stage(&self, name: &str) -> Result<StageConfig> {
        self.load_stages()?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::ConfigInvalid {
                message: format!("stage '{}' not found", name),
            })
    }

    /// Resolve a dotted connector reference like `"file.input"` to a `ConnectorConfig`.
    ///
    /// The reference format is `"<filename>.<key>"` which maps to
    /// `connectors/<filename>.yaml` → key `<key>`. Relative file paths are
    /// resolved against the project directory.
    pub fn load_connector_config(&self, reference: &str) -> Result<ConnectorConfig> {
        let (file, key) = reference
            .split_once('.')
            .ok_or_else(|| Error::ConfigInvalid {
                message: format!(
                    "connector reference '{}' must be in 'file.key' format",
                    reference
                ),
            })?;

        let path = self
            .base_path
            .join("connectors")
            .join(format!("{}.yaml", file));
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let contents = self.read_expanded(&path)?;
        let doc: serde_yaml::Value = serde_yaml::from_str(&contents)?;

        let connector_value = doc.get(key).ok_or_else(|| Error::ConfigInvalid {
            message: format!("key '{}' not found in {}", key, path.display()),
        })?;

        let config: ConnectorConfig = serde_yaml::from_value(connector_value.clone())?;
        Ok(config.relative_to(&self.base_path))
    }

    fn read_expanded(&self, path: &Path) -> Result<String> {
        let contents = std::fs::read_to_string(path)?;
        expand_macros(&contents, &self.project.vars, Some(path))
    }
}

/// Expand `${NAME}` macros from `vars`, then from the environment
pub fn expand_macros(
    contents: &str,
    vars: &HashMap<String, serde_yaml::Value>,
    file: Option<&Path>,
) -> Result<String> {
    let mut out = String::with_capacity(contents.len());
    let mut last = 0;
    for caps in MACRO_RE.captures_iter(contents) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&contents[last..whole.start()]);
        out.push_str(&lookup_var(name.as_str(), vars, file)?);
        last = whole.end();
    }
    out.push_str(&contents[last..]);
    Ok(out)
}

fn lookup_var(
    name: &str,
    vars: &HashMap<String, serde_yaml::Value>,
    file: Option<&Path>,
) -> Result<String> {
    let macro_error = |message: String| Error::MacroError {
        macro_name: name.to_string(),
        message,
        file: file.map(Path::to_path_buf),
    };

    if let Some(value) = vars.get(name) {
        return match value {
            serde_yaml::Value::String(s) => Ok(s.clone()),
            serde_yaml::Value::Number(n) => Ok(n.to_string()),
            serde_yaml::Value::Bool(b) => Ok(b.to_string()),
            _ => Err(macro_error("only scalar vars can be substituted".to_string())),
        };
    }

    std::env::var(name).map_err(|_| macro_error("not defined in vars or environment".to_string()))
}
