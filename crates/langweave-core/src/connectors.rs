//! Connector trait and implementations
//!
//! Connectors move records in and out of a stage. Only JSONL files are
//! supported for now.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

use crate::error::{Error, Result};

/// Message from or to a connector
#[derive(Debug, Clone)]
pub struct Message {
    /// Message payload as JSON
    pub payload: serde_json::Value,

    /// Message metadata
    pub metadata: MessageMetadata,
}

impl Message {
    /// A message with empty metadata
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            metadata: MessageMetadata::default(),
        }
    }
}

/// Message metadata
#[derive(Debug, Clone, Default)]
pub struct MessageMetadata {
    /// Source connector name
    pub source: Option<String>,

    /// Additional metadata as key-value pairs (e.g. `line`)
    pub extra: HashMap<String, String>,
}

/// Trait for input connectors (sources)
#[async_trait]
pub trait InputConnector: Send + Sync {
    /// Pull the next message from the source
    async fn pull(&mut self) -> Result<Option<Message>>;

    /// Acknowledge a message was processed successfully
    async fn ack(&mut self, metadata: &MessageMetadata) -> Result<()>;

    /// Negative acknowledgment - message processing failed
    async fn nack(&mut self, metadata: &MessageMetadata) -> Result<()>;
}

/// Trait for output connectors (sinks)
#[async_trait]
pub trait OutputConnector: Send + Sync {
    /// Push a message to the sink
    async fn push(&mut self, message: Message) -> Result<()>;

    /// Flush any buffered messages
    async fn flush(&mut self) -> Result<()>;
}

/// Connector configuration from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectorConfig {
    /// Newline-delimited JSON file
    File(FileConnectorConfig),
}

impl ConnectorConfig {
    /// Resolve relative file paths against `base`
    pub fn relative_to(self, base: &Path) -> Self {
        match self {
            Self::File(mut file) => {
                if Path::new(&file.path).is_relative() {
                    file.path = base.join(&file.path).display().to_string();
                }
                Self::File(file)
            }
        }
    }

    /// Check the connector can be opened
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::File(file) if file.format != "jsonl" => Err(Error::ConfigInvalid {
                message: format!(
                    "file connector '{}': unsupported format '{}', expected jsonl",
                    file.path, file.format
                ),
            }),
            Self::File(_) => Ok(()),
        }
    }

    /// Open as a source
    pub fn open_input(&self) -> Result<Box<dyn InputConnector>> {
        self.validate()?;
        match self {
            Self::File(file) => Ok(Box::new(FileInputConnector::new(file.clone()))),
        }
    }

    /// Open as a sink
    pub fn open_output(&self) -> Result<Box<dyn OutputConnector>> {
        self.validate()?;
        match self {
            Self::File(file) => Ok(Box::new(FileOutputConnector::new(file.clone()))),
        }
    }
}

/// File connector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConnectorConfig {
    /// File path
    pub path: String,

    /// Format: jsonl
    #[serde(default = "default_file_format")]
    pub format: String,
}

fn default_file_format() -> String {
    "jsonl".to_string()
}

/// File-based input connector
pub struct FileInputConnector {
    config: FileConnectorConfig,
    reader: Option<BufReader<File>>,
    line_number: usize,
}

impl FileInputConnector {
    /// Create a new file input connector. The file is opened on first pull.
    pub fn new(config: FileConnectorConfig) -> Self {
        Self {
            config,
            reader: None,
            line_number: 0,
        }
    }
}

#[async_trait]
impl InputConnector for FileInputConnector {
    async fn pull(&mut self) -> Result<Option<Message>> {
        if self.reader.is_none() {
            self.reader = Some(BufReader::new(File::open(&self.config.path).await?));
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let payload: serde_json::Value = serde_json::from_str(trimmed)?;
            let mut extra = HashMap::new();
            extra.insert("line".to_string(), self.line_number.to_string());
            return Ok(Some(Message {
                payload,
                metadata: MessageMetadata {
                    source: Some(self.config.path.clone()),
                    extra,
                },
            }));
        }
    }

    async fn ack(&mut self, _metadata: &MessageMetadata) -> Result<()> {
        Ok(())
    }

    async fn nack(&mut self, metadata: &MessageMetadata) -> Result<()> {
        tracing::debug!(
            source = metadata.source.as_deref().unwrap_or_default(),
            line = metadata.extra.get("line").map(String::as_str).unwrap_or_default(),
            "Record not delivered"
        );
        Ok(())
    }
}

/// File-based output connector.
///
/// The file is truncated on the first push or flush, so a run that writes
/// nothing still leaves an empty file behind.
pub struct FileOutputConnector {
    config: FileConnectorConfig,
    writer: Option<BufWriter<File>>,
}

impl FileOutputConnector {
    /// Create a new file output connector
    pub fn new(config: FileConnectorConfig) -> Self {
        Self {
            config,
            writer: None,
        }
    }

    async fn open(path: &str) -> Result<BufWriter<File>> {
        if let Some(parent) = Path::new(path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(BufWriter::new(File::create(path).await?))
    }

    async fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => Self::open(&self.config.path).await?,
        };
        Ok(self.writer.insert(writer))
    }
}

#[async_trait]
impl OutputConnector for FileOutputConnector {
    async fn push(&mut self, message: Message) -> Result<()> {
        let mut line = serde_json::to_vec(&message.payload)?;
        line.push(b'\n');
        self.writer().await?.write_all(&line).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer().await?.flush().await?;
        Ok(())
    }
}
