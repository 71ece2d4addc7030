//! Per-record analysis stage
//!
//! [`NlpTransform`] reads the text of one input record, sends it to the
//! Natural Language API and maps the response onto the method's output
//! schema. Recoverable failures are handled according to the stage's
//! [`ErrorHandling`] policy.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::analysis::{AnalysisKind, Document, EncodingType};
use crate::client::LanguageClient;
use crate::config::{ErrorHandling, StageConfig};
use crate::error::{Error, Result};
use crate::flatten::json_type;
use crate::schema::OutputRecord;

/// Status code attached to error entries
pub const ERROR_CODE: u16 = 400;

/// Field of the error entry record holding the original text
pub const ERROR_BODY_FIELD: &str = "body";

/// Result of transforming one input record
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A record for the output connector
    Emit(OutputRecord),
    /// An entry for the error connector
    Error(InvalidEntry),
    /// Nothing to emit
    Skip,
}

/// Record routed to the error connector under `send_to_error`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidEntry {
    /// Always [`ERROR_CODE`]
    pub error_code: u16,
    /// Message of the failure
    pub error_message: String,
    /// `{"body": <original text>}`
    pub record: Value,
}

impl InvalidEntry {
    fn for_text(text: &str, error: &Error) -> Self {
        Self {
            error_code: ERROR_CODE,
            error_message: error.to_string(),
            record: json!({ ERROR_BODY_FIELD: text }),
        }
    }
}

/// Natural Language analysis of one text field
#[derive(Debug, Clone)]
pub struct NlpTransform {
    kind: AnalysisKind,
    source_field: String,
    language_code: Option<String>,
    encoding: EncodingType,
    on_error: ErrorHandling,
}

impl NlpTransform {
    /// Build from a stage definition, validating it first
    pub fn from_stage(stage: &StageConfig) -> Result<Self> {
        stage.validate()?;
        Ok(Self {
            kind: stage.analysis_kind(),
            source_field: stage.source_field.clone(),
            language_code: stage.language_code.clone(),
            encoding: stage.encoding(),
            on_error: stage.on_error,
        })
    }

    /// A transform with default settings: no language hint, no encoding,
    /// skip on error
    pub fn new(kind: AnalysisKind, source_field: impl Into<String>) -> Self {
        Self {
            kind,
            source_field: source_field.into(),
            language_code: None,
            encoding: EncodingType::default(),
            on_error: ErrorHandling::default(),
        }
    }

    /// Set the language hint
    pub fn with_language(mut self, language_code: Option<String>) -> Self {
        self.language_code = language_code;
        self
    }

    /// Set the offset encoding
    pub fn with_encoding(mut self, encoding: EncodingType) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the error policy
    pub fn with_error_handling(mut self, on_error: ErrorHandling) -> Self {
        self.on_error = on_error;
        self
    }

    /// Analysis kind
    pub fn kind(&self) -> &AnalysisKind {
        &self.kind
    }

    /// Call the API for one text and return its raw response
    pub async fn get_result_for_text(
        &self,
        client: &dyn LanguageClient,
        text: &str,
    ) -> Result<Value> {
        let document = Document::plain_text(text).with_language(self.language_code.as_deref());
        client.execute(&self.kind, &document, self.encoding).await
    }

    /// Call the API for one text and project the response
    pub async fn analyze(&self, client: &dyn LanguageClient, text: &str) -> Result<OutputRecord> {
        let response = self.get_result_for_text(client, text).await?;
        self.kind.map_response(&response)
    }

    /// Transform one input record
    ///
    /// Missing or non-text source fields are hard errors regardless of the
    /// error policy. A null source field yields [`Outcome::Skip`].
    pub async fn transform(
        &self,
        client: &dyn LanguageClient,
        input: &Map<String, Value>,
    ) -> Result<Outcome> {
        let text = match input.get(&self.source_field) {
            None => {
                return Err(Error::MissingSourceField {
                    field: self.source_field.clone(),
                });
            }
            Some(Value::Null) => {
                tracing::debug!(field = %self.source_field, "Source field is null, skipping");
                return Ok(Outcome::Skip);
            }
            Some(Value::String(text)) => text,
            Some(other) => {
                return Err(Error::NonTextInput {
                    field: self.source_field.clone(),
                    found: json_type(other),
                });
            }
        };

        match self.analyze(client, text).await {
            Ok(record) => Ok(Outcome::Emit(record)),
            Err(e) if e.is_recoverable() => match self.on_error {
                ErrorHandling::SkipOnError => {
                    tracing::warn!(method = %self.kind, "Skipping record: {}", e);
                    Ok(Outcome::Skip)
                }
                ErrorHandling::SendToError => {
                    tracing::warn!(method = %self.kind, "Sending record to errors: {}", e);
                    Ok(Outcome::Error(InvalidEntry::for_text(text, &e)))
                }
                ErrorHandling::StopOnError => Err(e),
            },
            Err(e) => Err(e),
        }
    }
}
