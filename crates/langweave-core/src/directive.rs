//! Row-wise analysis directives
//!
//! A directive analyses a text column of every row and stores the raw API
//! response, serialised as a JSON string, in a destination column. Unlike
//! [`NlpTransform`](crate::transform::NlpTransform) there is no projection
//! and no error policy: the first failure aborts the whole batch.

use serde_json::{Map, Value};

use crate::analysis::{AnalysisKind, Document, EncodingType};
use crate::client::LanguageClient;
use crate::error::{Error, Result};
use crate::flatten::json_type;

/// A row: column name to value, in column order
pub type Row = Map<String, Value>;

/// One analysis directive, e.g. `nlp-analyze-sentiment :body :sentiment`
#[derive(Debug, Clone)]
pub struct NlpDirective {
    kind: AnalysisKind,
    source: String,
    destination: String,
    language_code: Option<String>,
    encoding: EncodingType,
}

impl NlpDirective {
    /// Create a directive for an analysis kind. Offsets default to UTF-8.
    pub fn new(kind: AnalysisKind, source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            destination: destination.into(),
            language_code: None,
            encoding: EncodingType::Utf8,
        }
    }

    /// Create a directive from its name, e.g. `nlp-classify-text`
    pub fn from_name(
        name: &str,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Result<Self> {
        let kind = AnalysisKind::ALL
            .into_iter()
            .find(|k| k.directive_name() == name)
            .ok_or_else(|| Error::ConfigInvalid {
                message: format!("unknown directive '{}'", name),
            })?;
        Ok(Self::new(kind, source, destination))
    }

    /// Set the language hint
    pub fn with_language(mut self, language_code: impl Into<String>) -> Self {
        self.language_code = Some(language_code.into());
        self
    }

    /// Set the offset encoding from its name (`NONE`, `UTF8`, `UTF16`, `UTF32`)
    pub fn with_encoding(mut self, encoding: &str) -> Result<Self> {
        self.encoding = encoding.parse()?;
        Ok(self)
    }

    /// Directive name
    pub fn name(&self) -> &'static str {
        self.kind.directive_name()
    }

    /// Analyse every row, adding or replacing the destination column.
    /// A null source value leaves a null in the destination.
    pub async fn execute(&self, client: &dyn LanguageClient, mut rows: Vec<Row>) -> Result<Vec<Row>> {
        for row in &mut rows {
            let result = match row.get(&self.source) {
                None => {
                    return Err(Error::MissingSourceField {
                        field: self.source.clone(),
                    });
                }
                Some(Value::Null) => Value::Null,
                Some(Value::String(text)) => {
                    let document = Document::plain_text(text.as_str())
                        .with_language(self.language_code.as_deref());
                    let response = client.execute(&self.kind, &document, self.encoding).await?;
                    Value::String(serde_json::to_string(&response)?)
                }
                Some(other) => {
                    return Err(Error::NonTextInput {
                        field: self.source.clone(),
                        found: json_type(other),
                    });
                }
            };
            row.insert(self.destination.clone(), result);
        }
        tracing::debug!(directive = self.name(), rows = rows.len(), "Directive executed");
        Ok(rows)
    }
}
