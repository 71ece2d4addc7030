//! Natural Language analysis kinds
//!
//! Each [`AnalysisKind`] knows which REST method it calls, how to build the
//! request body, and which [`OutputSchema`] its flattened response is
//! projected onto.
//!
//! # Example
//!
//! ```rust,ignore
//! let kind: AnalysisKind = "Sentiment Analysis".parse()?;
//! let record = kind.map_response(&response)?;
//! println!("{}", record.to_json());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::flatten::Flattener;
use crate::schema::{Field, FieldType, OutputRecord, OutputSchema};

/// Which parts of the annotate call to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Features {
    /// Sentences and tokens with morphology and dependency edges
    #[serde(alias = "extract_syntax")]
    pub extract_syntax: bool,
    /// Entities with mentions
    #[serde(alias = "extract_entities")]
    pub extract_entities: bool,
    /// Document and sentence level sentiment
    #[serde(alias = "extract_document_sentiment")]
    pub extract_document_sentiment: bool,
    /// Sentiment per entity and mention
    #[serde(alias = "extract_entity_sentiment")]
    pub extract_entity_sentiment: bool,
    /// Content categories
    #[serde(alias = "classify_text")]
    pub classify_text: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            extract_syntax: true,
            extract_entities: true,
            extract_document_sentiment: true,
            extract_entity_sentiment: true,
            classify_text: true,
        }
    }
}

impl Features {
    fn has_entities(&self) -> bool {
        self.extract_entities || self.extract_entity_sentiment
    }

    fn has_sentences(&self) -> bool {
        self.extract_syntax || self.extract_document_sentiment
    }

    fn is_empty(&self) -> bool {
        !(self.has_entities() || self.has_sentences() || self.classify_text)
    }
}

/// A Natural Language API method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisKind {
    /// Known entities such as people, places and organisations
    AnalyzeEntities,
    /// Entities together with the sentiment expressed towards them
    AnalyzeEntitySentiment,
    /// Prevailing emotional opinion of the document and each sentence
    AnalyzeSentiment,
    /// Sentences and tokens with linguistic information
    AnalyzeSyntax,
    /// Any combination of the above in one call
    AnnotateText(Features),
    /// Content categories
    ClassifyText,
}

impl AnalysisKind {
    /// Every kind, with default features for annotate
    pub const ALL: [AnalysisKind; 6] = [
        Self::AnalyzeEntities,
        Self::AnalyzeEntitySentiment,
        Self::AnalyzeSentiment,
        Self::AnalyzeSyntax,
        Self::AnnotateText(Features {
            extract_syntax: true,
            extract_entities: true,
            extract_document_sentiment: true,
            extract_entity_sentiment: true,
            classify_text: true,
        }),
        Self::ClassifyText,
    ];

    /// Identifier used in stage configuration
    pub fn id(&self) -> &'static str {
        match self {
            Self::AnalyzeEntities => "analyze_entities",
            Self::AnalyzeEntitySentiment => "analyze_entity_sentiment",
            Self::AnalyzeSentiment => "analyze_sentiment",
            Self::AnalyzeSyntax => "analyze_syntax",
            Self::AnnotateText(_) => "annotate_text",
            Self::ClassifyText => "classify_text",
        }
    }

    /// Human readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::AnalyzeEntities => "Entity Analysis",
            Self::AnalyzeEntitySentiment => "Entity Sentiment Analysis",
            Self::AnalyzeSentiment => "Sentiment Analysis",
            Self::AnalyzeSyntax => "Syntax Analysis",
            Self::AnnotateText(_) => "ALL (Anotate text)",
            Self::ClassifyText => "Text Classification",
        }
    }

    /// Wrangler directive name
    pub fn directive_name(&self) -> &'static str {
        match self {
            Self::AnalyzeEntities => "nlp-analyze-entities",
            Self::AnalyzeEntitySentiment => "nlp-analyze-entity-sentiment",
            Self::AnalyzeSentiment => "nlp-analyze-sentiment",
            Self::AnalyzeSyntax => "nlp-analyze-syntax",
            Self::AnnotateText(_) => "nlp-anotate-text",
            Self::ClassifyText => "nlp-classify-text",
        }
    }

    /// REST method, appended to `documents:`
    pub fn rest_method(&self) -> &'static str {
        match self {
            Self::AnalyzeEntities => "analyzeEntities",
            Self::AnalyzeEntitySentiment => "analyzeEntitySentiment",
            Self::AnalyzeSentiment => "analyzeSentiment",
            Self::AnalyzeSyntax => "analyzeSyntax",
            Self::AnnotateText(_) => "annotateText",
            Self::ClassifyText => "classifyText",
        }
    }

    /// Replace the annotate features. Other kinds are returned unchanged.
    pub fn with_features(self, features: Features) -> Self {
        match self {
            Self::AnnotateText(_) => Self::AnnotateText(features),
            other => other,
        }
    }

    /// Build the JSON request body
    pub fn request_body(&self, document: &Document, encoding: EncodingType) -> Value {
        let mut body = json!({ "document": document });
        match self {
            // classifyText has no offsets, so no encoding type
            Self::ClassifyText => {}
            Self::AnnotateText(features) => {
                body["features"] = json!(features);
                body["encodingType"] = json!(encoding);
            }
            _ => {
                body["encodingType"] = json!(encoding);
            }
        }
        body
    }

    /// Output schema for this kind
    pub fn output_schema(&self) -> OutputSchema {
        let name = format!("{}Result", upper_camel(self.rest_method()));
        let fields = match self {
            Self::AnalyzeEntities => vec![language_field(), entities_field(false)],
            Self::AnalyzeEntitySentiment => vec![language_field(), entities_field(true)],
            Self::AnalyzeSentiment => {
                let mut fields = vec![language_field()];
                fields.extend(document_sentiment_fields());
                fields.push(sentences_field(true));
                fields
            }
            Self::AnalyzeSyntax => vec![language_field(), sentences_field(false), tokens_field()],
            Self::ClassifyText => vec![categories_field()],
            Self::AnnotateText(features) => {
                let mut fields = vec![language_field()];
                if features.extract_document_sentiment {
                    fields.extend(document_sentiment_fields());
                }
                if features.extract_syntax {
                    fields.push(tokens_field());
                }
                if features.has_sentences() {
                    fields.push(sentences_field(features.extract_document_sentiment));
                }
                if features.has_entities() {
                    fields.push(entities_field(features.extract_entity_sentiment));
                }
                if features.classify_text {
                    fields.push(categories_field());
                }
                fields
            }
        };
        OutputSchema::new(name, fields)
    }

    /// Check the kind can be sent as configured
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::AnnotateText(features) if features.is_empty() => Err(Error::ConfigInvalid {
                message: "annotate_text needs at least one feature enabled".to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Flatten an API response and project it onto this kind's schema
    pub fn map_response(&self, response: &Value) -> Result<OutputRecord> {
        self.map_response_with(&Flattener::default(), response)
    }

    /// Same as [`map_response`](Self::map_response) with a custom flattener
    pub fn map_response_with(&self, flattener: &Flattener, response: &Value) -> Result<OutputRecord> {
        let flat = flattener.flatten_value(response)?;
        self.output_schema().project(&flat)
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for AnalysisKind {
    type Err = Error;

    /// Accepts the configuration id, directive name or display name, ignoring case
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| {
                [kind.id(), kind.directive_name(), kind.display_name()]
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(wanted))
            })
            .ok_or_else(|| Error::ConfigInvalid {
                message: format!("unsupported analysis method: '{}'", s),
            })
    }
}

impl Serialize for AnalysisKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

impl<'de> Deserialize<'de> for AnalysisKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How the API should compute text offsets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EncodingType {
    /// No encoding; offsets are reported as -1
    #[default]
    #[serde(alias = "none")]
    None,
    /// Offsets in UTF-8 bytes
    #[serde(alias = "utf8", alias = "UTF-8")]
    Utf8,
    /// Offsets in UTF-16 code units
    #[serde(alias = "utf16", alias = "UTF-16")]
    Utf16,
    /// Offsets in UTF-32 code points
    #[serde(alias = "utf32", alias = "UTF-32")]
    Utf32,
}

impl FromStr for EncodingType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('-', "").as_str() {
            "NONE" => Ok(Self::None),
            "UTF8" => Ok(Self::Utf8),
            "UTF16" => Ok(Self::Utf16),
            "UTF32" => Ok(Self::Utf32),
            _ => Err(Error::ConfigInvalid {
                message: format!(
                    "type of encoding specified '{}' is not supported. Supported values are NONE, UTF8, UTF16, UTF32",
                    s
                ),
            }),
        }
    }
}

/// The document sent for analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    #[serde(rename = "type")]
    doc_type: &'static str,
    /// Text to analyse
    pub content: String,
    /// ISO-639-1 language code; detected by the API when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Document {
    /// A plain text document
    pub fn plain_text(content: impl Into<String>) -> Self {
        Self {
            doc_type: "PLAIN_TEXT",
            content: content.into(),
            language: None,
        }
    }

    /// Tag the document with a language code
    pub fn with_language(mut self, language: Option<impl Into<String>>) -> Self {
        self.language = language.map(Into::into);
        self
    }
}

fn upper_camel(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn language_field() -> Field {
    Field::required("language", FieldType::String)
}

fn document_sentiment_fields() -> [Field; 2] {
    [
        Field::nullable("score", FieldType::Double),
        Field::nullable("magnitude", FieldType::Double),
    ]
}

fn sentiment_fields() -> [Field; 2] {
    [
        Field::nullable("magnitude", FieldType::Double),
        Field::nullable("score", FieldType::Double),
    ]
}

fn sentences_field(with_sentiment: bool) -> Field {
    let mut fields = vec![
        Field::required("content", FieldType::String),
        Field::nullable("beginOffset", FieldType::Long),
    ];
    if with_sentiment {
        fields.extend(document_sentiment_fields());
    }
    Field::required(
        "sentences",
        FieldType::records(OutputSchema::new("sentencesRecord", fields)),
    )
}

fn tokens_field() -> Field {
    let mut fields = vec![
        Field::required("content", FieldType::String),
        Field::nullable("beginOffset", FieldType::Long),
    ];
    for name in [
        "tag",
        "aspect",
        "case",
        "form",
        "gender",
        "mood",
        "number",
        "person",
        "proper",
        "reciprocity",
        "tense",
        "voice",
    ] {
        fields.push(Field::nullable(name, FieldType::String));
    }
    fields.push(Field::nullable("headTokenIndex", FieldType::Long));
    fields.push(Field::nullable("label", FieldType::String));
    fields.push(Field::nullable("lemma", FieldType::String));
    Field::required(
        "tokens",
        FieldType::records(OutputSchema::new("tokensRecord", fields)),
    )
}

fn entities_field(with_sentiment: bool) -> Field {
    let mut mention = vec![
        Field::required("content", FieldType::String),
        Field::nullable("beginOffset", FieldType::Long),
        Field::nullable("type", FieldType::String),
    ];
    let mut entity = vec![
        Field::required("name", FieldType::String),
        Field::required("type", FieldType::String),
        Field::nullable("metadata", FieldType::Map),
        Field::nullable("salience", FieldType::Double),
    ];
    if with_sentiment {
        mention.extend(sentiment_fields());
        entity.extend(sentiment_fields());
    }
    entity.push(Field::required(
        "mentions",
        FieldType::records(OutputSchema::new("mentionsRecord", mention)),
    ));
    Field::required(
        "entities",
        FieldType::records(OutputSchema::new("entitiesRecord", entity)),
    )
}

fn categories_field() -> Field {
    Field::required(
        "categories",
        FieldType::records(OutputSchema::new(
            "categoriesRecord",
            vec![
                Field::required("name", FieldType::String),
                Field::nullable("confidence", FieldType::Double),
            ],
        )),
    )
}
