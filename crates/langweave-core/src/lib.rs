//! langweave Core Library
//!
//! This crate provides the core functionality for langweave:
//! - Flattening of Natural Language API responses and schema projection
//! - Analysis kinds with their requests and output schemas
//! - The API client and credential handling
//! - Configuration parsing and validation
//! - Stage transforms, directives and connectors
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │    Input    │────▶│  Language   │────▶│   Flatten   │────▶│   Output    │
//! │  Connector  │     │   Client    │     │  + Project  │     │  Connector  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use langweave_core::{AnalysisKind, HttpLanguageClient, NlpTransform};
//!
//! let client = HttpLanguageClient::from_config(&config.project.api)?;
//! let transform = NlpTransform::new(AnalysisKind::AnalyzeSentiment, "body");
//! let record = transform.analyze(&client, "This test is so awesome!").await?;
//! println!("{}", record.to_json());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod auth;
pub mod client;
pub mod config;
pub mod connectors;
pub mod directive;
pub mod error;
pub mod flatten;
pub mod schema;
pub mod transform;

pub use analysis::{AnalysisKind, Document, EncodingType, Features};
pub use auth::{Credentials, CredentialsConfig};
pub use client::{ApiConfig, HttpLanguageClient, LanguageClient};
pub use config::{Config, ErrorHandling, ProjectConfig, StageConfig};
pub use directive::NlpDirective;
pub use error::{Error, Result};
pub use flatten::{FlatRecord, FlatValue, Flattener};
pub use schema::{OutputRecord, OutputSchema, OutputValue};
pub use transform::{InvalidEntry, NlpTransform, Outcome};
