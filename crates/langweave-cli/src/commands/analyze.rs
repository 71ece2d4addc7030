//! Analyze a single text

use anyhow::{Context, Result};
use std::path::Path;

use langweave_core::{
    AnalysisKind, ApiConfig, Config, EncodingType, HttpLanguageClient, NlpTransform,
};

/// Run the analyze command
///
/// Uses the project's `api` settings when a project is found at
/// `config_path`, otherwise the defaults (public endpoint, auto-detected
/// credentials).
pub async fn run(
    config_path: &str,
    text: &str,
    method: &str,
    language: Option<&str>,
    encoding: &str,
    raw: bool,
) -> Result<()> {
    let kind: AnalysisKind = method.parse()?;
    let encoding: EncodingType = encoding.parse()?;

    let api = if Path::new(config_path).exists() {
        Config::load(config_path)
            .context("Failed to load configuration")?
            .project
            .api
    } else {
        tracing::debug!("No project at {}, using default API settings", config_path);
        ApiConfig::default()
    };
    let client = HttpLanguageClient::from_config(&api)
        .context("Failed to create Natural Language client")?;

    let transform = NlpTransform::new(kind, "text")
        .with_language(language.map(str::to_string))
        .with_encoding(encoding);

    tracing::info!("Running {} on {} characters", kind, text.chars().count());

    let output = if raw {
        transform.get_result_for_text(&client, text).await?
    } else {
        transform.analyze(&client, text).await?.to_json()
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
