//! Initialize a new langweave project

use anyhow::Result;
use std::fs;
use std::path::Path;

use langweave_core::config::PROJECT_FILE;

/// Run the init command
pub async fn run(path: &str, name: Option<&str>) -> Result<()> {
    let project_dir = Path::new(path);

    // Create directory if it doesn't exist
    if !project_dir.exists() {
        fs::create_dir_all(project_dir)?;
    }

    // Get absolute path for deriving name
    let abs_path = project_dir.canonicalize()?;

    // Derive project name from directory name if not provided
    let project_name = match name {
        Some(n) => n.to_string(),
        None => abs_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Could not determine project name from path"))?,
    };

    // Check if already initialized
    if project_dir.join(PROJECT_FILE).exists() {
        anyhow::bail!(
            "Directory '{}' already contains a {}",
            project_dir.display(),
            PROJECT_FILE
        );
    }

    tracing::info!("Creating new langweave project: {}", project_name);

    fs::create_dir_all(project_dir.join("stages"))?;
    fs::create_dir_all(project_dir.join("connectors"))?;
    fs::create_dir_all(project_dir.join("data"))?;

    let config = format!(
        r#"# langweave Project Configuration
name: {project_name}
version: "0.1.0"

api:
  endpoint: https://language.googleapis.com/v1
  timeout_secs: 30
  # auto_detect reads GOOGLE_API_KEY, then GOOGLE_APPLICATION_CREDENTIALS.
  # Alternatives:
  #   credentials:
  #     service_account_file: /path/to/key.json
  #   credentials:
  #     api_key: ${{GOOGLE_API_KEY}}
  credentials: auto_detect

# Variables available as ${{name}} in stage and connector files
vars:
  language: en
"#
    );
    fs::write(project_dir.join(PROJECT_FILE), config)?;

    let stage = r#"# Sentiment of every review
name: review_sentiment
description: Document and sentence sentiment for customer reviews

method: analyze_sentiment
source_field: review
language_code: ${language}
encoding: UTF8

# skip_on_error | send_to_error | stop_on_error
on_error: send_to_error
concurrency: 4

input: file.input
output: file.output
errors: file.errors
"#;
    fs::write(project_dir.join("stages/review_sentiment.yaml"), stage)?;

    let connectors = r#"# Connector configurations
# These can be referenced in stages as "file.input", "file.output", etc.

input:
  type: file
  path: "./data/reviews.jsonl"
  format: jsonl

output:
  type: file
  path: "./data/sentiment.jsonl"
  format: jsonl

errors:
  type: file
  path: "./data/errors.jsonl"
  format: jsonl
"#;
    fs::write(project_dir.join("connectors/file.yaml"), connectors)?;

    let gitignore = r#"# Output files
data/sentiment.jsonl
data/errors.jsonl

# Credentials
*-key.json

# IDE
.idea/
.vscode/
*.swp
"#;
    fs::write(project_dir.join(".gitignore"), gitignore)?;

    let sample_data = r#"{"id": 1, "review": "This test is so awesome!"}
{"id": 2, "review": "Delivery took three weeks and the box was damaged."}
{"id": 3, "review": "It works. Nothing more to say."}
"#;
    fs::write(project_dir.join("data/reviews.jsonl"), sample_data)?;

    tracing::info!(
        "✓ Created project '{}' at {}",
        project_name,
        abs_path.display()
    );
    tracing::info!("");
    tracing::info!("Next steps:");
    if path != "." {
        tracing::info!("  cd {}", project_dir.display());
    }
    tracing::info!("  export GOOGLE_API_KEY=...  # or GOOGLE_APPLICATION_CREDENTIALS");
    tracing::info!("  langweave validate         # Check configuration");
    tracing::info!("  langweave run              # Analyze data/reviews.jsonl");

    Ok(())
}
