//! Validate configuration command

use anyhow::{Context, Result};
use std::collections::HashSet;

use langweave_core::{Config, StageConfig};

/// Run the validate command
pub async fn run(config_path: &str) -> Result<()> {
    tracing::info!("Validating configuration: {}", config_path);

    let config = Config::load(config_path).context("Failed to load configuration")?;

    tracing::info!("✓ Project: {}", config.project.name);
    tracing::info!("✓ Version: {}", config.project.version);
    tracing::info!("✓ Endpoint: {}", config.project.api.endpoint);

    let stages = config.load_stages().context("Failed to load stages")?;
    let mut problems = Vec::new();
    let mut seen = HashSet::new();

    for stage in &stages {
        if !seen.insert(stage.name.as_str()) {
            problems.push(format!("duplicate stage name '{}'", stage.name));
        }
        let before = problems.len();
        check_stage(&config, stage, &mut problems);
        if problems.len() == before {
            tracing::info!("✓ Stage: {} ({})", stage.name, stage.analysis_kind());
        }
    }

    if !problems.is_empty() {
        for problem in &problems {
            tracing::error!("✗ {}", problem);
        }
        anyhow::bail!("{} configuration problem(s) found", problems.len());
    }

    tracing::info!("✓ Configuration is valid ({} stage(s))", stages.len());
    Ok(())
}

fn check_stage(config: &Config, stage: &StageConfig, problems: &mut Vec<String>) {
    if let Err(e) = stage.validate() {
        problems.push(e.to_string());
    }

    let references = [Some(&stage.input), Some(&stage.output), stage.errors.as_ref()];
    for reference in references.into_iter().flatten() {
        let resolved = config
            .load_connector_config(reference)
            .and_then(|connector| connector.validate());
        if let Err(e) = resolved {
            problems.push(format!("stage '{}': connector '{}': {}", stage.name, reference, e));
        }
    }
}
