//! Run analysis stages

use anyhow::{Context, Result};
use langweave_core::Config;
use langweave_runtime::{RunReport, Runtime};

/// Run one stage, or every stage in file order
pub async fn run(config_path: &str, stage: Option<&str>) -> Result<()> {
    tracing::info!("Loading configuration from {}", config_path);

    let config = Config::load(config_path).context("Failed to load configuration")?;

    tracing::info!("Project: {}", config.project.name);

    let stages = match stage {
        Some(name) => vec![config.load_stage(name)?],
        None => config.load_stages().context("Failed to load stages")?,
    };
    if stages.is_empty() {
        anyhow::bail!("No stages found in {}", config.base_path.join("stages").display());
    }

    let runtime = Runtime::new(config);
    let client = runtime.connect()?;

    tracing::info!("Running {} stage(s) (press Ctrl+C to stop)", stages.len());

    let work = async {
        let mut reports = Vec::with_capacity(stages.len());
        for stage in &stages {
            reports.push(runtime.run(stage, client.clone()).await?);
        }
        Ok::<Vec<RunReport>, anyhow::Error>(reports)
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received shutdown signal");
    };

    tokio::select! {
        result = work => {
            for report in result.context("Stage run failed")? {
                println!("{report}");
            }
        }
        _ = shutdown => {
            tracing::warn!("Interrupted; in-flight records were not written");
        }
    }

    tracing::info!("langweave stopped");
    Ok(())
}
