//! langweave CLI
//!
//! Developer tool for Natural Language analysis projects.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// langweave - Google Cloud Natural Language analyses over text records
#[derive(Parser)]
#[command(name = "langweave")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file or project directory
    #[arg(short, long, default_value = "langweave.yaml", env = "LANGWEAVE_CONFIG")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new langweave project
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Project name (defaults to directory name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Analyze a single text and print the result
    Analyze {
        /// Text to analyze
        text: String,

        /// Analysis method (e.g. analyze_sentiment, classify_text)
        #[arg(short, long, default_value = "analyze_sentiment")]
        method: String,

        /// ISO-639-1 language code of the text
        #[arg(short, long)]
        language: Option<String>,

        /// Offset encoding: NONE, UTF8, UTF16, UTF32
        #[arg(short, long, default_value = "UTF8")]
        encoding: String,

        /// Print the raw API response instead of the projected record
        #[arg(long)]
        raw: bool,
    },

    /// Run stages over their input connectors
    Run {
        /// Run a specific stage only
        #[arg(short, long)]
        stage: Option<String>,
    },

    /// Validate configuration without running
    Validate,

    /// Inspect stages
    Stage {
        #[command(subcommand)]
        command: StageCommands,
    },
}

#[derive(Subcommand)]
enum StageCommands {
    /// List all stages
    List,

    /// Show stage details and output schema
    Show {
        /// Stage name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Logs go to stderr so command output can be piped
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    match cli.command {
        Commands::Init { path, name } => {
            commands::init::run(&path, name.as_deref()).await?;
        }
        Commands::Analyze {
            text,
            method,
            language,
            encoding,
            raw,
        } => {
            commands::analyze::run(
                &cli.config,
                &text,
                &method,
                language.as_deref(),
                &encoding,
                raw,
            )
            .await?;
        }
        Commands::Run { stage } => {
            commands::run::run(&cli.config, stage.as_deref()).await?;
        }
        Commands::Validate => {
            commands::validate::run(&cli.config).await?;
        }
        Commands::Stage { command } => match command {
            StageCommands::List => {
                commands::stage::list(&cli.config).await?;
            }
            StageCommands::Show { name } => {
                commands::stage::show(&cli.config, &name).await?;
            }
        },
    }

    Ok(())
}
