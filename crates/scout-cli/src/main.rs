use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scout_client::{ChromiumSessionFactory, OllamaClassifier, OllamaConfig};
use scout_core::traits::Classifier;
use scout_core::{FetchOptions, ModelReadiness, PageFetcher};

#[derive(Parser)]
#[command(name = "scout", version, about = "Browser snapshot crawler with local-LLM classification")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a page in a headless browser and capture a screenshot
    Snapshot {
        /// Target URL to fetch
        #[arg(short, long)]
        url: String,

        /// Path for the PNG screenshot
        #[arg(short, long)]
        output: PathBuf,

        /// Print the page markup to stdout
        #[arg(long, default_value_t = false)]
        html: bool,

        /// Skip navigation when the screenshot file already exists
        #[arg(long, default_value_t = false)]
        use_cache: bool,

        /// Navigation attempts before giving up
        #[arg(long, default_value_t = 3)]
        max_retries: u32,

        /// Page-load timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },

    /// Classify text with the model server
    Classify {
        /// Task description prefixed to the prompt
        #[arg(short, long)]
        task: String,

        /// Input text to classify
        #[arg(short, long)]
        input: String,

        /// Model-serving endpoint
        #[arg(
            short,
            long,
            env = "SCOUT_OLLAMA_URL",
            default_value = "http://ollama-app:11434"
        )]
        base_url: String,

        /// Model name to pull and query
        #[arg(short, long, env = "SCOUT_MODEL", default_value = "llama3")]
        model: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("scout_core=info,scout_client=info,scout=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Snapshot {
            url,
            output,
            html,
            use_cache,
            max_retries,
            timeout_secs,
        } => {
            let options = FetchOptions {
                use_cache,
                max_retries,
                page_load_timeout: Duration::from_secs(timeout_secs),
            };
            cmd_snapshot(&url, &output, html, options).await?;
        }
        Commands::Classify {
            task,
            input,
            base_url,
            model,
        } => {
            cmd_classify(&task, &input, base_url, model).await?;
        }
    }

    Ok(())
}

async fn cmd_snapshot(url: &str, output: &PathBuf, html: bool, options: FetchOptions) -> Result<()> {
    let factory = ChromiumSessionFactory::new();
    let mut fetcher = PageFetcher::open(factory, options)
        .await
        .context("Failed to launch browser")?;

    let result = fetcher
        .fetch(url, output, html)
        .await
        .with_context(|| format!("Failed to fetch {url}"));
    fetcher.close().await;

    if let Some(markup) = result? {
        println!("{markup}");
    } else {
        tracing::info!(path = %output.display(), "Snapshot complete");
    }
    Ok(())
}

async fn cmd_classify(task: &str, input: &str, base_url: String, model: String) -> Result<()> {
    let config = OllamaConfig::default()
        .with_base_url(base_url)
        .with_model(model);

    let readiness = ModelReadiness::new();
    let classifier = OllamaClassifier::connect(config, &readiness)
        .await
        .context("Failed to initialize model server")?;

    let category = classifier
        .categorize(task, input)
        .await
        .context("Classification request failed")?;

    println!("{category}");
    Ok(())
}
