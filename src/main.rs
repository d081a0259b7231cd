use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use counsel::{config, gemini::GeminiClient, web_server};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Upload the document and serve the chat UI.
    Serve {
        #[arg(long, default_value_t = 8600, help = "Port for the web server.")]
        port: u16,
        #[arg(
            long,
            env = "COUNSEL_PDF",
            default_value = "resources/constitution.pdf",
            help = "PDF the assistant answers from."
        )]
        pdf: PathBuf,
        #[arg(
            long,
            env = "COUNSEL_MODEL",
            default_value = "gemini-2.5-flash",
            help = "Gemini model id."
        )]
        model: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for environment variables like API keys)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG environment variable (e.g., RUST_LOG=info,counsel=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, pdf, model } => {
            // Credential check first, then the local file, then the one-time
            // upload. Each failure halts startup before serving.
            let api_key = config::api_key().context("cannot start without an API credential")?;
            let client = Arc::new(GeminiClient::new(api_key));

            let document = client
                .upload_file(&pdf)
                .await
                .context("document registration failed")?;
            info!("Document uploaded as {}", document.name);

            web_server::start_web_server(port, client, Arc::new(document), model).await?;
        }
    }

    Ok(())
}
