//! OpenJustice CLI
//!
//! Submit an image with a description and watch the flow's answer stream in.
//! Credentials come from the environment or a `.env` file:
//!
//! ```text
//! OPENJUSTICE_API_KEY=...            required
//! OPENJUSTICE_API_URL=https://...    optional, defaults to staging
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use openjustice::{
    select_conversation, ApiConfig, ClientBuilder, FileUpload, ImageAttachment, Transcript,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "openjustice")]
#[command(about = "OpenJustice CLI - send an image and a description, stream the response")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API base URL
    #[arg(long, env = "OPENJUSTICE_API_URL", global = true)]
    api_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload an image, send a description and stream the flow response
    Submit {
        /// Image to upload
        #[arg(long)]
        image: PathBuf,

        /// What to ask about the image
        #[arg(long)]
        description: String,

        /// Milliseconds to wait between sending and opening the stream
        #[arg(long, default_value_t = 1000)]
        grace_ms: u64,

        /// Print the assistant reply as pretty JSON instead of text deltas
        #[arg(long)]
        json: bool,

        /// Write the chat transcript, image included, to this file
        #[arg(long)]
        save_transcript: Option<PathBuf>,
    },

    /// List conversations and show which one a submission would use
    Conversations,
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenv() {
        // Only note a missing .env file - it's optional
        eprintln!("Note: no .env file loaded ({})", e);
    }

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut api = ApiConfig::from_env().context("Failed to load API configuration")?;
    if let Some(api_url) = &cli.api_url {
        api = ApiConfig::new(api.api_key.clone(), api_url)?;
    }
    info!("Using API at {}", api.api_url);

    match cli.command {
        Commands::Submit {
            image,
            description,
            grace_ms,
            json,
            save_transcript,
        } => {
            let options = SubmitOptions {
                grace_ms,
                json,
                save_transcript,
            };
            submit(&api, image, &description, options).await
        }
        Commands::Conversations => conversations(&api).await,
    }
}

struct SubmitOptions {
    grace_ms: u64,
    json: bool,
    save_transcript: Option<PathBuf>,
}

async fn submit(
    api: &ApiConfig,
    image: PathBuf,
    description: &str,
    options: SubmitOptions,
) -> Result<()> {
    let client = ClientBuilder::new()
        .api_config(api)
        .stream_grace_period(Duration::from_millis(options.grace_ms))
        .build()?;

    let file = FileUpload::from_path(&image).await?;
    let mut transcript = Transcript::new();
    let placeholder = transcript
        .submit_user(description, Some(&ImageAttachment::from(&file)))
        .context("Description must not be empty")?;

    let json = options.json;
    let mut printed_fragments = 0;
    let result = client
        .process_submission(&file, description.trim(), |snapshot| {
            transcript.update_assistant(placeholder, snapshot);
            if json {
                return;
            }
            for fragment in &snapshot.messages[printed_fragments..] {
                print!("{}", fragment);
            }
            printed_fragments = snapshot.messages.len();
            let _ = std::io::stdout().flush();
        })
        .await;

    transcript.finish_assistant(placeholder, result.as_ref().map(|_| ()));

    if let Some(path) = &options.save_transcript {
        let rendered = serde_json::to_string_pretty(&transcript)?;
        tokio::fs::write(path, rendered)
            .await
            .with_context(|| format!("Failed to write transcript to {}", path.display()))?;
        info!("Transcript saved to {}", path.display());
    }

    let reply = transcript
        .message(placeholder)
        .map(|message| message.content.clone())
        .unwrap_or_default();

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            eprintln!("{}", reply);
            return Err(e.into());
        }
    };

    if json {
        // Nothing was streamed: fall back to the response, which carries the warning
        if reply.is_empty() {
            println!("{}", response.to_pretty_json());
        } else {
            println!("{}", reply);
        }
    } else {
        println!();
        if let Some(warning) = &response.warning {
            eprintln!("⚠️  {}", warning);
        }
        if !response.complete {
            eprintln!("Stream ended before the flow reported completion");
        }
    }

    Ok(())
}

async fn conversations(api: &ApiConfig) -> Result<()> {
    let client = ClientBuilder::new().api_config(api).build()?;

    let list = client
        .list_conversations()
        .await
        .map_err(|reason| anyhow::anyhow!(reason))?;
    let titles = &client.config().conversation_titles;
    let selected = select_conversation(&list, titles.as_slice());

    for conversation in &list {
        let id = conversation.id.as_deref().unwrap_or("<no id>");
        let marker = if conversation.id.is_some() && selected == conversation.id {
            "*"
        } else {
            " "
        };
        println!(
            "{} {}  {}",
            marker,
            id,
            conversation.title.as_deref().unwrap_or("(untitled)")
        );
    }

    if list.is_empty() {
        println!("No conversations; the server will create one on the first submission.");
    }

    Ok(())
}
