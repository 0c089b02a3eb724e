//! Interactive front-end for a tool-use conversation.

use clap::Parser;
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use toolloop_core::{
    load_context_file, AnthropicClient, ClientConfig, Conversation, ConversationConfig,
    ConversationEvent, ConversationObserver, Result,
};

/// Back-off after the service answers 429.
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "toolloop", version, about = "Chat with a model that can edit files in a repository")]
struct Args {
    /// TOML configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(short, long, env = "TOOLLOOP_MODEL")]
    model: Option<String>,

    #[arg(long)]
    max_tokens: Option<u32>,

    #[arg(long)]
    temperature: Option<f64>,

    /// System message sent with every call
    #[arg(short, long)]
    system: Option<String>,

    /// Extended thinking budget in tokens (0 disables)
    #[arg(long)]
    thinking_budget: Option<u32>,

    /// Enable the text editor tool
    #[arg(long)]
    text_editor: bool,

    /// Minimum seconds between calls
    #[arg(long)]
    cooldown: Option<u64>,

    /// Tokens allowed per rate-limit window
    #[arg(long)]
    rate_limit_tokens: Option<u64>,

    /// Rate-limit window in seconds
    #[arg(long)]
    rate_limit_window: Option<u64>,

    /// Root for relative tool paths
    #[arg(short, long)]
    repo_root: Option<PathBuf>,

    /// Do not append the repository listing to the system message
    #[arg(long)]
    no_workspace_listing: bool,

    /// File listing paths to inline ahead of the first prompt
    #[arg(long)]
    context_file: Option<PathBuf>,

    /// Initial prompt
    prompt: Option<String>,
}

impl Args {
    fn conversation_config(&self) -> Result<ConversationConfig> {
        let mut config = match &self.config {
            Some(path) => ConversationConfig::from_toml_file(path)?.with_env_overrides(),
            None => ConversationConfig::from_env(),
        };

        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(v) = self.max_tokens {
            config.max_tokens = v;
        }
        if let Some(v) = self.temperature {
            config.temperature = v;
        }
        if let Some(system) = &self.system {
            config.system_message = Some(system.clone());
        }
        if let Some(v) = self.thinking_budget {
            config.thinking_budget = v;
        }
        if self.text_editor {
            config.text_editor = true;
        }
        if let Some(v) = self.cooldown {
            config.cooldown_secs = v;
        }
        if let Some(v) = self.rate_limit_tokens {
            config.rate_limit_tokens = v;
        }
        if let Some(v) = self.rate_limit_window {
            config.rate_limit_window_secs = v;
        }
        if let Some(root) = &self.repo_root {
            config.repo_root = root.clone();
        }
        if self.no_workspace_listing {
            config.workspace_listing = false;
        }
        Ok(config)
    }
}

/// Prints conversation events to the terminal.
struct ConsoleObserver;

impl ConversationObserver for ConsoleObserver {
    fn on_event(&self, event: &ConversationEvent) {
        match event {
            ConversationEvent::Thinking { thinking } => {
                println!("{}", format!("\n\n\n    Thinking:\n\n{}", thinking).dimmed());
            }
            ConversationEvent::Text { text } => {
                println!("{}", format!("\n\n\n    Assistant:\n\n{}", text).green());
            }
            ConversationEvent::ToolUse { command, path, .. } => {
                println!(
                    "{}",
                    format!(
                        "\n\n\n    Tool: {} called on {}",
                        command.as_deref().unwrap_or("ERROR"),
                        path.as_deref().unwrap_or("ERROR")
                    )
                    .yellow()
                );
            }
            ConversationEvent::ToolResult {
                is_error: true,
                content,
                ..
            } => {
                println!("{}", format!("    {}", content).red());
            }
            ConversationEvent::ToolResult { .. } => {}
            ConversationEvent::RateLimitWait { duration } => {
                println!(
                    "{}",
                    format!("    Waited {:.1}s for rate limit", duration.as_secs_f64()).cyan()
                );
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("toolloop_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn usage_line(conversation: &mut Conversation) -> String {
    let stats = conversation.usage_stats();
    let mut line = format!(
        "\nToken usage: {}/{} ({:.1}%)",
        stats.current_usage, stats.token_limit, stats.usage_percent
    );
    if stats.time_until_full_capacity_secs > 1.0 {
        line.push_str(&format!(
            " - Full capacity in {:.1}s",
            stats.time_until_full_capacity_secs
        ));
    }
    line
}

fn print_stats(conversation: &mut Conversation) -> Result<()> {
    let stats = serde_json::to_value(conversation.usage_stats())?;
    println!("{}", "\nDetailed Rate Limit Statistics:".cyan());
    if let Some(fields) = stats.as_object() {
        for (key, value) in fields {
            match value.as_f64() {
                Some(f) if value.is_f64() => println!("  {}: {:.2}", key, f),
                _ => println!("  {}: {}", key, value),
            }
        }
    }
    Ok(())
}

async fn send(conversation: &mut Conversation, prompt: &str) {
    match conversation.send(prompt).await {
        Ok(_) => {}
        Err(e) if e.is_rate_limited() => {
            error!("Rate limit error: {}", e);
            println!("{}", format!("Rate limit exceeded: {}", e).red());
            println!(
                "{}",
                format!(
                    "Waiting {} seconds before continuing...",
                    RATE_LIMIT_BACKOFF.as_secs()
                )
                .cyan()
            );
            tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
        }
        Err(e) => {
            error!("Error during prompt: {}", e);
            println!("{}", format!("An error occurred: {}", e).red());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    let config = args.conversation_config()?;
    let client = Arc::new(AnthropicClient::new(ClientConfig::from_env()?)?);
    let mut conversation =
        Conversation::new(client, config)?.with_observer(Arc::new(ConsoleObserver));
    info!("Application starting");

    let context = match &args.context_file {
        Some(path) => load_context_file(path)?,
        None => String::new(),
    };
    if let Some(prompt) = &args.prompt {
        send(&mut conversation, &format!("{}{}", context, prompt)).await;
    } else if !context.is_empty() {
        send(&mut conversation, &context).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        println!("{}", usage_line(&mut conversation).cyan());
        print!("{}", "\nPrompt: ".bold());
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("User interrupted the application");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        let prompt = line.trim();
        match prompt.to_lowercase().as_str() {
            "" => continue,
            "exit" | "quit" => {
                info!("User requested exit");
                break;
            }
            "stats" => {
                print_stats(&mut conversation)?;
                continue;
            }
            "clear" => {
                conversation.clear();
                println!("{}", "Conversation history cleared".cyan());
                continue;
            }
            _ => {}
        }

        send(&mut conversation, prompt).await;
    }

    info!("Application shutting down");
    Ok(())
}
