//! arplexity - terminal client for the streaming chat server

mod commands;
mod config;
mod render;
mod utils;

use std::io::{self, Write};

use arplexity_chat::{ConversationController, SseTransport, Transport};
use arplexity_wire::{Message, SseClient};
use clap::Parser;
use tokio::sync::{broadcast, mpsc};

/// arplexity - chat with web search, streamed
#[derive(Parser, Debug)]
#[command(name = "arplexity")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Chat server base URL (default: http://127.0.0.1:8000)
    #[arg(short, long)]
    server: Option<String>,

    /// Run in non-interactive mode with a single prompt
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Resume a conversation from a checkpoint id
    #[arg(long)]
    checkpoint: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("arplexity_cli=debug,arplexity_chat=debug,arplexity_wire=debug")
            .with_writer(io::stderr)
            .init();
    }

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cfg = config::Config::load();

    // CLI takes precedence over the config file
    let server_url = args
        .server
        .or(cfg.server_url.clone())
        .unwrap_or_else(|| arplexity_wire::client::DEFAULT_SERVER_URL.to_string());

    let client = match cfg.connect_timeout() {
        Some(timeout) => SseClient::with_connect_timeout(&server_url, timeout)?,
        None => SseClient::new(&server_url)?,
    };
    let transport = SseTransport::new(client);

    let mut controller = new_conversation(&cfg)?;
    controller.set_checkpoint(args.checkpoint);

    if let Some(command) = args.command {
        return run_command(&mut controller, &transport, &command).await;
    }

    run_interactive(&mut controller, &transport, &cfg).await
}

fn new_conversation(cfg: &config::Config) -> anyhow::Result<ConversationController> {
    let history = cfg
        .greeting
        .as_ref()
        .map(|greeting| Message::assistant(1, greeting.clone()));
    Ok(ConversationController::with_history(history)?)
}

/// Spawn a task printing conversation events; it signals each finished turn
fn spawn_renderer(controller: &ConversationController) -> mpsc::UnboundedReceiver<()> {
    let mut receiver = controller.subscribe();
    let (done_tx, done_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut renderer = render::Renderer::new();
        let mut stdout = io::stdout();
        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Renderer fell behind, skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match renderer.render(&event, &mut stdout) {
                Ok(true) => {
                    if done_tx.send(()).is_err() {
                        break;
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Failed to write output: {}", e);
                    break;
                }
            }
        }
    });

    done_rx
}

async fn run_turn(
    controller: &mut ConversationController,
    transport: &dyn Transport,
    done: &mut mpsc::UnboundedReceiver<()>,
    text: &str,
) -> anyhow::Result<()> {
    if controller.send(transport, text).await?.is_some() {
        // wait for the renderer to flush the reply
        done.recv().await;
    }
    Ok(())
}

async fn run_command(
    controller: &mut ConversationController,
    transport: &dyn Transport,
    command: &str,
) -> anyhow::Result<()> {
    println!("arplexity> {}", command);
    println!();

    let mut done = spawn_renderer(controller);
    run_turn(controller, transport, &mut done, command).await?;

    if let Some(checkpoint) = controller.checkpoint() {
        eprintln!("checkpoint: {}", checkpoint);
    }
    Ok(())
}

async fn run_interactive(
    controller: &mut ConversationController,
    transport: &SseTransport,
    cfg: &config::Config,
) -> anyhow::Result<()> {
    if io::IsTerminal::is_terminal(&io::stderr()) {
        eprintln!("arplexity ({})", transport.client().base_url());
        eprintln!();
    }

    for message in controller.snapshot() {
        println!("{}\n", message.content);
    }

    let mut done = spawn_renderer(controller);

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        // Handle slash commands
        if let Some(result) = commands::execute_command(input, controller) {
            match result {
                commands::CommandResult::Clear => {
                    *controller = new_conversation(cfg)?;
                    done = spawn_renderer(controller);
                    println!("Started a new conversation.");
                }
                commands::CommandResult::Exit => break,
                commands::CommandResult::Message(msg) => println!("{}", msg),
                commands::CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}. Type /help for commands.", cmd);
                }
            }
            continue;
        }

        println!();
        run_turn(controller, transport, &mut done, input).await?;
    }

    Ok(())
}
