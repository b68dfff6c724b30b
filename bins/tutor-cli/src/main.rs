use anyhow::{anyhow, Context, Result};
use chain_tools::catalog::tool_catalog;
use chain_tools::SimulatedChain;
use clap::{Parser, Subcommand};
use conversation::{
    parse, Conversation, ConversationHandle, Dependencies, SessionContext, SessionSnapshot,
    Topic, TransactionLedger,
};
use llm_gateway::build_model;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;
use tutor_core::config::{AppConfig, CONFIG};
use tutor_core::{classify, CallId, CallStatus, Capability, Message, Role};

/// Wallet used by the simulated chain when none is configured.
const DEMO_WALLET: &str = "0x000000000000000000000000000000000000dEaD";

#[derive(Parser, Debug)]
#[command(name = "tutor-cli", about = "Web3 tutor command line", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Chat with the tutor against a simulated chain
    Chat {
        /// Topic id, e.g. dex or staking
        #[arg(long, short = 't')]
        topic: Option<String>,
    },
    /// Parse a model reply and show the extracted function call
    Parse {
        /// Raw model output
        text: String,
    },
    /// Show whether a capability needs approval
    Classify {
        /// Capability name
        name: String,
    },
    /// Print the tool catalog sent to models
    Capabilities,
    /// List the built-in topics
    Topics,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Chat { topic } => chat(topic).await?,
        Commands::Parse { text } => {
            let parsed = parse(&text);
            println!("display: {:?}", parsed.display_text);
            match parsed.invocation {
                Some(invocation) => {
                    println!("function: {}", invocation.name);
                    println!(
                        "arguments: {}",
                        serde_json::to_string_pretty(&invocation.arguments)?
                    );
                }
                None => println!("function: none"),
            }
        }
        Commands::Classify { name } => {
            let effect = classify(&name);
            match Capability::from_name(&name) {
                Some(capability) => println!(
                    "{name}: {effect:?} (requires {})",
                    capability.required_arguments().join(", ")
                ),
                None => println!("{name}: {effect:?} (unknown capability)"),
            }
        }
        Commands::Capabilities => {
            println!("{}", serde_json::to_string_pretty(&tool_catalog())?);
        }
        Commands::Topics => {
            for topic in Topic::builtin() {
                println!("{:<8} {}: {}", topic.id, topic.name, topic.description);
            }
        }
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    if tracing::subscriber::set_global_default(
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .finish(),
    )
    .is_err()
    {
        // tracing already initialised; ignore.
    }
    Ok(())
}

async fn chat(topic: Option<String>) -> Result<()> {
    let config: &AppConfig = &CONFIG;
    let topic = match topic {
        Some(id) => Topic::find(&id).ok_or_else(|| anyhow!("unknown topic {id:?}"))?,
        None => Topic::general(),
    };

    let wallet = config
        .wallet_address
        .clone()
        .unwrap_or_else(|| DEMO_WALLET.to_string());
    let ledger = Arc::new(TransactionLedger::new());
    let model = build_model(config);
    println!("model: {}  wallet: {wallet}  topic: {}", model.label(), topic.name);
    println!("commands: /approve <id>  /reject <id>  /calls  /tx  /topic <id>  /reset  /quit");

    let handle = Conversation::spawn(
        Dependencies {
            model,
            executor: chain_tools::Executor::new(Arc::new(SimulatedChain::new(&wallet))),
            recorder: ledger.clone(),
            context: SessionContext {
                wallet_address: Some(wallet),
                chain_id: config.chain_id,
            },
        },
        topic,
    );

    let mut repl = Repl {
        handle,
        ledger,
        shown: 0,
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        if let Err(err) = repl.handle_line(line).await {
            println!("! {err:#}");
        }
    }

    Ok(())
}

struct Repl {
    handle: ConversationHandle,
    ledger: Arc<TransactionLedger>,
    /// Messages already printed.
    shown: usize,
}

impl Repl {
    async fn handle_line(&mut self, line: &str) -> Result<()> {
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "/approve" => {
                let call = self.handle.approve(&call_id(rest)?).await?;
                println!("approved {} ({})", call.name(), call.id());
            }
            "/reject" => {
                let call = self.handle.reject(&call_id(rest)?).await?;
                println!("rejected {} ({})", call.name(), call.id());
                return Ok(());
            }
            "/calls" => {
                let snapshot = self.handle.snapshot().await?;
                if snapshot.calls.is_empty() {
                    println!("no function calls yet");
                }
                for call in &snapshot.calls {
                    println!(
                        "{}  {:<20} {:<9} {}",
                        call.id(),
                        call.name(),
                        call.status(),
                        serde_json::Value::Object(call.arguments().clone())
                    );
                    if let Some(error) = call.last_error() {
                        println!("    last error: {error}");
                    }
                }
                return Ok(());
            }
            "/tx" => {
                let records = self.ledger.records();
                if records.is_empty() {
                    println!("no transactions recorded");
                }
                for record in records {
                    println!("{}  {}  {}", record.hash, record.status, record.description);
                }
                return Ok(());
            }
            "/reset" => {
                self.handle.reset().await?;
                self.shown = 0;
                println!("conversation cleared");
                return Ok(());
            }
            "/topic" => {
                let topic = Topic::find(rest).ok_or_else(|| anyhow!("unknown topic {rest:?}"))?;
                self.handle.select_topic(topic).await?;
                self.shown = 0;
            }
            _ if command.starts_with('/') => {
                return Err(anyhow!("unknown command {command}"));
            }
            _ => self.handle.send_user_message(line).await?,
        }

        let snapshot = self.handle.when_idle().await?;
        self.print_new(&snapshot);
        Ok(())
    }

    fn print_new(&mut self, snapshot: &SessionSnapshot) {
        for message in snapshot.messages.iter().skip(self.shown) {
            print_message(message);
        }
        self.shown = snapshot.messages.len();

        for call in snapshot
            .calls
            .iter()
            .filter(|call| call.status() == CallStatus::Pending)
        {
            println!(
                "? tutor wants to run {} with {}. /approve {} or /reject {}",
                call.name(),
                serde_json::Value::Object(call.arguments().clone()),
                call.id(),
                call.id()
            );
        }
    }
}

fn call_id(raw: &str) -> Result<CallId> {
    if raw.is_empty() {
        return Err(anyhow!("missing call id, see /calls"));
    }
    Ok(CallId::from(raw))
}

fn print_message(message: &Message) {
    match message.role {
        Role::User => {}
        Role::Assistant => println!("tutor: {}", message.content),
        Role::Function => println!(
            "[{}] {}",
            message.name.as_deref().unwrap_or("function"),
            message.content
        ),
        Role::System => println!("system: {}", message.content),
    }
}
