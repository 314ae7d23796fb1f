//! Terminal chat client.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use chat_session::{ChatSession, SendOutcome, SessionConfig};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// How often the API is probed in the background.
const HEALTH_INTERVAL: Duration = Duration::from_secs(30);

const HELP: &str = "Commands:
  /new            start a new conversation
  /list           list conversations, most recent first
  /switch <id>    switch to a conversation
  /delete <id>    delete a conversation
  /clear          delete all conversations
  /cancel         cancel the streaming reply
  /health         check the chat API
  /quit           exit
Anything else is sent as a message.";

#[derive(Debug, Parser)]
#[command(name = "chat")]
#[command(about = "Chat with a streaming assistant from the terminal")]
struct Args {
    /// Chat API base URL. Falls back to CHAT_API_URL env.
    #[arg(long)]
    api_url: Option<String>,

    /// Conversation database. Falls back to CHAT_DB_PATH env.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Message to send before reading from stdin
    #[arg(long)]
    prompt: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    New,
    List,
    Switch(&'a str),
    Delete(&'a str),
    Clear,
    Cancel,
    Health,
    Help,
    Quit,
    Unknown(&'a str),
    Send(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Send(line);
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        match (name, arg) {
            ("new", _) => Command::New,
            ("list", _) => Command::List,
            ("switch", id) if !id.is_empty() => Command::Switch(id),
            ("delete", id) if !id.is_empty() => Command::Delete(id),
            ("clear", _) => Command::Clear,
            ("cancel", _) => Command::Cancel,
            ("health", _) => Command::Health,
            ("help", _) => Command::Help,
            ("quit" | "exit", _) => Command::Quit,
            _ => Command::Unknown(line),
        }
    }
}

/// Send `text`, wait for the reply to settle, and print it.
///
/// Ctrl-C while waiting cancels the reply.
async fn send_and_print(session: &ChatSession, text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut updates = session.subscribe()?;

    let conversation_id = match session.send_message(text)? {
        SendOutcome::Started {
            conversation_id, ..
        } => conversation_id,
        SendOutcome::Ignored => return Ok(()),
        SendOutcome::Dropped => {
            println!("(a reply is still streaming, use /cancel)");
            return Ok(());
        }
    };

    tokio::select! {
        settled = updates.wait_for(|s| !s.streaming) => {
            settled?;
        }
        _ = tokio::signal::ctrl_c() => {
            session.cancel()?;
            println!("(cancelled)");
        }
    }

    let snapshot = session.snapshot()?;
    if let Some(reply) = snapshot
        .conversations
        .get(&conversation_id)
        .and_then(|c| c.last_message())
    {
        println!("{}", reply.content);
    }
    Ok(())
}

fn print_conversations(session: &ChatSession) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = session.snapshot()?;
    let active = snapshot.current_conversation().map(|c| c.id.clone());

    for conversation in snapshot.sorted_conversations() {
        let marker = if Some(&conversation.id) == active.as_ref() { "*" } else { " " };
        println!(
            "{} {}  {}  ({} messages)",
            marker,
            conversation.id,
            conversation.title,
            conversation.messages.len()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = SessionConfig::from_env();
    if let Some(api_url) = args.api_url {
        config.api_url = api_url;
    }
    if let Some(db) = args.db {
        config.db_path = db;
    }

    let session = ChatSession::from_config(&config)?;
    if !session.is_available().await {
        eprintln!("warning: chat API at {} is not reachable", config.api_url);
    }
    let monitor = session.client().start_health_monitor(HEALTH_INTERVAL);

    if let Some(prompt) = args.prompt {
        send_and_print(&session, &prompt).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if session.client().is_available() {
            print!("> ");
        } else {
            print!("(offline) > ");
        }
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match Command::parse(&line) {
            Command::New => {
                let id = session.new_conversation()?;
                println!("(new conversation {})", id);
            }
            Command::List => print_conversations(&session)?,
            Command::Switch(id) => {
                if !session.switch_conversation(id)? {
                    println!("(no conversation {})", id);
                }
            }
            Command::Delete(id) => {
                if !session.delete_conversation(id)? {
                    println!("(no conversation {})", id);
                }
            }
            Command::Clear => {
                session.clear_history()?;
                println!("(history cleared)");
            }
            Command::Cancel => {
                if !session.cancel()? {
                    println!("(nothing to cancel)");
                }
            }
            Command::Health => {
                let status = if session.is_available().await { "available" } else { "unavailable" };
                println!("(chat API {})", status);
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
            Command::Unknown(line) => println!("(unknown command {}, try /help)", line),
            Command::Send(text) => send_and_print(&session, text).await?,
        }
    }

    monitor.abort();
    session.cancel()?;
    info!("Chat client exiting");
    Ok(())
}
