//! Terminal chat client for the Scribe backend.
//!
//! Run with: `cargo run --bin scribe`
//!
//! Lines are sent as messages and the reply is printed as it streams in.
//! Commands: `/list`, `/open <id>`, `/new`, `/search <query>`, `/analyze`,
//! `/share`, `/help`, `/quit`.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Local, TimeZone};
use tokio::io::{AsyncBufReadExt, BufReader};

use scribe_client::api::types::{AI_PLACEHOLDER, Conversation, ConversationId};
use scribe_client::share::{display_title, share_url};
use scribe_client::start_scribe::get_origin;
use scribe_client::store::Notifier;
use scribe_client::{ApiClient, ConversationStore};

type Store = ConversationStore<ApiClient>;

/// Alerts go to stderr so they never mix with a streamed reply.
struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn alert(&self, message: &str) {
        eprintln!("  ! {message}");
    }
}

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Empty,
    List,
    Open(ConversationId),
    New,
    Search(String),
    Analyze,
    Share,
    Help,
    Quit,
    Invalid(String),
    Send(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Self::Send(line.to_string());
        };

        let (name, arg) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(n, a)| (n, a.trim()));

        match name {
            "list" | "ls" => Self::List,
            "open" => arg
                .parse()
                .map_or_else(|_| Self::Invalid(format!("not a conversation id: {arg:?}")), Self::Open),
            "new" => Self::New,
            "search" => Self::Search(arg.to_string()),
            "analyze" => Self::Analyze,
            "share" => Self::Share,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => Self::Invalid(format!("unknown command: /{other}")),
        }
    }
}

/// Print what `content` adds to what is already on screen.
fn render_delta(shown: &mut String, content: &str, out: &mut impl Write) -> std::io::Result<()> {
    if content == AI_PLACEHOLDER || content == shown {
        return Ok(());
    }
    if let Some(rest) = content.strip_prefix(shown.as_str()) {
        write!(out, "{rest}")?;
    } else {
        // The reply was replaced wholesale (error text).
        write!(out, "\n{content}")?;
    }
    shown.clear();
    shown.push_str(content);
    out.flush()
}

/// List date, e.g. `5 Nov`.
fn short_date<Tz: TimeZone>(timestamp: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    timestamp.format("%-d %b").to_string()
}

fn print_conversations(title: &str, conversations: &[Conversation]) {
    println!("  {title}");
    if conversations.is_empty() {
        println!("    (none)");
    }
    for c in conversations {
        println!(
            "    #{:<5} {}  ({})",
            c.id,
            display_title(&c.title),
            short_date(&c.start_timestamp.with_timezone(&Local))
        );
    }
}

fn print_help() {
    println!("  /list             show conversations");
    println!("  /open <id>        open a conversation");
    println!("  /new              start a new chat");
    println!("  /search <query>   search past conversations");
    println!("  /analyze          summarize the open conversation");
    println!("  /share            print the public link of the open conversation");
    println!("  /quit             exit");
    println!("  anything else is sent as a message");
}

async fn open(store: &Store, id: ConversationId) {
    store.set_current_conversation(Some(id)).await;
    let state = store.snapshot();
    if let Some(detail) = &state.current_conversation {
        println!("  == {} ==", display_title(&detail.conversation.title));
    }
    for message in &state.messages {
        println!("{}> {}", message.sender, message.content);
    }
}

async fn send(store: &Store, text: &str) -> anyhow::Result<()> {
    let mut rx = store.subscribe();
    rx.mark_unchanged();

    let mut stdout = std::io::stdout();
    let mut shown = String::new();

    let sending = store.send_message(text, |_| print!("ai> "));
    tokio::pin!(sending);

    let new_id = loop {
        tokio::select! {
            id = &mut sending => break id,
            Ok(()) = rx.changed() => {
                let content = rx.borrow_and_update().last_message().map(|m| m.content.clone());
                if let Some(content) = content {
                    render_delta(&mut shown, &content, &mut stdout)?;
                }
            }
        }
    };

    if let Some(last) = store.snapshot().last_message() {
        render_delta(&mut shown, &last.content, &mut stdout)?;
    }
    println!();

    if let Some(id) = new_id {
        println!("  (saved as conversation #{id})");
    }
    Ok(())
}

async fn analyze(store: &Store) {
    match store.analyze_current_conversation().await {
        Some(analysis) => {
            println!("  Summary: {}", analysis.summary);
            for point in &analysis.key_points {
                println!("    - {point}");
            }
        }
        None => println!("  (no analysis available)"),
    }
}

fn share(store: &Store) {
    match store.snapshot().current_conversation_id {
        Some(id) => println!("  {}", share_url(&get_origin(), id)),
        None => println!("  Open or finish a conversation before sharing it."),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let client = ApiClient::from_env().context("failed to build HTTP client")?;
    println!("  Scribe: your conversational second brain.");
    println!("  Backend: {}   (/help for commands)", client.config().base_url);

    let store: Store = ConversationStore::with_notifier(Arc::new(client), Arc::new(TerminalNotifier));
    store.fetch_conversations().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        match Command::parse(&line) {
            Command::Empty => {}
            Command::List => {
                store.fetch_conversations().await;
                print_conversations("Conversations", &store.snapshot().conversations);
            }
            Command::Open(id) => open(&store, id).await,
            Command::New => {
                store.start_new_chat();
                println!("  New chat.");
            }
            Command::Search(query) => {
                store.search_conversations(&query).await;
                print_conversations("Results", &store.snapshot().search_results);
            }
            Command::Analyze => analyze(&store).await,
            Command::Share => share(&store),
            Command::Help => print_help(),
            Command::Quit => break,
            Command::Invalid(reason) => println!("  {reason}"),
            Command::Send(text) => send(&store, &text).await?,
        }
    }

    Ok(())
}
