//! Terminal client for marketplace messaging.
//!
//! Reads `CHAT_API_URL`, `CHAT_API_TOKEN`, `CHAT_USER_ID` and the optional
//! `CHAT_USER_FIRST_NAME`, `CHAT_USER_LAST_NAME`, `CHAT_USER_EMAIL` plus the
//! hub settings (`CHAT_ROLE`, `CHAT_SOCKET_URL`, ...) from the environment or
//! a `.env` file.

mod render;

use std::env;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chat_client::RestChatClient;
use clap::{Parser, Subcommand};
use colored::Colorize;
use messaging::{
    CurrentUser, HubConfig, HubEvent, MessagingHub, MessagingSession, PushChannel,
    WebSocketPushChannel,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chat")]
#[command(about = "Marketplace messaging from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List conversation threads
    Threads {
        #[arg(long)]
        json: bool,
        /// Only threads with unread messages
        #[arg(long)]
        unread: bool,
    },

    /// Show the messages of one thread
    Show { thread: String },

    /// Send a message
    Send {
        thread: String,
        #[arg(required = true, trailing_var_arg = true)]
        content: Vec<String>,
    },

    /// Mark a thread, or one message in it, as read
    Read {
        thread: String,
        #[arg(long)]
        message: Option<String>,
    },

    /// Start a conversation with another user
    Start { user_id: String },

    /// List the user directory
    Users,

    /// Follow new messages until interrupted
    Watch,
}

fn current_user_from_env() -> Result<CurrentUser> {
    let id = env::var("CHAT_USER_ID").context("CHAT_USER_ID must be set")?;
    let first = env::var("CHAT_USER_FIRST_NAME").unwrap_or_default();
    let last = env::var("CHAT_USER_LAST_NAME").unwrap_or_default();

    let user = CurrentUser::new(id, first, last);
    Ok(match env::var("CHAT_USER_EMAIL") {
        Ok(email) if !email.trim().is_empty() => user.with_email(email),
        _ => user,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,messaging=info,chat_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = HubConfig::from_env().context("Failed to load messaging configuration")?;
    let api = RestChatClient::from_env().context("Failed to create chat API client")?;
    let user = current_user_from_env()?;
    let hub = MessagingHub::new(Arc::new(api), user, config);

    match cli.command {
        Commands::Threads { json, unread } => cmd_threads(&hub, json, unread).await,
        Commands::Show { thread } => cmd_show(&hub, &thread).await,
        Commands::Send { thread, content } => cmd_send(&hub, &thread, &content.join(" ")).await,
        Commands::Read { thread, message } => cmd_read(&hub, &thread, message.as_deref()).await,
        Commands::Start { user_id } => cmd_start(&hub, &user_id).await,
        Commands::Users => cmd_users(&hub).await,
        Commands::Watch => cmd_watch(hub).await,
    }
}

async fn load(hub: &MessagingHub) -> Result<()> {
    hub.fetch_chat_rooms(true)
        .await
        .context("Failed to load conversations")?;
    Ok(())
}

async fn cmd_threads(hub: &MessagingHub, json: bool, unread: bool) -> Result<()> {
    load(hub).await?;
    let threads: Vec<_> = hub
        .threads()
        .await
        .into_iter()
        .filter(|t| !unread || t.unread_count > 0)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&threads)?);
        return Ok(());
    }
    render::print_threads(&threads);
    Ok(())
}

async fn cmd_show(hub: &MessagingHub, thread_id: &str) -> Result<()> {
    load(hub).await?;
    let Some(thread) = hub.thread(thread_id).await else {
        bail!("No conversation {}", thread_id);
    };
    render::print_thread(&thread, &hub.user().id);
    Ok(())
}

async fn cmd_send(hub: &MessagingHub, thread_id: &str, content: &str) -> Result<()> {
    load(hub).await?;
    let message = hub.send_message(thread_id, content).await?;
    println!("{} {}", "✓ Sent".green(), message.id.dimmed());
    Ok(())
}

async fn cmd_read(hub: &MessagingHub, thread_id: &str, message_id: Option<&str>) -> Result<()> {
    load(hub).await?;
    match message_id {
        Some(message_id) => hub.mark_message_as_read(thread_id, message_id).await?,
        None => hub.mark_as_read(thread_id).await?,
    }
    println!("{}", "✓ Marked as read".green());
    Ok(())
}

async fn cmd_start(hub: &MessagingHub, user_id: &str) -> Result<()> {
    load(hub).await?;
    let thread_id = hub.start_chat(user_id).await?;
    println!("{} {}", "✓ Conversation".green(), thread_id.bold());
    Ok(())
}

async fn cmd_users(hub: &MessagingHub) -> Result<()> {
    let users = hub
        .load_users()
        .await
        .context("Failed to load user directory")?;
    render::print_users(&users);
    Ok(())
}

async fn cmd_watch(hub: MessagingHub) -> Result<()> {
    let push = hub
        .config()
        .socket_url
        .clone()
        .map(|url| Arc::new(WebSocketPushChannel::new(url)) as Arc<dyn PushChannel>);

    let mut events = hub.subscribe();
    let mut session = MessagingSession::start(hub, push).await;

    render::print_threads(&session.hub().threads().await);
    println!();
    println!(
        "{}",
        format!(
            "Watching ({}), Ctrl-C to stop",
            if session.is_push_connected() { "push + polling" } else { "polling" }
        )
        .dimmed()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(HubEvent::MessageReceived { thread_id }) => {
                    if let Some(thread) = session.hub().thread(&thread_id).await {
                        render::print_incoming(&thread);
                    }
                }
                Ok(HubEvent::Notice(notice)) => render::print_notice(&notice),
                Ok(HubEvent::ThreadsChanged) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
