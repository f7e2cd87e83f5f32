// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! chatsync: follow and post to conversations from the terminal.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use chatsync::config::{self, Config};
use chatsync::{
    Error, ErrorKind, HttpRecordApi, ResourceState, Result, SyncController, SyncHandle, SyncSettings,
    SyncSnapshot, WebSocketTransport,
};
use cs_core::{Delivery, Message};

/// chatsync: real-time conversation sync client
#[derive(Parser, Debug)]
#[command(name = "chatsync")]
#[command(about = "Keep a conversation list and transcript in sync with the server")]
struct Args {
    /// Config file (defaults to $CHATSYNC_CONFIG, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print list and transcript changes until Ctrl-C
    Tail {
        /// Conversation to open
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Send one message and wait for the server to confirm it
    Send {
        conversation: String,
        content: String,
    },
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let path = config::resolve_path(args.config)?;
    let config = Config::load(&path)?;
    debug!("loaded config from {}", path.display());

    let mut settings = SyncSettings::from_config(&config);
    if let Command::Tail {
        conversation: Some(id),
    } = &args.command
    {
        settings.initial_conversation = Some(id.clone());
    }

    let api = HttpRecordApi::new(
        config.api_url.clone(),
        settings.credential.clone(),
        config.request_timeout(),
    )?;
    let (controller, handle) =
        SyncController::new(settings, WebSocketTransport::new(), Arc::new(api));
    let task = controller.spawn();

    let result = match args.command {
        Command::Tail { .. } => tail(&handle).await,
        Command::Send {
            conversation,
            content,
        } => send(&handle, &conversation, &content).await,
    };

    // The loop may already be gone; nothing left to stop then.
    let _ = handle.shutdown();
    let _ = task.await;
    result
}

async fn tail(handle: &SyncHandle) -> Result<()> {
    let mut rx = handle.watch();
    let mut printed = Printed::default();

    loop {
        let snapshot = rx.borrow_and_update().clone();
        printed.update(&snapshot);
        if !snapshot.running {
            return Ok(());
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                return Ok(());
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

/// What `tail` already wrote, so each snapshot only prints the difference.
#[derive(Default)]
struct Printed {
    list: Vec<String>,
    transcript: Vec<(String, Delivery)>,
    error: Option<String>,
}

impl Printed {
    fn update(&mut self, snapshot: &SyncSnapshot) {
        let store = &snapshot.store;

        let list: Vec<String> = store
            .conversations()
            .iter()
            .map(|c| {
                let unread = if c.unread_count > 0 {
                    format!(" ({})", c.unread_count)
                } else {
                    String::new()
                };
                let last = c
                    .last_message
                    .as_ref()
                    .map(|m| format!(": {}", m.content))
                    .unwrap_or_default();
                format!("{} {}{}{}", c.id, c.title(store.local_user()), unread, last)
            })
            .collect();
        if list != self.list && snapshot.list == ResourceState::Loaded {
            println!("-- conversations --");
            for line in &list {
                println!("{}", line);
            }
            self.list = list;
        }

        if let Some(active) = store.active() {
            let transcript = store.transcript(active);
            let seen = self.transcript.len();
            let unchanged_prefix = transcript
                .iter()
                .zip(&self.transcript)
                .take_while(|(m, (id, delivery))| &m.id == id && m.delivery == *delivery)
                .count();
            if unchanged_prefix < seen {
                println!("-- {} --", active);
                self.transcript.clear();
            }
            for message in &transcript[self.transcript.len()..] {
                println!("{}", format_message(message));
                self.transcript.push((message.id.clone(), message.delivery));
            }
        }

        let error = snapshot.error.as_ref().map(|e| {
            let hint = if e.retryable { " (retry available)" } else { "" };
            format!("{} error: {}{}", e.kind, e.message, hint)
        });
        if error != self.error {
            if let Some(line) = &error {
                eprintln!("{}", line);
            }
            self.error = error;
        }
    }
}

fn format_message(message: &Message) -> String {
    let marker = match message.delivery {
        Delivery::Confirmed => "",
        Delivery::Pending => " [sending]",
        Delivery::Failed => " [failed]",
    };
    format!(
        "[{}] {}: {}{}",
        message.created_at.format("%H:%M"),
        message.sender_name,
        message.content,
        marker
    )
}

async fn send(handle: &SyncHandle, conversation: &str, content: &str) -> Result<()> {
    let snapshot = handle
        .wait_for(|s| {
            let gave_up = matches!(s.list, ResourceState::Failed { .. }) && !s.list_pending;
            !s.running
                || s.list == ResourceState::Loaded
                || gave_up
                || s.error.as_ref().is_some_and(|e| e.kind == ErrorKind::Auth)
        })
        .await?;
    if snapshot.list != ResourceState::Loaded {
        let reason = snapshot
            .error
            .map(|e| e.message)
            .unwrap_or_else(|| "conversation list unavailable".to_string());
        return Err(Error::SendFailed(reason));
    }
    if snapshot.store.conversation(conversation).is_none() {
        return Err(Error::UnknownConversation(conversation.to_string()));
    }

    // Snapshots can be skipped: confirmed means the local id is gone and
    // the transcript grew.
    let before = snapshot.store.transcript(conversation).len();
    let local_id = handle.send_message(conversation, content)?;
    let snapshot = handle
        .wait_for(|s| {
            let transcript = s.store.transcript(conversation);
            match transcript.iter().find(|m| m.id == local_id) {
                Some(local) => !s.running || local.delivery == Delivery::Failed,
                None => !s.running || transcript.len() > before,
            }
        })
        .await?;

    let failed = snapshot
        .store
        .transcript(conversation)
        .iter()
        .any(|m| m.id == local_id);
    if failed {
        let reason = snapshot
            .error
            .map(|e| e.message)
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(Error::SendFailed(reason));
    }
    println!("sent to {}", conversation);
    Ok(())
}
