use std::{collections::HashSet, sync::Arc};

use anyhow::Result;
use clap::Parser;
use client_core::{
    load_settings, ChatClient, ChatSessionStore, ConnectionStatusHandler, HistoryClient,
    MessageHandler, MessageOutcome, NotificationHandler,
};
use shared::{
    domain::RoomId,
    protocol::{ChatMessage, ChatNotification},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::warn;

/// Terminal front end for a support agent: follow rooms, read history and
/// reply.
#[derive(Parser, Debug)]
struct Args {
    /// Overrides `broker_url` from settings.
    #[arg(long)]
    broker_url: Option<String>,
    /// Overrides `api_base_url` from settings.
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    token: String,
    /// Account email; also selects the personal notification topic.
    #[arg(long)]
    identity: String,
    /// Rooms to follow; the first one is active.
    #[arg(long = "room")]
    rooms: Vec<String>,
    /// Load the conversation list and room history over REST first.
    #[arg(long)]
    history: bool,
}

enum ConsoleEvent {
    Message(ChatMessage),
    Notification(ChatNotification),
    Status(bool),
}

fn watch_room(client: &ChatClient, room_id: &RoomId, events: &mpsc::UnboundedSender<ConsoleEvent>) {
    let events = events.clone();
    let handler: MessageHandler = Arc::new(move |message: &ChatMessage| {
        let _ = events.send(ConsoleEvent::Message(message.clone()));
    });
    client.add_message_handler(room_id.clone(), handler);
}

fn print_message(message: &ChatMessage) {
    let time = message
        .timestamp
        .map(|time| time.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".into());
    println!("[{}] {time} {}: {}", message.room_id, message.sender, message.content);
}

async fn load_history(
    history: &HistoryClient,
    store: &mut ChatSessionStore,
    rooms: &[RoomId],
) -> Result<()> {
    store.upsert_sessions(history.list_sessions().await?);
    for room_id in rooms {
        let messages = history.list_messages(room_id).await?;
        for message in &messages {
            print_message(message);
        }
        store.replace_history(room_id, messages);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(broker_url) = args.broker_url {
        settings.broker_url = broker_url;
    }
    if let Some(api_url) = args.api_url {
        settings.api_base_url = api_url.trim_end_matches('/').to_string();
    }

    let client = ChatClient::from_settings(settings.clone())?;
    let mut store = ChatSessionStore::new();
    let rooms: Vec<RoomId> = args.rooms.iter().map(|room| RoomId::new(room.as_str())).collect();
    let mut watched: HashSet<RoomId> = HashSet::new();

    if args.history {
        let history = HistoryClient::new(&settings.api_base_url, &args.token);
        if let Err(err) = load_history(&history, &mut store, &rooms).await {
            warn!(error = %format!("{err:#}"), "console: history unavailable");
        }
    }

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let status: ConnectionStatusHandler = {
        let events = events_tx.clone();
        Arc::new(move |connected: bool| {
            let _ = events.send(ConsoleEvent::Status(connected));
        })
    };
    client.add_connection_status_handler(status);
    let notifications: NotificationHandler = {
        let events = events_tx.clone();
        Arc::new(move |notification: &ChatNotification| {
            let _ = events.send(ConsoleEvent::Notification(notification.clone()));
        })
    };
    client.add_notification_handler(notifications);

    for room_id in &rooms {
        watch_room(&client, room_id, &events_tx);
        watched.insert(room_id.clone());
        client.subscribe_to_room(room_id.clone()).await;
    }
    if let Some(first) = rooms.first() {
        store.select(first);
    }
    client.set_credentials(&args.token, &args.identity).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "/quit" {
                    break;
                }
                if line == "/rooms" {
                    for session in store.sessions_by_recency() {
                        println!(
                            "{} {} unread={} {}",
                            session.id,
                            session.participant_name.as_deref().unwrap_or("-"),
                            session.unread_count,
                            session.last_message.as_deref().unwrap_or(""),
                        );
                    }
                    continue;
                }
                if let Some(room) = line.strip_prefix("/room ") {
                    let room_id = RoomId::from(room.trim());
                    if watched.insert(room_id.clone()) {
                        watch_room(&client, &room_id, &events_tx);
                        client.subscribe_to_room(room_id.clone()).await;
                    }
                    let unread = store.select(&room_id);
                    println!("now in {room_id} ({unread} unread)");
                    continue;
                }
                let Some(active) = store.active().cloned() else {
                    println!("join a room first: /room <id>");
                    continue;
                };
                let message = store.push_optimistic(&active, &args.identity, line);
                if client.is_connected() {
                    client.send_message(&active, &message).await;
                } else {
                    store.discard_pending(&active);
                    println!("not connected; message not sent");
                }
            }
            Some(event) = events_rx.recv() => match event {
                ConsoleEvent::Message(message) => {
                    let outcome = store.apply_message(message.clone(), &args.identity);
                    if outcome == MessageOutcome::Appended {
                        print_message(&message);
                    }
                }
                ConsoleEvent::Notification(notification) => {
                    store.apply_notification(&notification, &args.identity);
                    println!(
                        "(notification) {} in {}: {} [{} unread total]",
                        notification.sender,
                        notification.room_id,
                        notification.content_preview,
                        store.total_unread(),
                    );
                }
                ConsoleEvent::Status(connected) => {
                    println!("{}", if connected { "connected" } else { "offline; reconnecting" });
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.disconnect().await;
    Ok(())
}
