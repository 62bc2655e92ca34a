use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use client_core::{ChatClient, ClientSettings, MessageHandler};
use futures::{SinkExt, StreamExt};
use shared::{domain::RoomId, protocol::ChatMessage};
use stomp::{Command, Frame, HeartBeat, StompMessage};
use tokio::{
    net::TcpListener,
    sync::{mpsc, Mutex},
    time::timeout,
};

#[derive(Clone, Default)]
struct BrokerState {
    authorizations: Arc<Mutex<Vec<String>>>,
    commands: Arc<Mutex<Vec<Command>>>,
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<BrokerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| broker_connection(state, socket))
}

/// Minimal single-connection STOMP broker: SEND to
/// `/app/chat.sendMessage/{room}` is echoed to `/topic/public/{room}`.
async fn broker_connection(state: BrokerState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscriptions: Vec<(String, String)> = Vec::new();

    while let Some(Ok(message)) = receiver.next().await {
        let payload = match message {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(bytes) => bytes,
            Message::Close(_) => break,
            _ => continue,
        };
        let frame = match StompMessage::decode(&payload) {
            Ok(StompMessage::Frame(frame)) => frame,
            Ok(StompMessage::Heartbeat) => continue,
            Err(_) => break,
        };
        state.commands.lock().await.push(frame.command);

        let reply = match frame.command {
            Command::Connect => {
                state
                    .authorizations
                    .lock()
                    .await
                    .push(frame.header("Authorization").unwrap_or_default().to_string());
                Some(
                    Frame::new(Command::Connected)
                        .with_header("version", "1.2")
                        .with_header("heart-beat", "0,0"),
                )
            }
            Command::Subscribe => {
                if let (Some(id), Some(destination)) =
                    (frame.header("id"), frame.header("destination"))
                {
                    subscriptions.push((id.to_string(), destination.to_string()));
                }
                None
            }
            Command::Unsubscribe => {
                let id = frame.header("id").unwrap_or_default();
                subscriptions.retain(|(known, _)| known != id);
                None
            }
            Command::Send => {
                let room = frame
                    .header("destination")
                    .and_then(|destination| destination.strip_prefix("/app/chat.sendMessage/"))
                    .unwrap_or_default();
                let topic = format!("/topic/public/{room}");
                subscriptions
                    .iter()
                    .find(|(_, destination)| *destination == topic)
                    .map(|(id, destination)| {
                        Frame::new(Command::Message)
                            .with_header("subscription", id.as_str())
                            .with_header("message-id", "1")
                            .with_header("destination", destination.as_str())
                            .with_header("content-type", "application/json")
                            .with_body(frame.body.clone())
                    })
            }
            Command::Disconnect => break,
            _ => None,
        };

        if let Some(reply) = reply {
            let text = String::from_utf8(reply.encode()).unwrap_or_default();
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    }
}

async fn spawn_broker() -> anyhow::Result<(String, BrokerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = BrokerState::default();
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/ws"), state))
}

async fn wait_connected(client: &ChatClient) {
    for _ in 0..200 {
        if client.is_connected() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("client never connected");
}

#[tokio::test]
async fn websocket_round_trip_through_stomp_broker() {
    let (broker_url, state) = spawn_broker().await.expect("spawn broker");
    let settings = ClientSettings {
        broker_url,
        heart_beat: HeartBeat::default(),
        ..ClientSettings::default()
    };
    let client = ChatClient::from_settings(settings).expect("client");

    let room = RoomId::new("77");
    let (tx, mut rx) = mpsc::unbounded_channel::<ChatMessage>();
    let handler: MessageHandler = Arc::new(move |message: &ChatMessage| {
        let _ = tx.send(message.clone());
    });
    client.add_message_handler(room.clone(), handler);

    client.set_credentials("tok-ws", "agent@example.com").await;
    wait_connected(&client).await;
    client.subscribe_to_room(room.clone()).await;
    client
        .send_message(
            &room,
            &ChatMessage::chat(room.clone(), "agent@example.com", "echo me"),
        )
        .await;

    let echoed = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("echo in time")
        .expect("handler channel open");
    assert_eq!(echoed.content, "echo me");
    assert_eq!(echoed.room_id, room);

    assert_eq!(
        *state.authorizations.lock().await,
        vec!["Bearer tok-ws".to_string()]
    );

    client.disconnect().await;
    assert!(!client.is_connected());
    for _ in 0..200 {
        if state.commands.lock().await.contains(&Command::Disconnect) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let commands = state.commands.lock().await.clone();
    assert_eq!(commands.first(), Some(&Command::Connect));
    assert!(commands.contains(&Command::Unsubscribe));
    assert_eq!(commands.last(), Some(&Command::Disconnect));
}
