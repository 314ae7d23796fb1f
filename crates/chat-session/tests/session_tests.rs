//! End-to-end tests for chat-session against a local scripted chat API.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chat_core::{ActionStatus, ChatRequest, Role};
use chat_session::{ChatSession, SendOutcome};
use chat_store::{ConversationStore, MemoryKeyValueStore, Persistence, StoreSnapshot};
use chat_stream::{ChatClient, ClientConfig};
use futures::StreamExt;
use tokio::sync::{mpsc, watch};

type Chunks = Vec<(Duration, Vec<u8>)>;

fn data(json: &str) -> Vec<u8> {
    format!("data: {}\n\n", json).into_bytes()
}

fn after(ms: u64, bytes: Vec<u8>) -> (Duration, Vec<u8>) {
    (Duration::from_millis(ms), bytes)
}

/// Event-stream response that sends each chunk after its delay.
fn scripted(chunks: Chunks) -> Response {
    let body = futures::stream::iter(chunks).then(|(delay, chunk)| async move {
        tokio::time::sleep(delay).await;
        Ok::<_, Infallible>(chunk)
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(body))
        .unwrap()
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Chat API that records each request and replies with `chunks`.
async fn chat_server(chunks: Chunks) -> (String, mpsc::UnboundedReceiver<ChatRequest>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let router = Router::new()
        .route(
            "/chat",
            post(move |Json(request): Json<ChatRequest>| {
                let chunks = chunks.clone();
                let tx = tx.clone();
                async move {
                    let _ = tx.send(request);
                    scripted(chunks)
                }
            }),
        )
        .route("/health", get(|| async { StatusCode::OK }));

    (serve(router).await, rx)
}

fn session_for(url: &str, kv: &MemoryKeyValueStore) -> ChatSession {
    let mut store = ConversationStore::new(Persistence::new(kv.clone()));
    store.initialize();
    ChatSession::new(store, ChatClient::new(ClientConfig::new(url)).unwrap())
}

async fn session_with(chunks: Chunks) -> ChatSession {
    let (url, _requests) = chat_server(chunks).await;
    session_for(&url, &MemoryKeyValueStore::new())
}

async fn wait_until(
    rx: &mut watch::Receiver<StoreSnapshot>,
    condition: impl FnMut(&StoreSnapshot) -> bool,
) -> StoreSnapshot {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(condition))
        .await
        .expect("timed out waiting for store state")
        .expect("store dropped")
        .clone()
}

/// Wait until the session is no longer streaming.
async fn settle(session: &ChatSession) -> StoreSnapshot {
    let mut rx = session.subscribe().unwrap();
    wait_until(&mut rx, |s| !s.streaming).await
}

fn started(outcome: SendOutcome) -> String {
    match outcome {
        SendOutcome::Started {
            conversation_id, ..
        } => conversation_id,
        other => panic!("expected a started stream, got {:?}", other),
    }
}

fn reply_in(snapshot: &StoreSnapshot, conversation_id: &str) -> String {
    snapshot.conversations[conversation_id]
        .last_message()
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

const HEL: &str = r#"{"type":"AIMessage","content":"Hel"}"#;
const LO: &str = r#"{"type":"AIMessage","content":"lo"}"#;
const COMPLETE: &str = r#"{"type":"complete"}"#;

mod send_tests {
    use super::*;

    #[tokio::test]
    async fn test_send_creates_conversation_and_placeholder() {
        let (url, mut requests) = chat_server(vec![
            after(200, data(HEL)),
            after(20, data(COMPLETE)),
        ])
        .await;
        let session = session_for(&url, &MemoryKeyValueStore::new());

        let id = started(session.send_message("Hi").unwrap());

        let snapshot = session.snapshot().unwrap();
        let conversation = snapshot.current_conversation().unwrap();
        assert_eq!(conversation.id, id);
        assert_eq!(conversation.title, "Hi");
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, Role::User);
        assert_eq!(conversation.messages[0].content, "Hi");
        assert_eq!(conversation.messages[1].role, Role::Assistant);
        assert_eq!(conversation.messages[1].content, "");
        assert!(snapshot.streaming);
        assert_eq!(snapshot.current_action, ActionStatus::ReceivedPrompt);

        let request = tokio::time::timeout(Duration::from_secs(5), requests.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request, ChatRequest::new(id.clone(), "Hi"));

        settle(&session).await;
    }

    #[tokio::test]
    async fn test_deltas_accumulate_until_complete() {
        let kv = MemoryKeyValueStore::new();
        let (url, _requests) = chat_server(vec![
            after(20, data(HEL)),
            after(20, data(LO)),
            after(20, data(COMPLETE)),
        ])
        .await;
        let session = session_for(&url, &kv);

        let id = started(session.send_message("Hi").unwrap());
        let snapshot = settle(&session).await;

        assert_eq!(reply_in(&snapshot, &id), "Hello");
        assert_eq!(snapshot.current_action, ActionStatus::Complete);
        assert!(!snapshot.streaming);
        assert_eq!(session.active_stream_id().unwrap(), None);

        let mut reopened = ConversationStore::new(Persistence::new(kv.clone()));
        reopened.initialize();
        assert_eq!(reopened.conversations(), snapshot.conversations);
        assert_eq!(reopened.active_conversation_id(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn test_transport_end_counts_as_complete() {
        let session = session_with(vec![after(20, data(HEL)), after(20, data(LO))]).await;

        let id = started(session.send_message("Hi").unwrap());
        let snapshot = settle(&session).await;

        assert_eq!(reply_in(&snapshot, &id), "Hello");
        assert_eq!(snapshot.current_action, ActionStatus::Complete);
    }

    #[tokio::test]
    async fn test_metadata_merged_into_reply() {
        let session = session_with(vec![
            after(
                20,
                data(r#"{"type":"AIMessage","content":"","action":"calling_tool","tool_name":"search"}"#),
            ),
            after(20, data(r#"{"type":"AIMessage","content":"Found it"}"#)),
            after(
                20,
                data(r#"{"type":"AIMessage","tokens":{"input_tokens":3,"output_tokens":5,"total_tokens":8},"is_cached":true}"#),
            ),
            after(20, data(COMPLETE)),
        ])
        .await;

        let id = started(session.send_message("look it up").unwrap());
        let snapshot = settle(&session).await;

        let reply = snapshot.conversations[&id].last_message().cloned().unwrap();
        assert_eq!(reply.content, "Found it");
        assert_eq!(reply.action, Some(ActionStatus::CallingTool));
        assert_eq!(reply.tool_name.as_deref(), Some("search"));
        assert_eq!(reply.token_usage.and_then(|u| u.total_tokens), Some(8));
        assert_eq!(reply.cached, Some(true));
        assert_eq!(snapshot.current_action, ActionStatus::Complete);
    }

    #[tokio::test]
    async fn test_multibyte_split_across_chunks() {
        let line = data(r#"{"type":"AIMessage","content":"héllo wörld"}"#);
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let session = session_with(vec![
            after(20, line[..split].to_vec()),
            after(20, line[split..].to_vec()),
            after(20, data(COMPLETE)),
        ])
        .await;

        let id = started(session.send_message("Hi").unwrap());
        let snapshot = settle(&session).await;

        assert_eq!(reply_in(&snapshot, &id), "héllo wörld");
    }

    #[tokio::test]
    async fn test_blank_message_ignored() {
        let session = session_with(vec![]).await;

        assert_eq!(session.send_message("   \n").unwrap(), SendOutcome::Ignored);
        let snapshot = session.snapshot().unwrap();
        assert!(snapshot.conversations.is_empty());
        assert!(!snapshot.streaming);
    }

    #[tokio::test]
    async fn test_send_while_streaming_dropped() {
        let session = session_with(vec![after(300, data(HEL)), after(20, data(COMPLETE))]).await;

        let id = started(session.send_message("first").unwrap());
        assert_eq!(session.send_message("second").unwrap(), SendOutcome::Dropped);

        let snapshot = settle(&session).await;
        let conversation = &snapshot.conversations[&id];
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].content, "first");
        assert_eq!(conversation.messages[1].content, "Hel");
    }

    #[tokio::test]
    async fn test_second_message_after_completion() {
        let session = session_with(vec![after(20, data(HEL)), after(20, data(COMPLETE))]).await;

        let first = session.send_message("one").unwrap();
        settle(&session).await;
        let second = session.send_message("two").unwrap();
        let snapshot = settle(&session).await;

        let (
            SendOutcome::Started {
                conversation_id: a,
                stream_id: first_stream,
            },
            SendOutcome::Started {
                conversation_id: b,
                stream_id: second_stream,
            },
        ) = (first, second)
        else {
            panic!("both sends should start a stream");
        };
        assert_eq!(a, b);
        assert!(second_stream > first_stream);
        assert_eq!(snapshot.conversations[&a].messages.len(), 4);
        assert_eq!(snapshot.conversations[&a].title, "one");
    }
}

mod error_tests {
    use super::*;

    #[tokio::test]
    async fn test_error_event_annotates_reply() {
        let session = session_with(vec![
            after(20, data(HEL)),
            after(20, data(r#"{"type":"error","content":"model overloaded"}"#)),
            after(20, data(LO)),
        ])
        .await;

        let id = started(session.send_message("Hi").unwrap());
        let snapshot = settle(&session).await;

        assert_eq!(reply_in(&snapshot, &id), "Hel\n\n[Error: model overloaded]");
        assert_eq!(snapshot.current_action, ActionStatus::Error);

        // Events after the error are ignored.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            reply_in(&session.snapshot().unwrap(), &id),
            "Hel\n\n[Error: model overloaded]"
        );
    }

    #[tokio::test]
    async fn test_error_event_without_content() {
        let session = session_with(vec![after(20, data(r#"{"type":"error"}"#))]).await;

        let id = started(session.send_message("Hi").unwrap());
        let snapshot = settle(&session).await;

        assert_eq!(reply_in(&snapshot, &id), "\n\n[Error: Unknown error]");
    }

    #[tokio::test]
    async fn test_http_status_annotates_reply() {
        let router = Router::new().route(
            "/chat",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response() }),
        );
        let url = serve(router).await;
        let session = session_for(&url, &MemoryKeyValueStore::new());

        let id = started(session.send_message("Hi").unwrap());
        let snapshot = settle(&session).await;

        assert_eq!(reply_in(&snapshot, &id), "\n\n[Error: HTTP error! status: 500]");
        assert_eq!(snapshot.current_action, ActionStatus::Error);
        assert!(!snapshot.streaming);
    }

    #[tokio::test]
    async fn test_unreachable_api_annotates_reply() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let session = session_for(&url, &MemoryKeyValueStore::new());

        let id = started(session.send_message("Hi").unwrap());
        let snapshot = settle(&session).await;

        assert!(reply_in(&snapshot, &id).starts_with("\n\n[Error: "));
        assert_eq!(snapshot.current_action, ActionStatus::Error);
        assert!(!session.is_available().await);
    }
}

mod interleaving_tests {
    use super::*;

    #[tokio::test]
    async fn test_switch_mid_stream_keeps_deltas_in_origin() {
        let session = session_with(vec![
            after(200, data(HEL)),
            after(20, data(LO)),
            after(20, data(COMPLETE)),
        ])
        .await;

        let origin = started(session.send_message("Hi").unwrap());
        let other = session.new_conversation().unwrap();

        let snapshot = settle(&session).await;
        assert_eq!(reply_in(&snapshot, &origin), "Hello");
        assert!(snapshot.conversations[&other].messages.is_empty());
        assert_eq!(snapshot.active_conversation_id.as_deref(), Some(other.as_str()));
    }

    #[tokio::test]
    async fn test_switch_back_and_forth_mid_stream() {
        let session = session_with(vec![
            after(20, data(HEL)),
            after(200, data(LO)),
            after(20, data(COMPLETE)),
        ])
        .await;

        let origin = started(session.send_message("Hi").unwrap());
        let mut rx = session.subscribe().unwrap();
        wait_until(&mut rx, |s| reply_in(s, &origin) == "Hel").await;

        let other = session.new_conversation().unwrap();
        assert!(session.switch_conversation(&origin).unwrap());
        assert!(session.switch_conversation(&other).unwrap());

        let snapshot = settle(&session).await;
        assert_eq!(reply_in(&snapshot, &origin), "Hello");
        assert!(snapshot.conversations[&other].messages.is_empty());
    }

    #[tokio::test]
    async fn test_delete_mid_stream() {
        let session = session_with(vec![
            after(200, data(HEL)),
            after(20, data(COMPLETE)),
        ])
        .await;

        let origin = started(session.send_message("Hi").unwrap());
        assert!(session.delete_conversation(&origin).unwrap());

        let snapshot = settle(&session).await;
        assert!(snapshot.conversations.is_empty());
        assert_eq!(snapshot.active_conversation_id, None);
        assert_eq!(snapshot.current_action, ActionStatus::Complete);
    }

    #[tokio::test]
    async fn test_clear_history_mid_stream() {
        let session = session_with(vec![
            after(200, data(HEL)),
            after(20, data(COMPLETE)),
        ])
        .await;

        started(session.send_message("Hi").unwrap());
        session.clear_history().unwrap();

        let snapshot = settle(&session).await;
        assert!(snapshot.conversations.is_empty());
    }
}

mod cancellation_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_during_busy_stream_returns() {
        let mut chunks: Chunks = (0..200)
            .map(|_| after(1, data(r#"{"type":"AIMessage","content":"x"}"#)))
            .collect();
        chunks.push(after(1, data(COMPLETE)));
        let session = session_with(chunks).await;

        let id = started(session.send_message("Hi").unwrap());
        let mut rx = session.subscribe().unwrap();
        wait_until(&mut rx, |s| !reply_in(s, &id).is_empty()).await;

        let cancelling = session.clone();
        let cancelled = tokio::time::timeout(
            Duration::from_secs(5),
            tokio::task::spawn_blocking(move || cancelling.cancel()),
        )
        .await
        .expect("cancel did not return")
        .unwrap()
        .unwrap();
        assert!(cancelled);

        let frozen = session.snapshot().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let later = session.snapshot().unwrap();
        assert!(!later.streaming);
        assert_eq!(reply_in(&later, &id), reply_in(&frozen, &id));
        assert_eq!(later.version, frozen.version);
    }

    #[tokio::test]
    async fn test_cancel_keeps_partial_reply() {
        let session = session_with(vec![
            after(20, data(HEL)),
            after(300, data(LO)),
            after(20, data(COMPLETE)),
        ])
        .await;

        let id = started(session.send_message("Hi").unwrap());
        let mut rx = session.subscribe().unwrap();
        wait_until(&mut rx, |s| reply_in(s, &id) == "Hel").await;

        assert!(session.cancel().unwrap());

        let snapshot = session.snapshot().unwrap();
        assert!(!snapshot.streaming);
        assert_eq!(snapshot.current_action, ActionStatus::None);
        assert_eq!(reply_in(&snapshot, &id), "Hel");
        assert_eq!(session.active_stream_id().unwrap(), None);

        // Nothing from the cancelled stream lands afterwards.
        tokio::time::sleep(Duration::from_millis(500)).await;
        let later = session.snapshot().unwrap();
        assert_eq!(reply_in(&later, &id), "Hel");
        assert_eq!(later.current_action, ActionStatus::None);
        assert_eq!(later.version, snapshot.version);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let session = session_with(vec![after(300, data(HEL))]).await;

        assert!(!session.cancel().unwrap());

        started(session.send_message("Hi").unwrap());
        assert!(session.cancel().unwrap());
        let once = session.snapshot().unwrap();

        assert!(!session.cancel().unwrap());
        let twice = session.snapshot().unwrap();
        assert_eq!(once.version, twice.version);
        assert_eq!(once.current_action, twice.current_action);
    }

    #[tokio::test]
    async fn test_send_after_cancel_starts_new_stream() {
        let session = session_with(vec![
            after(100, data(HEL)),
            after(20, data(COMPLETE)),
        ])
        .await;

        let id = started(session.send_message("first").unwrap());
        session.cancel().unwrap();

        started(session.send_message("second").unwrap());
        let snapshot = settle(&session).await;

        let conversation = &snapshot.conversations[&id];
        assert_eq!(conversation.messages.len(), 4);
        assert_eq!(conversation.messages[1].content, "");
        assert_eq!(conversation.messages[3].content, "Hel");
    }
}

#[tokio::test]
async fn test_health_probe() {
    let session = session_with(vec![]).await;
    assert!(session.is_available().await);
}
