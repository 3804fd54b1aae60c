/// Conversation list integration tests
/// Inbound messages trigger a refresh against an in-process hyper backend

extern crate vibe_core;

use bytes::Bytes;
use chrono::Utc;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use vibe_core::inbox::ConversationList;
use vibe_core::transport::ServerEvent;
use vibe_core::types::{ChatStub, Message, Ref};
use vibe_core::{ApiClient, Config, TransportClient};

/// Every `GET /chat` reports one more unread message than the last
async fn chat_backend() -> (Config, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicU32::new(0));

    let server_calls = calls.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let io = TokioIo::new(stream);
            let calls = server_calls.clone();
            tokio::spawn(async move {
                let svc = service_fn(move |_req: Request<hyper::body::Incoming>| {
                    let unread = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        let body = json!([{
                            "_id": "c1",
                            "participants": [{ "_id": "me", "username": "me" }, { "_id": "u2", "username": "bo" }],
                            "unreadCount": unread
                        }]);
                        Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(body.to_string()))))
                    }
                });
                let _ = http1::Builder::new().serve_connection(io, svc).await;
            });
        }
    });

    let config = Config {
        api_base_url: format!("http://{}/api", addr),
        ..Config::default()
    };
    (config, calls)
}

fn incoming(id: &str) -> Message {
    Message {
        id: id.to_string(),
        chat: Ref::Doc(ChatStub { id: "c1".to_string() }),
        sender: Ref::Id("u2".to_string()),
        text: "hi".to_string(),
        created_at: Utc::now(),
        is_read: false,
    }
}

#[tokio::test]
async fn test_message_received_refreshes_list() {
    let (config, calls) = chat_backend().await;
    let api = ApiClient::new(&config).unwrap();
    let (transport, peer) = TransportClient::loopback();

    let inbox = ConversationList::new();
    inbox.refresh(&api).await.unwrap();
    assert_eq!(inbox.total_unread(), 1);

    let mut updates = inbox.subscribe();
    updates.borrow_and_update();
    inbox.follow(&transport, api);

    peer.deliver(ServerEvent::MessageReceived(incoming("m1")));
    timeout(Duration::from_secs(5), updates.changed())
        .await
        .expect("list never refreshed")
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let chats = inbox.all().await;
    assert_eq!(chats[0].unread_count, 2);
    assert_eq!(inbox.partner_of("c1", "me").await.map(|u| u.username), Some("bo".to_string()));

    // Other events leave the list alone
    peer.deliver(ServerEvent::Typing("c1".to_string()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
