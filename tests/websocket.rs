mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use quickpoll_backend::polls::{PollOptionResponse, PollResponse};
use quickpoll_backend::realtime::{Subscription, VoteUpdate};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
};

use common::{eventually, eventually_within, spawn_server, test_config, test_state};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(addr: std::net::SocketAddr, query: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws{query}")).await.unwrap();
    ws
}

async fn next_json(ws: &mut Client) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for a message")
        .expect("stream ended")
        .expect("websocket error");
    match msg {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected frame {other:?}"),
    }
}

fn poll(id: i64) -> PollResponse {
    PollResponse {
        id,
        title: "Lunch?".to_string(),
        description: Some("pick one".to_string()),
        creator_id: 1,
        creator_username: "ferris".to_string(),
        is_active: true,
        allow_multiple_votes: false,
        created_at: Utc::now(),
        options: vec![
            PollOptionResponse {
                id: 1,
                poll_id: id,
                text: "Pizza".to_string(),
                vote_count: 0,
            },
            PollOptionResponse {
                id: 2,
                poll_id: id,
                text: "Ramen".to_string(),
                vote_count: 0,
            },
        ],
        total_votes: 0,
        total_likes: 0,
        user_has_voted: false,
        user_has_liked: false,
        user_voted_options: vec![],
    }
}

#[tokio::test]
async fn ping_gets_pong() {
    let state = test_state(test_config(&[]));
    let addr = spawn_server(state.clone()).await;

    let mut ws = connect(addr, "").await;
    ws.send(Message::Text("ping".into())).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reply, Message::Text("pong".into()));

    // other text is ignored and does not change the subscription
    ws.send(Message::Text("hello".into())).await.unwrap();
    ws.send(Message::Text("ping".into())).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    assert_eq!(reply, Message::Text("pong".into()));
    assert_eq!(state.registry().stats().global, 1);
}

#[tokio::test]
async fn global_listener_receives_poll_created() {
    let state = test_state(test_config(&[]));
    let addr = spawn_server(state.clone()).await;

    let mut global = connect(addr, "").await;
    let registry = state.registry().clone();
    eventually(|| registry.stats().global == 1).await;

    let report = state.events.poll_created(poll(11));
    assert_eq!(report.delivered, 1);

    let msg = next_json(&mut global).await;
    assert_eq!(msg["type"], "poll_created");
    assert_eq!(msg["data"]["id"], 11);
    assert_eq!(msg["data"]["options"][1]["text"], "Ramen");
}

#[tokio::test]
async fn vote_reaches_poll_watcher_and_global_listener() {
    let state = test_state(test_config(&[]));
    let addr = spawn_server(state.clone()).await;

    let mut global = connect(addr, "").await;
    let mut watcher = connect(addr, "?poll_id=7").await;
    let mut other = connect(addr, "?poll_id=8").await;
    let registry = state.registry().clone();
    eventually(|| registry.stats().active == 3).await;
    assert_eq!(registry.stats().poll_watchers, 2);

    let counts = BTreeMap::from([(1, 3), (2, 1)]);
    let report = state.events.vote_cast(VoteUpdate::new(7, 1, counts));
    assert_eq!(report.delivered, 2);

    for ws in [&mut global, &mut watcher] {
        let msg = next_json(ws).await;
        assert_eq!(msg["type"], "vote_update");
        assert_eq!(msg["data"]["poll_id"], 7);
        assert_eq!(msg["data"]["total_votes"], 4);
    }

    // poll 8 saw nothing: its next frame is our pong
    other.send(Message::Text("ping".into())).await.unwrap();
    assert_eq!(other.next().await.unwrap().unwrap(), Message::Text("pong".into()));
}

#[tokio::test]
async fn like_toggle_arrives_in_commit_order() {
    let state = test_state(test_config(&[]));
    let addr = spawn_server(state.clone()).await;

    let mut watcher = connect(addr, "?poll_id=9").await;
    let registry = state.registry().clone();
    eventually(|| registry.stats().poll_watchers == 1).await;

    state.events.like_changed(9, 1);
    state.events.like_changed(9, 0);

    assert_eq!(next_json(&mut watcher).await["data"]["total_likes"], 1);
    assert_eq!(next_json(&mut watcher).await["data"]["total_likes"], 0);
}

#[tokio::test]
async fn client_close_unregisters() {
    let state = test_state(test_config(&[]));
    let addr = spawn_server(state.clone()).await;

    let mut closing = connect(addr, "?poll_id=3").await;
    let mut staying = connect(addr, "?poll_id=3").await;
    let registry = state.registry().clone();
    eventually(|| registry.poll_audience(3).len() == 2).await;

    closing.close(None).await.unwrap();
    eventually(|| registry.poll_audience(3).len() == 1).await;

    let report = state.events.like_changed(3, 5);
    assert_eq!(report.delivered, 1);
    assert!(report.pruned.is_empty());
    assert_eq!(next_json(&mut staying).await["data"]["total_likes"], 5);
}

#[tokio::test]
async fn registry_teardown_closes_sockets() {
    let state = test_state(test_config(&[]));
    let addr = spawn_server(state.clone()).await;

    let mut ws = connect(addr, "").await;
    let registry = state.registry().clone();
    eventually(|| registry.stats().active == 1).await;

    assert_eq!(registry.clear(), 1);

    let next = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("socket was not closed");
    assert!(matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
}

#[tokio::test]
async fn idle_connections_are_evicted() {
    let state = test_state(test_config(&[("WS_IDLE_TIMEOUT_SECS", "1")]));
    let addr = spawn_server(state.clone()).await;

    let _ws = connect(addr, "?poll_id=4").await;
    let registry = state.registry().clone();
    eventually(|| registry.stats().active == 1).await;
    let id = registry.poll_audience(4).ids().next().unwrap();
    assert_eq!(registry.target_of(&id), Some(Subscription::Poll(4)));

    eventually_within(Duration::from_secs(4), || registry.stats().active == 0).await;
    assert_eq!(registry.target_of(&id), None);
}

#[tokio::test]
async fn malformed_poll_id_is_rejected() {
    let state = test_state(test_config(&[]));
    let addr = spawn_server(state.clone()).await;

    assert!(connect_async(format!("ws://{addr}/ws?poll_id=abc")).await.is_err());
    assert_eq!(state.registry().stats().active, 0);
}
