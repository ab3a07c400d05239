//! End-to-end tests: real listener, WebSocket agent, HTTP client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use bridgemcp::{
    Action, ActionExecutor, AgentConfig, AgentState, AuthToken, Call, PeerAgent, PeerFrame,
    Relay, RelayConfig, RelayServer, Reply,
};

const TOKEN: &str = "e2e-token";

type AgentSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

struct Running {
    relay: Arc<Relay>,
    http: String,
    ws: String,
}

async fn start_relay() -> anyhow::Result<Running> {
    let relay = Relay::new(
        RelayConfig::new().with_port(0),
        AuthToken::new(TOKEN)?,
    )?;
    let server = RelayServer::bind(Arc::clone(&relay)).await?;
    let running = Running {
        relay,
        http: server.http_url(),
        ws: server.ws_url(),
    };
    tokio::spawn(server.serve());
    Ok(running)
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

async fn connect_agent(running: &Running) -> anyhow::Result<AgentSocket> {
    let (mut socket, _) = connect_async(format!("{}/?token={TOKEN}", running.ws)).await?;
    let hello = json!({ "type": "connect", "agent": "test-agent", "version": "9.9.9" });
    socket.send(Message::Text(hello.to_string().into())).await?;
    Ok(socket)
}

/// Answers every call with `{navigated: true, url}`.
fn spawn_echo(mut socket: AgentSocket) {
    tokio::spawn(async move {
        while let Some(Ok(message)) = socket.next().await {
            let Message::Text(text) = message else { continue };
            let call: Call = serde_json::from_str(text.as_str()).expect("call frame");
            let data = json!({ "navigated": true, "url": call.params["url"] });
            let reply = PeerFrame::Response(Reply::success(call.id, data));
            let frame = serde_json::to_string(&reply).expect("serialize");
            if socket.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });
}

#[tokio::test]
async fn test_navigate_round_trip() -> anyhow::Result<()> {
    let running = start_relay().await?;
    let socket = connect_agent(&running).await?;
    {
        let relay = Arc::clone(&running.relay);
        wait_for(move || relay.registry().status().agent.is_some()).await;
    }
    spawn_echo(socket);

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/navigate", running.http))
        .bearer_auth(TOKEN)
        .json(&json!({ "url": "https://example.com" }))
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body, json!({ "navigated": true, "url": "https://example.com" }));
    assert_eq!(running.relay.registry().pending_count(), 0);

    let status: Value = client
        .get(format!("{}/status", running.http))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status["connected"], true);
    assert_eq!(status["agent"]["agent"], "test-agent");
    Ok(())
}

#[tokio::test]
async fn test_wrong_token_rejected_without_agent_call() -> anyhow::Result<()> {
    let running = start_relay().await?;
    let _socket = connect_agent(&running).await?;
    {
        let relay = Arc::clone(&running.relay);
        wait_for(move || relay.registry().is_connected()).await;
    }

    let response = reqwest::Client::new()
        .post(format!("{}/navigate", running.http))
        .bearer_auth("not-the-token")
        .json(&json!({ "url": "https://example.com" }))
        .send()
        .await?;

    assert_eq!(response.status(), 401);
    let body: Value = response.json().await?;
    assert_eq!(body["kind"], "unauthenticated");
    assert_eq!(running.relay.registry().pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_second_agent_closed_with_conflict_code() -> anyhow::Result<()> {
    let running = start_relay().await?;
    let _first = connect_agent(&running).await?;
    {
        let relay = Arc::clone(&running.relay);
        wait_for(move || relay.registry().is_connected()).await;
    }

    let (mut second, _) = connect_async(format!("{}/?token={TOKEN}", running.ws)).await?;
    let message = tokio::time::timeout(Duration::from_secs(5), second.next())
        .await?
        .expect("close frame")?;

    let Message::Close(Some(frame)) = message else {
        panic!("expected close frame, got {message:?}");
    };
    assert_eq!(u16::from(frame.code), 4409);
    assert!(running.relay.registry().is_connected());
    Ok(())
}

#[tokio::test]
async fn test_agent_upgrade_requires_token_and_extension_origin() -> anyhow::Result<()> {
    let running = start_relay().await?;

    let err = connect_async(running.ws.clone()).await.expect_err("no token");
    assert!(matches!(
        err,
        tokio_tungstenite::tungstenite::Error::Http(ref response) if response.status() == 401
    ));

    let mut request = format!("{}/?token={TOKEN}", running.ws).into_client_request()?;
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("https://evil.example"));
    let err = connect_async(request).await.expect_err("bad origin");
    assert!(matches!(
        err,
        tokio_tungstenite::tungstenite::Error::Http(ref response) if response.status() == 403
    ));

    let mut request = format!("{}/?token={TOKEN}", running.ws).into_client_request()?;
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("chrome-extension://abcdef"));
    let (_socket, _) = connect_async(request).await?;
    Ok(())
}

#[tokio::test]
async fn test_disconnect_fails_outstanding_request() -> anyhow::Result<()> {
    let running = start_relay().await?;
    let mut socket = connect_agent(&running).await?;
    {
        let relay = Arc::clone(&running.relay);
        wait_for(move || relay.registry().is_connected()).await;
    }

    let http = running.http.clone();
    let request = tokio::spawn(async move {
        reqwest::Client::new()
            .post(format!("{http}/snapshot"))
            .bearer_auth(TOKEN)
            .send()
            .await
    });

    // Receive the call, then drop the connection without answering.
    let frame = socket.next().await.expect("call")?;
    assert!(matches!(frame, Message::Text(_)));
    socket.close(None).await?;

    let response = request.await??;
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await?;
    assert_eq!(body["kind"], "peer_disconnected");
    assert_eq!(running.relay.registry().pending_count(), 0);
    Ok(())
}

struct FakeBrowser;

#[async_trait]
impl ActionExecutor for FakeBrowser {
    async fn execute(&self, action: Action, params: Value) -> Result<Value, String> {
        match action {
            Action::GetTabs => Ok(json!([{ "id": 1, "title": "Example" }])),
            _ => Ok(json!({ "action": action.as_str(), "params": params })),
        }
    }
}

#[tokio::test]
async fn test_peer_agent_serves_http_requests() -> anyhow::Result<()> {
    let running = start_relay().await?;

    let agent = Arc::new(PeerAgent::new(
        AgentConfig::new()
            .with_url(running.ws.clone())
            .with_retry_delay(Duration::from_millis(50)),
        Arc::new(FakeBrowser),
    )?);
    agent.set_token(Some(TOKEN.to_string()));

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let agent_task = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move {
            agent
                .run(async {
                    let _ = stop_rx.await;
                })
                .await;
        })
    };

    let mut states = agent.subscribe();
    states.wait_for(|state| *state == AgentState::Open).await?;
    {
        let relay = Arc::clone(&running.relay);
        wait_for(move || relay.registry().is_connected()).await;
    }

    let client = reqwest::Client::new();
    let tabs: Value = client
        .get(format!("{}/tabs", running.http))
        .bearer_auth(TOKEN)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(tabs[0]["title"], "Example");

    let response = client
        .post(format!("{}/navigate", running.http))
        .bearer_auth(TOKEN)
        .json(&json!({ "url": "javascript:alert(1)" }))
        .send()
        .await?;
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await?;
    assert_eq!(body["kind"], "action_failed");
    assert_eq!(
        body["detail"],
        "Blocked URL scheme: javascript. Only http/https URLs are allowed."
    );

    let _ = stop_tx.send(());
    agent_task.await?;
    assert_eq!(agent.state(), AgentState::Idle);
    Ok(())
}
