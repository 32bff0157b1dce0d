#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use callbridge_api::ws::{
    link::{Link, LinkError},
    session::BridgeContext,
    upstream::RealtimeConnector,
};
use callbridge_core::{
    session_config::SessionSettings,
    tool::{ToolError, ToolInvoker},
};
use futures::{SinkExt, StreamExt, channel::mpsc};
use serde_json::{Value, json};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::{Notify, oneshot};

pub const FALLBACK: &str = "No response from API";
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// The far end of an in-memory link: what the peer sends and what it receives.
pub struct Peer {
    pub tx: Option<mpsc::UnboundedSender<String>>,
    pub rx: mpsc::UnboundedReceiver<String>,
}

impl Peer {
    pub fn send(&self, frame: Value) {
        self.send_raw(&frame.to_string());
    }

    pub fn send_raw(&self, frame: &str) {
        self.tx
            .as_ref()
            .expect("peer already hung up")
            .unbounded_send(frame.to_string())
            .expect("bridge stopped reading");
    }

    /// Closes the peer's side of the connection.
    pub fn hang_up(&mut self) {
        self.tx = None;
    }

    pub async fn recv(&mut self) -> Value {
        let frame = tokio::time::timeout(RECV_TIMEOUT, self.rx.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("link closed while waiting for a frame");
        serde_json::from_str(&frame).expect("frame is not JSON")
    }

    /// Waits until the bridge closes its side, returning any frames still queued.
    pub async fn closed(&mut self) -> Vec<Value> {
        let mut rest = Vec::new();
        loop {
            let next = tokio::time::timeout(RECV_TIMEOUT, self.rx.next())
                .await
                .expect("timed out waiting for the link to close");
            match next {
                Some(frame) => rest.push(serde_json::from_str(&frame).unwrap()),
                None => return rest,
            }
        }
    }

    /// Asserts nothing arrives for a short while.
    pub async fn assert_quiet(&mut self) {
        let next = tokio::time::timeout(Duration::from_millis(100), self.rx.next()).await;
        assert!(next.is_err(), "unexpected frame: {:?}", next);
    }
}

/// An in-memory duplex link and the peer driving it.
pub fn link_pair() -> (Link, Peer) {
    let (to_bridge, from_peer) = mpsc::unbounded::<String>();
    let (to_peer, from_bridge) = mpsc::unbounded::<String>();

    let sink = to_peer.sink_map_err(|_| LinkError::Closed);
    let stream = from_peer.map(Ok::<_, LinkError>);
    let link = Link::new(Box::pin(sink), Box::pin(stream));

    (
        link,
        Peer {
            tx: Some(to_bridge),
            rx: from_bridge,
        },
    )
}

/// Hands out a prepared link, optionally only after `release` fires.
pub struct FakeConnector {
    link: Mutex<Option<Link>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    fail: bool,
}

impl FakeConnector {
    pub fn ready(link: Link) -> Self {
        Self {
            link: Mutex::new(Some(link)),
            gate: Mutex::new(None),
            fail: false,
        }
    }

    pub fn gated(link: Link) -> (Self, oneshot::Sender<()>) {
        let (release, gate) = oneshot::channel();
        let connector = Self {
            link: Mutex::new(Some(link)),
            gate: Mutex::new(Some(gate)),
            fail: false,
        };
        (connector, release)
    }

    pub fn failing() -> Self {
        Self {
            link: Mutex::new(None),
            gate: Mutex::new(None),
            fail: true,
        }
    }
}

#[async_trait]
impl RealtimeConnector for FakeConnector {
    async fn connect(&self) -> Result<Link> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.fail {
            return Err(anyhow!("connection refused"));
        }
        self.link
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow!("realtime link already handed out"))
    }
}

/// Records calls and answers with a fixed result, optionally held until notified.
pub struct StubTools {
    pub calls: Mutex<Vec<(String, String)>>,
    answer: Option<String>,
    hold: Option<Arc<Notify>>,
}

impl StubTools {
    pub fn answering(text: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            answer: Some(text.to_string()),
            hold: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            answer: None,
            hold: None,
        }
    }

    pub fn held(text: &str) -> (Self, Arc<Notify>) {
        let hold = Arc::new(Notify::new());
        let tools = Self {
            calls: Mutex::new(Vec::new()),
            answer: Some(text.to_string()),
            hold: Some(hold.clone()),
        };
        (tools, hold)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ToolInvoker for StubTools {
    async fn invoke(&self, function_name: &str, arguments_json: &str) -> Result<String, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push((function_name.to_string(), arguments_json.to_string()));
        if let Some(hold) = &self.hold {
            hold.notified().await;
        }
        self.answer.clone().ok_or(ToolError::Status(500))
    }
}

pub fn context(connector: FakeConnector, tools: Arc<StubTools>) -> BridgeContext {
    BridgeContext {
        settings: Arc::new(SessionSettings::default()),
        tools,
        connector: Arc::new(connector),
        fallback_text: FALLBACK.into(),
    }
}

pub fn start_frame(stream_sid: &str) -> Value {
    json!({
        "event": "start",
        "start": {"streamSid": stream_sid, "callSid": "CA123"},
    })
}

pub fn media_frame(payload: &str) -> Value {
    json!({"event": "media", "media": {"payload": payload}})
}

pub fn audio_delta(delta: &str) -> Value {
    json!({"type": "response.audio.delta", "delta": delta})
}

pub fn function_call(call_id: &str) -> Value {
    json!({
        "type": "response.function_call_arguments.done",
        "call_id": call_id,
        "name": "get_weather",
        "arguments": "{\"city\":\"Pune\"}",
    })
}
