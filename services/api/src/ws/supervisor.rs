//! Accepts media-stream connections and runs one [`SessionBridge`] per call.

use super::{
    link::Link,
    session::{BridgeContext, SessionBridge},
};
use crate::state::AppState;
use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, field, info, info_span};

/// Spawns independent sessions; a failing call never affects the others.
pub struct BridgeSupervisor {
    ctx: BridgeContext,
    active: Arc<AtomicUsize>,
}

/// Keeps the live-session count accurate even if a session task panics.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl BridgeSupervisor {
    pub fn new(ctx: BridgeContext) -> Self {
        Self {
            ctx,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of calls currently being bridged.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Starts bridging an accepted telephony connection on its own task.
    pub fn spawn(&self, telephony: Link) -> JoinHandle<()> {
        let mut bridge = SessionBridge::new(self.ctx.clone());
        let span = info_span!(
            "bridge_session",
            session_id = %bridge.id(),
            stream_sid = field::Empty
        );
        let guard = ActiveGuard::enter(&self.active);

        tokio::spawn(
            async move {
                let _guard = guard;
                info!("Telephony stream connected.");
                match bridge.run(telephony).await {
                    Ok(()) => info!(state = %bridge.state(), "Session finished."),
                    Err(e) => error!(state = %bridge.state(), "Session ended with error: {:?}", e),
                }
            }
            .instrument(span),
        )
    }
}

/// Upgrades `/media-stream` requests and hands the socket to the supervisor.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        state.supervisor.spawn(Link::from_axum(socket));
    })
}
