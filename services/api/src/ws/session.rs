//! One bridged call.
//!
//! A [`SessionBridge`] owns both links of a call. Each link's write half is
//! driven by a dedicated writer task fed through channels; the two relay loops
//! only ever talk to those channels, so neither loop holds the other's socket.
//!
//! ```text
//! telephony stream ──relay_telephony──▶ upstream writer ──▶ realtime sink
//! realtime stream  ──relay_realtime───▶ downstream writer ─▶ telephony sink
//!                         │  ▲
//!                    tool tasks (detached)
//! ```
//!
//! The downstream writer owns the `streamSid` and serves control messages
//! (`clear`, stream start) ahead of queued audio.

use super::{
    link::{FrameSink, FrameStream, Link, LinkError},
    upstream::RealtimeConnector,
};
use anyhow::{Context, Result, anyhow};
use callbridge_core::{
    audio::AudioChunk,
    realtime::{ClientEvent, RealtimeEvent, decode_realtime_event},
    session_config::SessionSettings,
    telephony::{TelephonyFrame, decode_telephony_frame, encode_clear_frame, encode_media_frame},
    tool::{ToolInvoker, resolve_or_fallback},
};
use futures_util::{SinkExt, StreamExt};
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{Instrument, debug, error, info, trace, warn};
use uuid::Uuid;

const CHANNEL_BUFFER_SIZE: usize = 256;

/// How long a writer may take to flush and close its link on teardown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of a bridged call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    ConfigSent,
    Active,
    Draining,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::ConfigSent => "config_sent",
            SessionState::Active => "active",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Read-only collaborators shared by every session.
#[derive(Clone)]
pub struct BridgeContext {
    pub settings: Arc<SessionSettings>,
    pub tools: Arc<dyn ToolInvoker>,
    pub connector: Arc<dyn RealtimeConnector>,
    pub fallback_text: Arc<str>,
}

#[derive(Debug)]
enum DownstreamControl {
    StreamStarted(String),
    Clear { epoch: u64 },
}

#[derive(Debug)]
struct DownstreamAudio {
    chunk: AudioChunk,
    epoch: u64,
}

#[derive(Clone)]
struct Downstream {
    control: mpsc::Sender<DownstreamControl>,
    audio: mpsc::Sender<DownstreamAudio>,
}

#[derive(Debug)]
enum Upstream {
    Event(ClientEvent),
    /// Written as `conversation.item.create` immediately followed by
    /// `response.create`.
    ToolResult { call_id: String, output: String },
}

/// Progress of one function call, keyed by `call_id` for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    Pending,
    Answered,
}

#[derive(Debug)]
struct ToolOutcome {
    call_id: String,
    output: String,
}

/// The bridge for a single call.
pub struct SessionBridge {
    id: Uuid,
    ctx: BridgeContext,
    state: SessionState,
}

impl SessionBridge {
    pub fn new(ctx: BridgeContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            ctx,
            state: SessionState::Connecting,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "Session state changed.");
            self.state = next;
        }
    }

    /// Runs the call until either link closes, then closes the other one.
    /// The bridge is left in [`SessionState::Closed`].
    pub async fn run(&mut self, telephony: Link) -> Result<()> {
        let Link { sink, stream } = telephony;
        let (downstream, downstream_writer) = spawn_downstream_writer(sink);

        let result = self.bridge(stream, downstream).await;

        self.transition(SessionState::Draining);
        finish_writer("telephony", downstream_writer).await;
        self.transition(SessionState::Closed);
        result
    }

    async fn bridge(&mut self, mut telephony_rx: FrameStream, downstream: Downstream) -> Result<()> {
        let Some(ai) = self.open_upstream(&mut telephony_rx, &downstream).await? else {
            return Ok(());
        };
        let Link {
            sink: ai_sink,
            stream: ai_rx,
        } = ai;

        let (upstream_tx, upstream_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        // Queued before any audio, so it is always the first frame on the link.
        upstream_tx
            .send(Upstream::Event(ClientEvent::SessionUpdate {
                session: (*self.ctx.settings).clone(),
            }))
            .await
            .map_err(|_| anyhow!("realtime writer stopped before configuration"))?;
        let upstream_writer = tokio::spawn(write_upstream(ai_sink, upstream_rx).in_current_span());
        self.transition(SessionState::ConfigSent);

        let telephony_loop =
            relay_telephony(telephony_rx, upstream_tx.clone(), downstream.control.clone());
        let realtime_loop = RealtimeRelay::new(upstream_tx, downstream, self.ctx.clone()).run(ai_rx);
        self.transition(SessionState::Active);

        let outcome = tokio::select! {
            result = telephony_loop => {
                info!("Telephony side finished.");
                result
            }
            result = realtime_loop => {
                info!("Realtime side finished.");
                result
            }
        };

        self.transition(SessionState::Draining);
        finish_writer("realtime", upstream_writer).await;
        outcome
    }

    /// Connects to the realtime endpoint while still serving the telephony
    /// link. Caller audio received in the meantime is dropped; `start` is
    /// honored so the stream id is known once audio flows back.
    ///
    /// Returns `None` when the telephony side ends first.
    async fn open_upstream(
        &mut self,
        telephony_rx: &mut FrameStream,
        downstream: &Downstream,
    ) -> Result<Option<Link>> {
        let connector = self.ctx.connector.clone();
        let mut connect = connector.connect();
        let mut dropped_frames = 0usize;

        loop {
            tokio::select! {
                link = &mut connect => {
                    if dropped_frames > 0 {
                        debug!(dropped_frames, "Dropped caller audio received before the realtime link opened.");
                    }
                    return link.context("Failed to open realtime link").map(Some);
                }
                frame = telephony_rx.next() => {
                    let Some(frame) = frame else {
                        info!("Telephony link closed before the realtime link opened.");
                        return Ok(None);
                    };
                    let text = frame.context("Telephony link failed while connecting")?;
                    match decode_telephony_frame(&text) {
                        Ok(TelephonyFrame::InboundAudio { .. }) => dropped_frames += 1,
                        Ok(TelephonyFrame::StreamStarted { stream_sid, call_sid }) => {
                            start_stream(&downstream.control, stream_sid, call_sid).await?;
                        }
                        Ok(TelephonyFrame::StreamStopped) => {
                            info!("Telephony stream stopped before the realtime link opened.");
                            return Ok(None);
                        }
                        Ok(TelephonyFrame::Unknown { event }) => {
                            debug!(%event, "Ignoring telephony event.");
                        }
                        Err(e) => warn!(error = %e, "Discarding malformed telephony frame."),
                    }
                }
            }
        }
    }
}

async fn start_stream(
    control: &mpsc::Sender<DownstreamControl>,
    stream_sid: String,
    call_sid: Option<String>,
) -> Result<()> {
    tracing::Span::current().record("stream_sid", stream_sid.as_str());
    info!(call_sid = call_sid.as_deref().unwrap_or("-"), "Incoming stream has started.");
    control
        .send(DownstreamControl::StreamStarted(stream_sid))
        .await
        .map_err(|_| anyhow!("telephony writer has stopped"))
}

/// Telephony → realtime: forwards caller audio until the stream stops.
async fn relay_telephony(
    mut telephony_rx: FrameStream,
    upstream: mpsc::Sender<Upstream>,
    control: mpsc::Sender<DownstreamControl>,
) -> Result<()> {
    let mut forwarded = 0u64;
    while let Some(frame) = telephony_rx.next().await {
        let text = frame.context("Telephony link failed")?;
        match decode_telephony_frame(&text) {
            Ok(TelephonyFrame::InboundAudio { chunk }) => {
                trace!(bytes = chunk.len(), "Forwarding caller audio.");
                upstream
                    .send(Upstream::Event(ClientEvent::append_audio(&chunk)))
                    .await
                    .map_err(|_| anyhow!("realtime writer has stopped"))?;
                forwarded += 1;
            }
            Ok(TelephonyFrame::StreamStarted {
                stream_sid,
                call_sid,
            }) => start_stream(&control, stream_sid, call_sid).await?,
            Ok(TelephonyFrame::StreamStopped) => {
                info!(forwarded, "Incoming stream has stopped.");
                return Ok(());
            }
            Ok(TelephonyFrame::Unknown { event }) => debug!(%event, "Ignoring telephony event."),
            Err(e) => warn!(error = %e, "Discarding malformed telephony frame."),
        }
    }
    info!(forwarded, "Telephony link closed.");
    Ok(())
}

/// Realtime → telephony: audio, barge-in and the tool-call cycle.
struct RealtimeRelay {
    upstream: mpsc::Sender<Upstream>,
    downstream: Downstream,
    ctx: BridgeContext,
    calls: HashMap<String, CallState>,
    tool_tx: mpsc::Sender<ToolOutcome>,
    tool_rx: mpsc::Receiver<ToolOutcome>,
    epoch: u64,
}

impl RealtimeRelay {
    fn new(upstream: mpsc::Sender<Upstream>, downstream: Downstream, ctx: BridgeContext) -> Self {
        let (tool_tx, tool_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        Self {
            upstream,
            downstream,
            ctx,
            calls: HashMap::new(),
            tool_tx,
            tool_rx,
            epoch: 0,
        }
    }

    async fn run(mut self, mut ai_rx: FrameStream) -> Result<()> {
        loop {
            tokio::select! {
                frame = ai_rx.next() => {
                    let Some(frame) = frame else {
                        info!("Realtime link closed.");
                        return Ok(());
                    };
                    let text = frame.context("Realtime link failed")?;
                    match decode_realtime_event(&text) {
                        Ok(event) => self.handle_event(event).await?,
                        Err(e) => warn!(error = %e, "Discarding malformed realtime event."),
                    }
                }
                Some(outcome) = self.tool_rx.recv() => self.answer_tool_call(outcome).await?,
            }
        }
    }

    async fn handle_event(&mut self, event: RealtimeEvent) -> Result<()> {
        match event {
            RealtimeEvent::SessionAcked => info!("Realtime session configuration acknowledged."),
            RealtimeEvent::SpeechStarted => {
                self.epoch += 1;
                info!(epoch = self.epoch, "Caller started speaking, clearing playback.");
                self.downstream
                    .control
                    .send(DownstreamControl::Clear { epoch: self.epoch })
                    .await
                    .map_err(|_| anyhow!("telephony writer has stopped"))?;
            }
            RealtimeEvent::AudioDelta { chunk } => {
                trace!(bytes = chunk.len(), "Relaying assistant audio.");
                self.downstream
                    .audio
                    .send(DownstreamAudio {
                        chunk,
                        epoch: self.epoch,
                    })
                    .await
                    .map_err(|_| anyhow!("telephony writer has stopped"))?;
            }
            RealtimeEvent::ToolCallArguments {
                call_id,
                function_name,
                arguments_json,
            } => self.dispatch_tool_call(call_id, function_name, arguments_json),
            RealtimeEvent::UpstreamError { detail } => {
                error!(%detail, "Realtime endpoint reported an error.");
            }
            RealtimeEvent::Other { raw_type } => trace!(%raw_type, "Ignoring realtime event."),
        }
        Ok(())
    }

    /// Resolves the call on a detached task so the relay keeps reading.
    /// A `call_id` is resolved at most once per session.
    fn dispatch_tool_call(&mut self, call_id: String, function_name: String, arguments_json: String) {
        if let Some(state) = self.calls.get(&call_id) {
            warn!(%call_id, ?state, "Ignoring repeated function call.");
            return;
        }
        self.calls.insert(call_id.clone(), CallState::Pending);
        info!(%call_id, %function_name, "Function call arguments received.");

        let tools = self.ctx.tools.clone();
        let fallback = self.ctx.fallback_text.clone();
        let tool_tx = self.tool_tx.clone();
        tokio::spawn(
            async move {
                let output =
                    resolve_or_fallback(tools.as_ref(), &function_name, &arguments_json, &fallback)
                        .await;
                if tool_tx.send(ToolOutcome { call_id, output }).await.is_err() {
                    debug!("Session ended before the function call completed; dropping result.");
                }
            }
            .in_current_span(),
        );
    }

    async fn answer_tool_call(&mut self, outcome: ToolOutcome) -> Result<()> {
        match self.calls.get_mut(&outcome.call_id) {
            Some(state) if *state == CallState::Pending => *state = CallState::Answered,
            _ => {
                warn!(call_id = %outcome.call_id, "Dropping result for an unknown or already answered call.");
                return Ok(());
            }
        }
        info!(call_id = %outcome.call_id, "Sending function call result upstream.");
        self.upstream
            .send(Upstream::ToolResult {
                call_id: outcome.call_id,
                output: outcome.output,
            })
            .await
            .map_err(|_| anyhow!("realtime writer has stopped"))
    }
}

fn spawn_downstream_writer(sink: FrameSink) -> (Downstream, JoinHandle<Result<(), LinkError>>) {
    let (control_tx, control_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    let (audio_tx, audio_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    let handle = tokio::spawn(write_downstream(sink, control_rx, audio_rx).in_current_span());
    let downstream = Downstream {
        control: control_tx,
        audio: audio_tx,
    };
    (downstream, handle)
}

/// Owns the telephony sink. Control messages always win over queued audio,
/// and audio queued before the most recent `clear` is discarded.
async fn write_downstream(
    mut sink: FrameSink,
    mut control_rx: mpsc::Receiver<DownstreamControl>,
    mut audio_rx: mpsc::Receiver<DownstreamAudio>,
) -> Result<(), LinkError> {
    let mut stream_sid: Option<String> = None;
    let mut flushed_epoch = 0u64;

    loop {
        tokio::select! {
            biased;
            Some(control) = control_rx.recv() => match control {
                DownstreamControl::StreamStarted(sid) => stream_sid = Some(sid),
                DownstreamControl::Clear { epoch } => {
                    flushed_epoch = epoch;
                    let Some(sid) = stream_sid.as_deref() else {
                        debug!("No stream yet, nothing to clear.");
                        continue;
                    };
                    match encode_clear_frame(sid) {
                        Ok(frame) => sink.send(frame).await?,
                        Err(e) => error!(error = %e, "Failed to encode clear frame."),
                    }
                }
            },
            Some(audio) = audio_rx.recv() => {
                if audio.epoch < flushed_epoch {
                    trace!("Dropping audio queued before barge-in.");
                    continue;
                }
                let Some(sid) = stream_sid.as_deref() else {
                    debug!("Dropping assistant audio, the telephony stream has not started.");
                    continue;
                };
                match encode_media_frame(sid, &audio.chunk) {
                    Ok(frame) => sink.send(frame).await?,
                    Err(e) => error!(error = %e, "Failed to encode media frame."),
                }
            },
            else => break,
        }
    }
    sink.close().await
}

/// Owns the realtime sink; writes events in the order they were queued.
async fn write_upstream(
    mut sink: FrameSink,
    mut rx: mpsc::Receiver<Upstream>,
) -> Result<(), LinkError> {
    while let Some(item) = rx.recv().await {
        match item {
            Upstream::Event(event) => send_event(&mut sink, &event).await?,
            Upstream::ToolResult { call_id, output } => {
                send_event(&mut sink, &ClientEvent::function_call_output(call_id, output)).await?;
                send_event(&mut sink, &ClientEvent::ResponseCreate).await?;
            }
        }
    }
    sink.close().await
}

async fn send_event(sink: &mut FrameSink, event: &ClientEvent) -> Result<(), LinkError> {
    match event.encode() {
        Ok(frame) => sink.send(frame).await,
        Err(e) => {
            error!(error = %e, "Failed to encode realtime event.");
            Ok(())
        }
    }
}

async fn finish_writer(side: &'static str, handle: JoinHandle<Result<(), LinkError>>) {
    let abort = handle.abort_handle();
    match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
        Ok(Ok(Ok(()))) => debug!(side, "Link closed."),
        Ok(Ok(Err(e))) => warn!(side, error = %e, "Link closed with error."),
        Ok(Err(e)) => error!(side, error = ?e, "Link writer task failed."),
        Err(_) => {
            warn!(side, "Timed out closing link.");
            abort.abort();
        }
    }
}
