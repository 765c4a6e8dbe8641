// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Connection lifecycle state machine.
//!
//! Arbitrates exactly one active role among the acceptor (waiting for the
//! camera to connect), the dialer (connecting out to the camera), and the
//! connected session. Every transition stops the other two roles first, in
//! the order: dialer, connected session, acceptor. Each role is a spawned
//! task; cancellation aborts the task, dropping the in-flight transport
//! future and closing the handle under it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::handler::ProtocolHandler;
use super::protocol::Frame;
use super::transport::{BoxedSession, PeerId, Transport};
use crate::error::TransportError;

/// Read buffer size. The camera never delivers more than ~1 KiB per read.
const READ_BUFFER_SIZE: usize = 2 * 1024;

/// Depth of the per-session outbound queue and of the event channel.
const QUEUE_DEPTH: usize = 32;

/// Delay before retrying a failed accept.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    Connecting,
    Connected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Listening => "Listening",
            SessionState::Connecting => "Connecting",
            SessionState::Connected => "Connected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do after the dialer role loses its connection or fails to dial.
/// The server role always resumes listening and is not affected by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    None,
    RetryAfter(Duration),
}

/// Events surfaced to the application layer.
#[derive(Debug)]
pub enum SessionEvent {
    /// The lifecycle state changed.
    StateChanged(SessionState),
    /// A frame was decoded from the peer.
    FrameObserved(Frame),
    /// A chunked capture finished reassembling.
    ImageComplete { file_name: String, bytes: Vec<u8> },
    /// An outbound session was lost; only emitted for the dialer role.
    ConnectionLost { peer: PeerId },
    /// A transport or protocol error occurred.
    Error(String),
}

/// Which side established the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Acceptor,
    Dialer,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::Acceptor => "acceptor",
            Role::Dialer => "dialer",
        }
    }
}

struct ActiveSession {
    id: u64,
    peer: PeerId,
    outbound_tx: mpsc::Sender<Vec<u8>>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    acceptor: Option<JoinHandle<()>>,
    dialer: Option<JoinHandle<()>>,
    session: Option<ActiveSession>,
    next_session_id: u64,
}

struct Shared {
    transport: Arc<dyn Transport>,
    inner: Mutex<Inner>,
    state: RwLock<SessionState>,
    peer: RwLock<Option<PeerId>>,
    event_tx: mpsc::Sender<SessionEvent>,
    reconnect: ReconnectPolicy,
}

/// Handle to the session state machine. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Create an idle manager and the event stream it reports through.
    pub fn new(
        transport: Arc<dyn Transport>,
        reconnect: ReconnectPolicy,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(QUEUE_DEPTH);
        let manager = Self {
            shared: Arc::new(Shared {
                transport,
                inner: Mutex::new(Inner::default()),
                state: RwLock::new(SessionState::Idle),
                peer: RwLock::new(None),
                event_tx,
                reconnect,
            }),
        };
        (manager, event_rx)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.shared.state.read()
    }

    /// Address of the connected peer, if any.
    pub fn connected_peer(&self) -> Option<PeerId> {
        self.shared.peer.read().clone()
    }

    /// Start the acceptor role. Stops any dialer or connected session first.
    /// Calling this while already listening is a no-op.
    pub async fn start_server(&self) {
        let mut inner = self.shared.inner.lock().await;

        if self.state() == SessionState::Listening
            && inner.acceptor.as_ref().is_some_and(|h| !h.is_finished())
        {
            debug!("Acceptor already running");
            return;
        }

        self.stop_roles(&mut inner).await;

        let manager = self.clone();
        inner.acceptor = Some(tokio::spawn(async move { manager.accept_task().await }));
        drop(inner);

        self.set_state(SessionState::Listening).await;
    }

    /// Stop the acceptor role and any connected session.
    pub async fn stop_server(&self) {
        let mut inner = self.shared.inner.lock().await;
        if let Some(handle) = inner.acceptor.take() {
            debug!("Stopping acceptor");
            halt(handle).await;
        }
        self.close_session(&mut inner).await;
        drop(inner);

        if matches!(
            self.state(),
            SessionState::Listening | SessionState::Connected
        ) {
            self.set_state(SessionState::Idle).await;
        }
    }

    /// Start the dialer role towards `peer`. Stops any acceptor or connected
    /// session first.
    pub async fn connect_to(&self, peer: PeerId) {
        let mut inner = self.shared.inner.lock().await;
        self.stop_roles(&mut inner).await;

        let manager = self.clone();
        let dial_peer = peer.clone();
        inner.dialer = Some(tokio::spawn(async move {
            manager.dial_task(dial_peer, None).await;
        }));
        drop(inner);

        info!("Connecting to {}", peer);
        self.set_state(SessionState::Connecting).await;
    }

    /// Stop the dialer role and any connected session.
    pub async fn disconnect(&self) {
        let mut inner = self.shared.inner.lock().await;
        if let Some(handle) = inner.dialer.take() {
            debug!("Stopping dialer");
            halt(handle).await;
        }
        self.close_session(&mut inner).await;
        drop(inner);

        if matches!(
            self.state(),
            SessionState::Connecting | SessionState::Connected
        ) {
            self.set_state(SessionState::Idle).await;
        }
    }

    /// Tear everything down. Idempotent.
    pub async fn stop(&self) {
        let mut inner = self.shared.inner.lock().await;
        self.stop_roles(&mut inner).await;
        drop(inner);

        self.set_state(SessionState::Idle).await;
    }

    /// Queue bytes for the peer. Application sends share the session's FIFO
    /// outbound queue with generated responses, so write order is preserved.
    pub async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        let outbound_tx = {
            let inner = self.shared.inner.lock().await;
            match &inner.session {
                Some(session) => session.outbound_tx.clone(),
                None => return Err(TransportError::NotConnected),
            }
        };

        outbound_tx
            .send(bytes)
            .await
            .map_err(|_| TransportError::NotConnected)
    }

    /// Stop all three roles: dialer first, then the connected session, then
    /// the acceptor. Caller holds the transition lock.
    async fn stop_roles(&self, inner: &mut Inner) {
        if let Some(handle) = inner.dialer.take() {
            debug!("Stopping dialer");
            halt(handle).await;
        }
        self.close_session(inner).await;
        if let Some(handle) = inner.acceptor.take() {
            debug!("Stopping acceptor");
            halt(handle).await;
        }
    }

    async fn close_session(&self, inner: &mut Inner) {
        if let Some(session) = inner.session.take() {
            debug!("Closing session with {}", session.peer);
            halt(session.reader).await;
            halt(session.writer).await;
        }
        *self.shared.peer.write() = None;
    }

    async fn set_state(&self, next: SessionState) {
        let changed = {
            let mut state = self.shared.state.write();
            if *state == next {
                false
            } else {
                info!("Session state: {} -> {}", *state, next);
                *state = next;
                true
            }
        };
        if changed {
            self.emit(SessionEvent::StateChanged(next)).await;
        }
    }

    async fn emit(&self, event: SessionEvent) {
        let _ = self.shared.event_tx.send(event).await;
    }

    /// Acceptor role: wait for one inbound session, retrying on accept
    /// errors, then hand it over to session management.
    async fn accept_task(self) {
        loop {
            match self.shared.transport.listen().await {
                Ok((stream, peer)) => {
                    self.adopt_session(stream, peer, Role::Acceptor).await;
                    break;
                }
                Err(e) => {
                    warn!("Accept error: {}", e);
                    self.emit(SessionEvent::Error(e.to_string())).await;
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Dialer role: one connection attempt, optionally delayed (retry).
    ///
    /// Returns a boxed future to break the async-recursion opaque-type cycle
    /// (`dial_task` → `adopt_session` → `read_task` → `on_session_ended` →
    /// `dial_task`); the concrete `Send` future type lets the spawned tasks
    /// prove `Send` without the compiler chasing the cycle.
    fn dial_task(
        self,
        peer: PeerId,
        delay: Option<Duration>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
                info!("Retrying connection to {}", peer);
                self.set_state(SessionState::Connecting).await;
            }

            match self.shared.transport.dial(&peer).await {
                Ok(stream) => self.adopt_session(stream, peer, Role::Dialer).await,
                Err(e) => {
                    warn!("Failed to connect to {}: {}", peer, e);
                    self.emit(SessionEvent::Error(e.to_string())).await;
                    self.on_dial_failed(peer).await;
                }
            }
        })
    }

    async fn on_dial_failed(&self, peer: PeerId) {
        let mut inner = self.shared.inner.lock().await;
        // This task is the registered dialer; release the slot without
        // aborting ourselves.
        inner.dialer.take();

        if let ReconnectPolicy::RetryAfter(delay) = self.shared.reconnect {
            let manager = self.clone();
            inner.dialer = Some(tokio::spawn(async move {
                manager.dial_task(peer, Some(delay)).await;
            }));
        }
        drop(inner);

        self.set_state(SessionState::Idle).await;
    }

    /// Promote an established stream to the active session. The other two
    /// roles are stopped; the caller's own role slot is released without an
    /// abort since its task is finishing.
    async fn adopt_session(&self, stream: BoxedSession, peer: PeerId, role: Role) {
        let mut inner = self.shared.inner.lock().await;

        match role {
            Role::Acceptor => {
                inner.acceptor.take();
                if let Some(handle) = inner.dialer.take() {
                    halt(handle).await;
                }
            }
            Role::Dialer => {
                inner.dialer.take();
                if let Some(handle) = inner.acceptor.take() {
                    halt(handle).await;
                }
            }
        }
        if let Some(session) = inner.session.take() {
            warn!("Replacing existing session with {}", session.peer);
            halt(session.reader).await;
            halt(session.writer).await;
        }

        inner.next_session_id += 1;
        let id = inner.next_session_id;

        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_DEPTH);
        let (read_half, write_half) = tokio::io::split(stream);

        let writer = tokio::spawn(write_task(outbound_rx, write_half));
        let manager = self.clone();
        let read_peer = peer.clone();
        let response_tx = outbound_tx.clone();
        let reader = tokio::spawn(async move {
            manager.read_task(id, role, read_peer, read_half, response_tx).await;
        });

        info!("Session established with {} ({})", peer, role.as_str());
        *self.shared.peer.write() = Some(peer.clone());
        inner.session = Some(ActiveSession {
            id,
            peer,
            outbound_tx,
            reader,
            writer,
        });
        drop(inner);

        self.set_state(SessionState::Connected).await;
    }

    /// Read loop. Owns the session's protocol handler; one read is one
    /// frame. Responses go through the outbound queue, so they are written
    /// in the exact order frames were received.
    fn read_task(
        self,
        id: u64,
        role: Role,
        peer: PeerId,
        mut read_half: ReadHalf<BoxedSession>,
        outbound_tx: mpsc::Sender<Vec<u8>>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
        let mut handler = ProtocolHandler::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            match read_half.read(&mut buf).await {
                Ok(0) => {
                    info!("Connection closed by {}", peer);
                    break;
                }
                Ok(n) => match handler.handle_chunk(&buf[..n]) {
                    Ok(output) => {
                        if let Some(frame) = output.frame {
                            self.emit(SessionEvent::FrameObserved(frame)).await;
                        }
                        if let Some(response) = output.response {
                            if outbound_tx.send(response.encode()).await.is_err() {
                                warn!("Outbound queue closed for {}", peer);
                                break;
                            }
                        }
                        if let Some(image) = output.image {
                            info!(
                                "Capture received from {}: {} ({} bytes)",
                                peer,
                                image.file_name,
                                image.bytes.len()
                            );
                            self.emit(SessionEvent::ImageComplete {
                                file_name: image.file_name,
                                bytes: image.bytes,
                            })
                            .await;
                        }
                    }
                    Err(e) => {
                        error!("Protocol error from {}, closing session: {}", peer, e);
                        self.emit(SessionEvent::Error(e.to_string())).await;
                        break;
                    }
                },
                Err(e) => {
                    warn!("Read error from {}: {}", peer, e);
                    self.emit(SessionEvent::Error(e.to_string())).await;
                    break;
                }
            }
        }

        self.on_session_ended(id, role, peer).await;
        })
    }

    /// Session teardown driven by the read loop itself. External transitions
    /// that already replaced the session make this a no-op.
    async fn on_session_ended(&self, id: u64, role: Role, peer: PeerId) {
        {
            let mut inner = self.shared.inner.lock().await;
            match &inner.session {
                Some(session) if session.id == id => {
                    // Dropping the session drops the outbound sender; the
                    // writer drains the queue and exits on its own.
                    inner.session.take();
                }
                _ => return,
            }
        }
        *self.shared.peer.write() = None;
        self.set_state(SessionState::Idle).await;

        match role {
            Role::Acceptor => {
                info!("Connection lost, resuming listening");
                self.start_server().await;
            }
            Role::Dialer => {
                self.emit(SessionEvent::ConnectionLost { peer: peer.clone() }).await;

                if let ReconnectPolicy::RetryAfter(delay) = self.shared.reconnect {
                    let mut inner = self.shared.inner.lock().await;
                    if inner.acceptor.is_none() && inner.dialer.is_none() && inner.session.is_none()
                    {
                        let manager = self.clone();
                        inner.dialer = Some(tokio::spawn(async move {
                            manager.dial_task(peer, Some(delay)).await;
                        }));
                    }
                }
            }
        }
    }
}

/// Abort a role task and wait for it to wind down, so the next role only
/// starts after the previous one's blocking call has been canceled.
async fn halt(handle: JoinHandle<()>) {
    handle.abort();
    let _ = handle.await;
}

/// Writer half of a session: drains the FIFO outbound queue.
async fn write_task(mut outbound_rx: mpsc::Receiver<Vec<u8>>, mut write_half: WriteHalf<BoxedSession>) {
    while let Some(bytes) = outbound_rx.recv().await {
        if let Err(e) = write_half.write_all(&bytes).await {
            warn!("Write error: {}", e);
            break;
        }
        if let Err(e) = write_half.flush().await {
            warn!("Flush error: {}", e);
            break;
        }
    }
}
