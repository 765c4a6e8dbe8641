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

//! Transport abstraction and the BlueZ RFCOMM implementation.
//!
//! The session state machine only sees [`Transport`]: one call accepts one
//! inbound session, one call dials out. Both block until a session exists
//! and are canceled by dropping the in-flight future, which closes the
//! underlying socket.

use async_trait::async_trait;
use bluer::rfcomm::{Listener, SocketAddr, Stream};
use bluer::{Adapter, Address, Session};
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;
use uuid::Uuid;

use crate::error::TransportError;

/// Standard Serial Port Profile UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// RFCOMM channel used when the configuration does not override it.
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// Transport-level address of the remote device. Used to label sessions and
/// to dial out; never used to mutate transport state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A raw byte duplex to one peer.
pub trait SessionStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> SessionStream for T {}

/// Established duplex session, boxed so tests can substitute in-memory pipes.
pub type BoxedSession = Box<dyn SessionStream>;

/// Produces duplex sessions. Implemented by the BlueZ stack in production
/// and by scripted stubs in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Accept one inbound session. Blocks until a peer connects.
    async fn listen(&self) -> Result<(BoxedSession, PeerId), TransportError>;

    /// Open one outbound session to `peer`. Blocks until connected.
    async fn dial(&self, peer: &PeerId) -> Result<BoxedSession, TransportError>;
}

/// BlueZ-backed RFCOMM transport.
pub struct RfcommTransport {
    _session: Session,
    adapter: Adapter,
    channel: u8,
}

impl RfcommTransport {
    /// Connect to BlueZ and prepare the default adapter.
    pub async fn new(channel: u8) -> Result<Self, TransportError> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;

        if !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }
        adapter.set_discoverable(true).await?;
        adapter.set_pairable(true).await?;

        info!(
            "Using Bluetooth adapter {} (SPP {})",
            adapter.name(),
            SPP_UUID
        );

        Ok(Self {
            _session: session,
            adapter,
            channel,
        })
    }

    /// Set the adapter alias shown to remote devices.
    pub async fn set_name(&self, name: &str) -> Result<(), TransportError> {
        self.adapter.set_alias(name.to_string()).await?;
        info!("Bluetooth name set to: {}", name);
        Ok(())
    }

    /// Adapter MAC address.
    pub async fn address(&self) -> Result<Address, TransportError> {
        Ok(self.adapter.address().await?)
    }
}

#[async_trait]
impl Transport for RfcommTransport {
    async fn listen(&self) -> Result<(BoxedSession, PeerId), TransportError> {
        let local_addr = SocketAddr::new(Address::any(), self.channel);
        let listener = Listener::bind(local_addr).await?;
        info!("RFCOMM server listening on channel {}", self.channel);

        let (stream, peer_addr) = listener.accept().await?;
        info!("Accepted connection from {}", peer_addr.addr);

        Ok((Box::new(stream), PeerId::new(peer_addr.addr.to_string())))
    }

    async fn dial(&self, peer: &PeerId) -> Result<BoxedSession, TransportError> {
        let addr: Address = peer
            .as_str()
            .parse()
            .map_err(|_| TransportError::InvalidPeer(peer.as_str().to_string()))?;

        info!("Dialing {} on channel {}", peer, self.channel);
        let stream = Stream::connect(SocketAddr::new(addr, self.channel)).await?;

        Ok(Box::new(stream))
    }
}
