//! Room transport
//!
//! Features:
//! - `Room` abstraction: connection state (polled or watched), inbound
//!   audio, audio publishing, disconnect
//! - LiveKit rooms (cargo feature `livekit`, enabled by the worker binaries)
//! - LiveKit join-token minting
//! - In-process loopback room for local runs and tests

pub mod loopback;
pub mod room;
pub mod token;

#[cfg(feature = "livekit")]
pub mod livekit_room;

pub use loopback::{LoopbackHandle, LoopbackRoom};
pub use room::{ConnectionState, Room};
pub use token::{mint_join_token, JoinTokenRequest};

#[cfg(feature = "livekit")]
pub use livekit_room::LiveKitRoom;

use room_assistant_config::{TransportKind, TransportSettings};
use std::sync::Arc;
use thiserror::Error;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Token error: {0}")]
    Token(String),

    #[error("Room closed")]
    Closed,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<TransportError> for room_assistant_core::Error {
    fn from(err: TransportError) -> Self {
        use room_assistant_core::Error;

        match err {
            TransportError::Connection(msg) => Error::Connection(msg),
            TransportError::Token(msg) | TransportError::Configuration(msg) => Error::Config(msg),
            other => Error::adapter("transport", other),
        }
    }
}

/// Connect to `room_name` with the configured transport
///
/// A failed connect is returned as-is; callers do not retry.
pub async fn connect(
    settings: &TransportSettings,
    room_name: &str,
) -> Result<Arc<dyn Room>, TransportError> {
    match settings.kind {
        TransportKind::Loopback => {
            // standalone run: no remote side, inbound audio ends immediately
            let (room, _handle) = LoopbackRoom::connected(room_name, settings.sample_rate)?;
            Ok(Arc::new(room))
        }
        #[cfg(feature = "livekit")]
        TransportKind::LiveKit => Ok(Arc::new(LiveKitRoom::connect(settings, room_name).await?)),
        #[cfg(not(feature = "livekit"))]
        TransportKind::LiveKit => Err(TransportError::Configuration(
            "LiveKit transport requires the `livekit` feature".to_string(),
        )),
    }
}
