//! Room abstraction

use async_trait::async_trait;
use room_assistant_core::{AudioFrame, SampleRate};
use tokio::sync::{mpsc, watch};

use crate::TransportError;

/// Connection state of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        write!(f, "{}", s)
    }
}

/// A joined realtime room
///
/// The room owns its connection state; observers either poll
/// [`connection_state`](Room::connection_state) or await changes on
/// [`subscribe_state`](Room::subscribe_state).
#[async_trait]
pub trait Room: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn connection_state(&self) -> ConnectionState;

    fn subscribe_state(&self) -> watch::Receiver<ConnectionState>;

    /// Inbound participant audio; `None` once taken
    fn take_audio_input(&self) -> Option<mpsc::Receiver<AudioFrame>>;

    /// Rate audio must have when handed to [`publish_audio`](Room::publish_audio)
    fn output_sample_rate(&self) -> SampleRate;

    async fn publish_audio(&self, frame: AudioFrame) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}
