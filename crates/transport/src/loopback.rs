//! In-process loopback room
//!
//! The [`LoopbackHandle`] plays the remote side: it feeds participant audio,
//! drives the connection state and reads what the assistant published.

use async_trait::async_trait;
use parking_lot::Mutex;
use room_assistant_core::{AudioFrame, SampleRate};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::room::{ConnectionState, Room};
use crate::TransportError;

const AUDIO_CHANNEL_CAPACITY: usize = 512;

pub struct LoopbackRoom {
    name: String,
    sample_rate: SampleRate,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    audio_rx: Mutex<Option<mpsc::Receiver<AudioFrame>>>,
    published: Arc<Mutex<Vec<AudioFrame>>>,
}

/// Remote side of a [`LoopbackRoom`]
#[derive(Clone)]
pub struct LoopbackHandle {
    state_tx: Arc<watch::Sender<ConnectionState>>,
    audio_tx: mpsc::Sender<AudioFrame>,
    published: Arc<Mutex<Vec<AudioFrame>>>,
}

impl LoopbackRoom {
    /// Room in `Connecting` state
    pub fn new(
        name: impl Into<String>,
        sample_rate: u32,
    ) -> Result<(Self, LoopbackHandle), TransportError> {
        let sample_rate = SampleRate::from_u32(sample_rate).ok_or_else(|| {
            TransportError::Configuration(format!("unsupported room sample rate {}", sample_rate))
        })?;

        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let state_tx = Arc::new(state_tx);
        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_CHANNEL_CAPACITY);
        let published = Arc::new(Mutex::new(Vec::new()));

        let room = Self {
            name: name.into(),
            sample_rate,
            state_tx: state_tx.clone(),
            audio_rx: Mutex::new(Some(audio_rx)),
            published: published.clone(),
        };
        let handle = LoopbackHandle {
            state_tx,
            audio_tx,
            published,
        };
        Ok((room, handle))
    }

    /// Room already in `Connected` state
    pub fn connected(
        name: impl Into<String>,
        sample_rate: u32,
    ) -> Result<(Self, LoopbackHandle), TransportError> {
        let (room, handle) = Self::new(name, sample_rate)?;
        handle.set_state(ConnectionState::Connected);
        Ok((room, handle))
    }
}

#[async_trait]
impl Room for LoopbackRoom {
    fn name(&self) -> &str {
        &self.name
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn take_audio_input(&self) -> Option<mpsc::Receiver<AudioFrame>> {
        self.audio_rx.lock().take()
    }

    fn output_sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    async fn publish_audio(&self, frame: AudioFrame) -> Result<(), TransportError> {
        if !self.connection_state().is_connected() {
            return Err(TransportError::Closed);
        }
        self.published.lock().push(frame);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.state_tx.send_replace(ConnectionState::Disconnected);
        Ok(())
    }
}

impl LoopbackHandle {
    /// Deliver participant audio to the room
    pub async fn send_audio(&self, frame: AudioFrame) -> Result<(), TransportError> {
        self.audio_tx
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Simulate the remote end closing the room
    pub fn disconnect(&self) {
        self.set_state(ConnectionState::Disconnected);
    }

    /// Frames published so far
    pub fn published(&self) -> Vec<AudioFrame> {
        self.published.lock().clone()
    }

    pub fn published_count(&self) -> usize {
        self.published.lock().len()
    }
}
