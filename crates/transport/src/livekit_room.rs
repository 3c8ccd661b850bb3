//! LiveKit room
//!
//! Joins with a locally minted token, publishes one native audio track and
//! forwards every subscribed remote audio track into the inbound channel.

use async_trait::async_trait;
use futures::StreamExt;
use livekit::options::TrackPublishOptions;
use livekit::prelude::{LocalAudioTrack, LocalTrack, RemoteTrack, RoomEvent, RoomOptions};
use livekit::webrtc::audio_frame::AudioFrame as RtcAudioFrame;
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::audio_source::{AudioSourceOptions, RtcAudioSource};
use livekit::webrtc::audio_stream::native::NativeAudioStream;
use parking_lot::Mutex;
use room_assistant_config::TransportSettings;
use room_assistant_core::{AudioFrame, Channels, SampleRate};
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::room::{ConnectionState, Room};
use crate::token::{mint_join_token, JoinTokenRequest};
use crate::TransportError;

const AUDIO_CHANNEL_CAPACITY: usize = 512;
const TRACK_NAME: &str = "assistant-voice";
/// Publish in 10 ms frames
const PUBLISH_FRAME_MS: usize = 10;

pub struct LiveKitRoom {
    name: String,
    room: livekit::Room,
    sample_rate: SampleRate,
    source: NativeAudioSource,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    audio_rx: Mutex<Option<mpsc::Receiver<AudioFrame>>>,
}

impl LiveKitRoom {
    pub async fn connect(
        settings: &TransportSettings,
        room_name: &str,
    ) -> Result<Self, TransportError> {
        if settings.url.is_empty() {
            return Err(TransportError::Configuration(
                "LiveKit URL is not set".to_string(),
            ));
        }
        let sample_rate = SampleRate::from_u32(settings.sample_rate).ok_or_else(|| {
            TransportError::Configuration(format!(
                "unsupported room sample rate {}",
                settings.sample_rate
            ))
        })?;

        let token = mint_join_token(&JoinTokenRequest::from_settings(settings, room_name))?;

        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let state_tx = Arc::new(state_tx);

        let (room, events) = livekit::Room::connect(&settings.url, &token, RoomOptions::default())
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let source = NativeAudioSource::new(
            AudioSourceOptions::default(),
            sample_rate.as_u32(),
            1,
            100,
        );
        let track = LocalAudioTrack::create_audio_track(
            TRACK_NAME,
            RtcAudioSource::Native(source.clone()),
        );
        room.local_participant()
            .publish_track(LocalTrack::Audio(track), TrackPublishOptions::default())
            .await
            .map_err(|e| TransportError::Connection(format!("publish track: {}", e)))?;

        state_tx.send_replace(ConnectionState::Connected);
        tracing::info!(room = %room.name(), url = %settings.url, "Joined LiveKit room");

        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_CHANNEL_CAPACITY);
        tokio::spawn(pump_events(events, state_tx.clone(), audio_tx, sample_rate));

        Ok(Self {
            name: room_name.to_string(),
            room,
            sample_rate,
            source,
            state_tx,
            audio_rx: Mutex::new(Some(audio_rx)),
        })
    }
}

/// Track room events: connection state and subscribed audio tracks
async fn pump_events(
    mut events: mpsc::UnboundedReceiver<RoomEvent>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    audio_tx: mpsc::Sender<AudioFrame>,
    sample_rate: SampleRate,
) {
    let sequence = Arc::new(AtomicU64::new(0));

    while let Some(event) = events.recv().await {
        match event {
            RoomEvent::TrackSubscribed {
                track: RemoteTrack::Audio(track),
                participant,
                ..
            } => {
                tracing::info!(participant = %participant.identity(), "Subscribed to participant audio");
                let stream = NativeAudioStream::new(
                    track.rtc_track(),
                    sample_rate.as_u32() as i32,
                    1,
                );
                tokio::spawn(forward_audio(
                    stream,
                    audio_tx.clone(),
                    sample_rate,
                    sequence.clone(),
                ));
            }
            RoomEvent::Reconnecting => {
                state_tx.send_replace(ConnectionState::Reconnecting);
            }
            RoomEvent::Reconnected => {
                state_tx.send_replace(ConnectionState::Connected);
            }
            RoomEvent::Disconnected { reason } => {
                tracing::info!(?reason, "LiveKit room disconnected");
                state_tx.send_replace(ConnectionState::Disconnected);
                break;
            }
            _ => {}
        }
    }

    // event stream ending means the room is gone
    state_tx.send_replace(ConnectionState::Disconnected);
}

async fn forward_audio(
    mut stream: NativeAudioStream,
    audio_tx: mpsc::Sender<AudioFrame>,
    sample_rate: SampleRate,
    sequence: Arc<AtomicU64>,
) {
    while let Some(frame) = stream.next().await {
        let frame = AudioFrame::from_i16(
            &frame.data,
            sample_rate,
            Channels::Mono,
            sequence.fetch_add(1, Ordering::Relaxed),
        );
        if audio_tx.send(frame).await.is_err() {
            break;
        }
    }
}

#[async_trait]
impl Room for LiveKitRoom {
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

        let frame = frame.resample(self.sample_rate);
        let samples = frame.to_i16();
        let per_frame = self.sample_rate.samples_per_ms() * PUBLISH_FRAME_MS;

        for chunk in samples.chunks(per_frame) {
            let rtc_frame = RtcAudioFrame {
                data: Cow::Borrowed(chunk),
                sample_rate: self.sample_rate.as_u32(),
                num_channels: 1,
                samples_per_channel: chunk.len() as u32,
            };
            self.source
                .capture_frame(&rtc_frame)
                .await
                .map_err(|e| TransportError::Publish(e.to_string()))?;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.state_tx.send_replace(ConnectionState::Disconnected);
        self.room
            .close()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))
    }
}
