//! Session driver
//!
//! Start the assistant on a connected room, greet once, then wait for the
//! room to leave the `Connected` state. State changes are picked up from the
//! room's watch channel; a fallback tick bounds detection latency when
//! updates are missed.

use room_assistant_config::{AgentSettings, MAX_POLL_INTERVAL_MS};
use room_assistant_transport::{ConnectionState, Room};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::assistant::{SpeechOutcome, VoiceAssistant};
use crate::AgentError;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Said once after the assistant starts; empty to skip
    pub greeting: String,
    pub allow_interruptions: bool,
    /// Fallback connection check, capped at one second
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            greeting: String::new(),
            allow_interruptions: true,
            poll_interval: Duration::from_millis(MAX_POLL_INTERVAL_MS),
        }
    }
}

impl SessionConfig {
    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self {
            greeting: settings.greeting.clone(),
            allow_interruptions: settings.allow_interruptions,
            poll_interval: Duration::from_millis(
                settings.poll_interval_ms.clamp(1, MAX_POLL_INTERVAL_MS),
            ),
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEnd {
    /// Room state that ended the wait
    pub final_state: ConnectionState,
    /// `None` when no greeting was configured
    pub greeting: Option<SpeechOutcome>,
}

/// Run one session on `room` until it disconnects
///
/// The assistant is stopped before returning, whether the session ended
/// because the room went away or because an assistant task failed.
pub async fn run_session(
    assistant: &VoiceAssistant,
    room: Arc<dyn Room>,
    config: &SessionConfig,
) -> Result<SessionEnd, AgentError> {
    tracing::info!("Connected to room: {}", room.name());

    let mut state_rx = room.subscribe_state();
    assistant.start(room.clone())?;

    let result = drive(assistant, room.as_ref(), &mut state_rx, config).await;
    assistant.stop().await;

    match &result {
        Ok(end) => tracing::info!(room = %room.name(), state = %end.final_state, "Session ended"),
        Err(e) => tracing::error!(room = %room.name(), error = %e, "Session failed"),
    }
    result
}

async fn drive(
    assistant: &VoiceAssistant,
    room: &dyn Room,
    state_rx: &mut watch::Receiver<ConnectionState>,
    config: &SessionConfig,
) -> Result<SessionEnd, AgentError> {
    let greeting = if config.greeting.trim().is_empty() {
        None
    } else {
        let outcome = assistant
            .say(&config.greeting, config.allow_interruptions)
            .await?;
        tracing::info!("Greeting message sent.");
        Some(outcome)
    };

    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut watching = true;
    let mut assistant_running = true;

    loop {
        state_rx.borrow_and_update();
        let state = room.connection_state();
        if !state.is_connected() {
            return Ok(SessionEnd {
                final_state: state,
                greeting,
            });
        }

        tokio::select! {
            changed = state_rx.changed(), if watching => {
                if changed.is_err() {
                    // sender gone, keep polling
                    watching = false;
                }
            }
            _ = ticker.tick() => {
                tracing::debug!("waiting for messages");
            }
            failure = assistant.failure(), if assistant_running => match failure {
                Some(e) => return Err(e),
                None => assistant_running = false,
            },
        }
    }
}
