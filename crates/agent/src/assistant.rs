//! Voice Assistant
//!
//! Runs two tasks once started on a room:
//!
//! ```text
//! room audio ──▶ listen task (VAD, utterance buffering, barge-in)
//!                     │ utterance
//!                     ▼
//!                turn task (STT ─▶ responder ─▶ sentences ─▶ TTS) ──▶ room
//! ```
//!
//! Turns are handled one at a time. Playout of interruptible speech stops
//! at the next chunk boundary once the listen task detects user speech.
//! The responder's memory follows what the room heard: a spoken greeting is
//! added as an assistant turn and an interrupted reply keeps only the
//! sentences that started playing.

use parking_lot::Mutex;
use room_assistant_config::AgentSettings;
use room_assistant_core::{
    AudioFrame, ChatResponder, Message, SampleRate, SpeechToText, TextToSpeech, VADEvent, VADState,
    VoiceActivityDetector,
};
use room_assistant_pipeline::{split_sentences, SentenceChunker};
use room_assistant_transport::{Room, TransportError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::AgentError;

const EVENT_CAPACITY: usize = 128;
const UTTERANCE_QUEUE: usize = 4;
const DELTA_QUEUE: usize = 64;
/// STT input rate
const STT_SAMPLE_RATE: SampleRate = SampleRate::Hz16000;

/// The four capabilities the assistant drives
///
/// Nothing checks that they fit together; a mismatch surfaces as a runtime
/// adapter error on first use.
#[derive(Clone)]
pub struct AssistantComponents {
    pub vad: Arc<dyn VoiceActivityDetector>,
    pub stt: Arc<dyn SpeechToText>,
    pub responder: Arc<dyn ChatResponder>,
    pub tts: Arc<dyn TextToSpeech>,
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Whether user speech may interrupt replies
    pub allow_interruptions: bool,
    /// Speak reply sentences as the model streams them
    pub stream_responses: bool,
    /// Force an utterance to end after this long
    pub max_utterance: Duration,
    /// Playout granularity; interruption is checked between chunks
    pub playout_chunk: Duration,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            allow_interruptions: true,
            stream_responses: true,
            max_utterance: Duration::from_secs(30),
            playout_chunk: Duration::from_millis(100),
        }
    }
}

impl AssistantConfig {
    pub fn from_settings(settings: &AgentSettings, stream_responses: bool) -> Self {
        Self {
            allow_interruptions: settings.allow_interruptions,
            stream_responses,
            ..Default::default()
        }
    }
}

/// Observable assistant activity
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantEvent {
    Started { room: String },
    UserSpeechStarted,
    UserSpeechEnded { duration_ms: u64 },
    Transcript { text: String },
    Reply { text: String },
    SpeechStarted { text: String },
    SpeechFinished { text: String, outcome: SpeechOutcome },
    Stopped,
}

/// How a playout ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    Completed,
    Interrupted,
}

/// Result of one playout
struct Played {
    outcome: SpeechOutcome,
    /// Pieces with at least one chunk published, space separated
    heard: String,
}

struct Shared {
    components: AssistantComponents,
    config: AssistantConfig,
    events: broadcast::Sender<AssistantEvent>,
    /// Set while interruptible speech is playing
    interruptible: AtomicBool,
    /// Bumped on every barge-in
    interrupt_epoch: AtomicU64,
    /// One playout at a time
    speech_lock: tokio::sync::Mutex<()>,
}

impl Shared {
    fn emit(&self, event: AssistantEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Synthesize each piece in order and publish it to `room`
    async fn play<I>(
        &self,
        room: &dyn Room,
        pieces: I,
        allow_interruptions: bool,
    ) -> Result<Played, AgentError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let _guard = self.speech_lock.lock().await;
        let mut playout = Playout::begin(self, room, allow_interruptions);
        let mut spoken = Ok(());
        for piece in pieces {
            spoken = playout.speak(piece.as_ref()).await;
            if spoken.is_err() {
                break;
            }
        }
        let played = playout.finish();
        spoken.map(|()| played)
    }

    /// Cut an interrupted reply in memory down to what was heard
    fn settle_reply(&self, played: &Played) {
        if played.outcome != SpeechOutcome::Interrupted {
            return;
        }
        if let Some(memory) = self.components.responder.chat_memory() {
            memory.truncate_last_reply(&played.heard);
            tracing::debug!(heard = %played.heard, "Kept heard part of interrupted reply");
        }
    }
}

/// One interruptible stretch of speech, possibly several sentences
struct Playout<'a> {
    shared: &'a Shared,
    room: &'a dyn Room,
    epoch: u64,
    allow_interruptions: bool,
    interrupted: bool,
    spoken: Vec<String>,
    heard: Vec<String>,
}

impl<'a> Playout<'a> {
    fn begin(shared: &'a Shared, room: &'a dyn Room, allow_interruptions: bool) -> Self {
        let epoch = shared.interrupt_epoch.load(Ordering::SeqCst);
        if allow_interruptions {
            shared.interruptible.store(true, Ordering::SeqCst);
        }
        Self {
            shared,
            room,
            epoch,
            allow_interruptions,
            interrupted: false,
            spoken: Vec::new(),
            heard: Vec::new(),
        }
    }

    fn is_interrupted(&mut self) -> bool {
        if self.allow_interruptions
            && self.shared.interrupt_epoch.load(Ordering::SeqCst) != self.epoch
        {
            self.interrupted = true;
        }
        self.interrupted
    }

    async fn speak(&mut self, text: &str) -> Result<(), AgentError> {
        if text.trim().is_empty() || self.is_interrupted() {
            return Ok(());
        }
        if self.spoken.is_empty() {
            self.shared.emit(AssistantEvent::SpeechStarted {
                text: text.to_string(),
            });
        }
        self.spoken.push(text.to_string());

        let audio = self.shared.components.tts.synthesize(text).await?;
        let audio = audio.resample(self.room.output_sample_rate());
        let chunk_len = (self.room.output_sample_rate().samples_per_ms()
            * self.shared.config.playout_chunk.as_millis() as usize)
            .max(1);

        let mut started = false;
        for chunk in audio.split(chunk_len) {
            if self.is_interrupted() {
                break;
            }
            match self.room.publish_audio(chunk).await {
                Ok(()) if !started => {
                    started = true;
                    self.heard.push(text.to_string());
                }
                Ok(()) => {}
                // room went away mid-sentence: stop talking, the session ends on its own
                Err(TransportError::Closed) => {
                    self.interrupted = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn finish(self) -> Played {
        self.shared.interruptible.store(false, Ordering::SeqCst);
        let outcome = if self.interrupted {
            SpeechOutcome::Interrupted
        } else {
            SpeechOutcome::Completed
        };
        if !self.spoken.is_empty() {
            self.shared.emit(AssistantEvent::SpeechFinished {
                text: self.spoken.join(" "),
                outcome,
            });
        }
        Played {
            outcome,
            heard: self.heard.join(" "),
        }
    }
}

pub struct VoiceAssistant {
    shared: Arc<Shared>,
    room: Mutex<Option<Arc<dyn Room>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Handed to the tasks on start
    failure_tx: Mutex<Option<mpsc::Sender<AgentError>>>,
    failure_rx: tokio::sync::Mutex<mpsc::Receiver<AgentError>>,
}

impl VoiceAssistant {
    pub fn new(components: AssistantComponents, config: AssistantConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (failure_tx, failure_rx) = mpsc::channel(1);

        Self {
            shared: Arc::new(Shared {
                components,
                config,
                events,
                interruptible: AtomicBool::new(false),
                interrupt_epoch: AtomicU64::new(0),
                speech_lock: tokio::sync::Mutex::new(()),
            }),
            room: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            failure_tx: Mutex::new(Some(failure_tx)),
            failure_rx: tokio::sync::Mutex::new(failure_rx),
        }
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.shared.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AssistantEvent> {
        self.shared.events.subscribe()
    }

    pub fn is_started(&self) -> bool {
        self.room.lock().is_some()
    }

    /// Start listening and answering on `room`
    pub fn start(&self, room: Arc<dyn Room>) -> Result<(), AgentError> {
        let mut slot = self.room.lock();
        if slot.is_some() {
            return Err(AgentError::AlreadyStarted);
        }

        let input = room.take_audio_input().ok_or_else(|| {
            AgentError::Core(room_assistant_core::Error::adapter(
                "transport",
                "room audio input already taken",
            ))
        })?;

        let failure_tx = self.failure_tx.lock().take().ok_or(AgentError::AlreadyStarted)?;
        let (utterance_tx, utterance_rx) = mpsc::channel(UTTERANCE_QUEUE);

        let listen = tokio::spawn(report_failure(
            listen_loop(self.shared.clone(), input, utterance_tx),
            failure_tx.clone(),
        ));
        let turns = tokio::spawn(report_failure(
            turn_loop(self.shared.clone(), room.clone(), utterance_rx),
            failure_tx,
        ));
        self.tasks.lock().extend([listen, turns]);

        tracing::info!(
            room = %room.name(),
            vad = self.shared.components.vad.model_info(),
            stt = self.shared.components.stt.model_name(),
            responder = self.shared.components.responder.name(),
            tts = self.shared.components.tts.model_name(),
            "Voice assistant started"
        );
        self.shared.emit(AssistantEvent::Started {
            room: room.name().to_string(),
        });
        *slot = Some(room);
        Ok(())
    }

    /// Speak a fixed utterance and wait for playout to end
    ///
    /// Whatever part of it was heard is added to the responder's memory as
    /// an assistant turn.
    pub async fn say(
        &self,
        text: &str,
        allow_interruptions: bool,
    ) -> Result<SpeechOutcome, AgentError> {
        let room = self.room.lock().clone().ok_or(AgentError::NotStarted)?;
        let Played { outcome, heard } = self
            .shared
            .play(room.as_ref(), [text], allow_interruptions)
            .await?;

        if !heard.is_empty() {
            if let Some(memory) = self.shared.components.responder.chat_memory() {
                memory.put(Message::assistant(heard));
            }
        }
        Ok(outcome)
    }

    /// Resolves with the first error raised by a running task
    ///
    /// Returns `None` once every task has ended without error. Pending
    /// forever before `start`.
    pub async fn failure(&self) -> Option<AgentError> {
        self.failure_rx.lock().await.recv().await
    }

    /// Stop both tasks; in-flight speech is dropped
    pub async fn stop(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }
        self.shared.interruptible.store(false, Ordering::SeqCst);
        self.shared.components.vad.reset();
        self.shared.emit(AssistantEvent::Stopped);
        tracing::info!("Voice assistant stopped");
    }
}

async fn report_failure(
    task: impl std::future::Future<Output = Result<(), AgentError>>,
    failure_tx: mpsc::Sender<AgentError>,
) {
    if let Err(e) = task.await {
        tracing::error!(error = %e, "Voice assistant task failed");
        let _ = failure_tx.try_send(e);
    }
}

/// Feed room audio through the VAD and hand complete utterances on
async fn listen_loop(
    shared: Arc<Shared>,
    mut input: mpsc::Receiver<AudioFrame>,
    utterances: mpsc::Sender<AudioFrame>,
) -> Result<(), AgentError> {
    let vad = shared.components.vad.clone();
    let mut buffered: Vec<AudioFrame> = Vec::new();
    let mut buffered_duration = Duration::ZERO;

    while let Some(frame) = input.recv().await {
        let event = vad.process_frame(&frame)?;
        let state = vad.current_state();

        if state != VADState::Idle || event == VADEvent::SpeechEnd {
            buffered_duration += frame.duration;
            buffered.push(frame);
        } else if !buffered.is_empty() {
            // speech never confirmed
            buffered.clear();
            buffered_duration = Duration::ZERO;
        }

        let forced = buffered_duration >= shared.config.max_utterance;
        match event {
            VADEvent::SpeechStart => {
                shared.emit(AssistantEvent::UserSpeechStarted);
                if shared.interruptible.load(Ordering::SeqCst) {
                    shared.interrupt_epoch.fetch_add(1, Ordering::SeqCst);
                    tracing::debug!("User speech interrupted playout");
                }
            }
            VADEvent::SpeechEnd => {}
            _ if forced => vad.reset(),
            _ => continue,
        }

        if event == VADEvent::SpeechEnd || forced {
            let Some(utterance) = AudioFrame::concat(&buffered) else {
                continue;
            };
            buffered.clear();
            buffered_duration = Duration::ZERO;

            shared.emit(AssistantEvent::UserSpeechEnded {
                duration_ms: utterance.duration.as_millis() as u64,
            });
            if utterances.send(utterance).await.is_err() {
                break;
            }
        }
    }

    tracing::debug!("Room audio input closed");
    Ok(())
}

/// Transcribe each utterance, get a reply and speak it
async fn turn_loop(
    shared: Arc<Shared>,
    room: Arc<dyn Room>,
    mut utterances: mpsc::Receiver<AudioFrame>,
) -> Result<(), AgentError> {
    while let Some(utterance) = utterances.recv().await {
        let audio = utterance.to_mono().resample(STT_SAMPLE_RATE);
        let transcript = shared.components.stt.transcribe(&audio).await?;
        if transcript.is_empty() {
            tracing::debug!("Empty transcript, ignoring utterance");
            continue;
        }

        tracing::info!(text = %transcript.text, confidence = transcript.confidence, "User said");
        shared.emit(AssistantEvent::Transcript {
            text: transcript.text.clone(),
        });

        let reply = if shared.config.stream_responses {
            stream_reply(&shared, room.as_ref(), &transcript.text).await?
        } else {
            let reply = shared.components.responder.respond(&transcript.text).await?;
            let played = shared
                .play(
                    room.as_ref(),
                    split_sentences(&reply),
                    shared.config.allow_interruptions,
                )
                .await?;
            shared.settle_reply(&played);
            reply
        };

        tracing::info!(text = %reply, "Assistant replied");
        shared.emit(AssistantEvent::Reply { text: reply });
    }
    Ok(())
}

/// Speak reply sentences as they stream in
async fn stream_reply(
    shared: &Shared,
    room: &dyn Room,
    user_text: &str,
) -> Result<String, AgentError> {
    let (tx, mut rx) = mpsc::channel(DELTA_QUEUE);
    let responder = shared.components.responder.clone();
    let text = user_text.to_string();
    let generation = tokio::spawn(async move { responder.respond_stream(&text, tx).await });

    let _guard = shared.speech_lock.lock().await;
    let mut playout = Playout::begin(shared, room, shared.config.allow_interruptions);
    let mut chunker = SentenceChunker::default();

    let spoken = async {
        while let Some(delta) = rx.recv().await {
            for sentence in chunker.push(&delta) {
                playout.speak(&sentence).await?;
            }
        }
        if let Some(rest) = chunker.flush() {
            playout.speak(&rest).await?;
        }
        Ok::<_, AgentError>(())
    }
    .await;
    let played = playout.finish();
    if let Err(e) = spoken {
        // nobody will speak the rest; keep the turn out of memory
        generation.abort();
        return Err(e);
    }

    let reply = generation
        .await
        .map_err(|e| AgentError::Task(format!("response generation: {}", e)))??;
    shared.settle_reply(&played);
    Ok(reply)
}
