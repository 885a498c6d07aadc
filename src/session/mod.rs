//! Live voice-bridge sessions.
//!
//! A `VoiceSession` owns one full pipeline as a unit: microphone capture,
//! PCM encoding, the bidirectional Gemini Live socket, inbound event
//! demultiplexing, gapless playback and the conversation state machine.
//! Startup acquires resources in order (microphone, speaker, transport)
//! and rolls back whatever was already opened if a later step fails;
//! teardown is idempotent and also runs on drop.

mod capture;
mod codec;
mod events;
mod playback;
mod state;
mod transport;
mod wav;

pub use capture::{FRAME_SAMPLES, INPUT_SAMPLE_RATE};
pub use events::LiveEvent;
pub use playback::OUTPUT_SAMPLE_RATE;
pub use state::{Role, Status, TranscriptTurn};
pub use transport::LIVE_MODEL;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    mpsc, Arc, Mutex,
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::SessionError;
use events::{parse_error, parse_server_message};
use state::ConversationState;
use wav::SessionRecorder;

/// How often queued capture frames are flushed to the transport.
const SEND_INTERVAL: Duration = Duration::from_millis(100);

/// Everything needed to open one session.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub api_key: String,
    /// Source language (ISO 639-1).
    pub source_lang: String,
    /// Target language (ISO 639-1).
    pub target_lang: String,
    pub voice_name: String,
    /// Directory for a WAV recording of model audio, if wanted.
    pub record_dir: Option<PathBuf>,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_key: crate::config::resolve_api_key(config),
            source_lang: config.source_lang.clone(),
            target_lang: config.target_lang.clone(),
            voice_name: config.voice_name.clone(),
            record_dir: None,
        }
    }
}

/// One live voice-bridge session. At most one is active per instance;
/// calling `start` while live is a no-op.
pub struct VoiceSession {
    options: SessionOptions,
    /// Liveness flag checked by every capture/send path. Cleared before
    /// teardown so stale callbacks from a dying session do nothing.
    active: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    conversation: Arc<Mutex<ConversationState>>,
    playback: Arc<Mutex<playback::PlaybackQueue>>,
    frames: Arc<Mutex<VecDeque<Vec<f32>>>>,
    input_rms: Arc<AtomicU32>,
    last_error: Arc<Mutex<Option<SessionError>>>,
    worker: Option<JoinHandle<()>>,
}

impl VoiceSession {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            active: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            conversation: Arc::new(Mutex::new(ConversationState::new())),
            playback: Arc::new(Mutex::new(playback::PlaybackQueue::new())),
            frames: Arc::new(Mutex::new(VecDeque::new())),
            input_rms: Arc::new(AtomicU32::new(0)),
            last_error: Arc::new(Mutex::new(None)),
            worker: None,
        }
    }

    /// Start the session. Blocks until the pipeline is live (microphone
    /// acquired, speaker open, transport handshake acknowledged) or a
    /// startup step has failed and everything opened so far was released.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if let Some(handle) = &self.worker {
            if !handle.is_finished() {
                return Ok(());
            }
            // Previous session already ended on its own; reap it.
            if let Some(handle) = self.worker.take() {
                let _ = handle.join();
            }
        }

        self.stop.store(false, Ordering::SeqCst);
        if let Ok(mut queue) = self.frames.lock() {
            queue.clear();
        }
        if let Ok(mut playback) = self.playback.lock() {
            playback.reset();
        }
        if let Ok(mut conversation) = self.conversation.lock() {
            *conversation = ConversationState::new();
        }
        if let Ok(mut error) = self.last_error.lock() {
            *error = None;
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let worker = SessionWorker {
            options: self.options.clone(),
            active: self.active.clone(),
            stop: self.stop.clone(),
            conversation: self.conversation.clone(),
            playback: self.playback.clone(),
            frames: self.frames.clone(),
            input_rms: self.input_rms.clone(),
            last_error: self.last_error.clone(),
        };
        let handle = std::thread::spawn(move || worker.run(ready_tx));

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(SessionError::TransportOpen(
                    "Session worker exited before reporting readiness".to_string(),
                ))
            }
        }
    }

    /// Stop the session and release every acquired resource. Safe to call
    /// repeatedly and on a session that was never started.
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        // Reset session-scoped state even if no worker ever ran.
        if let Ok(mut conversation) = self.conversation.lock() {
            conversation.session_closed();
        }
        if let Ok(mut playback) = self.playback.lock() {
            playback.reset();
        }
        if let Ok(mut queue) = self.frames.lock() {
            queue.clear();
        }
        self.input_rms.store(0, Ordering::Relaxed);
    }

    /// True while the worker thread is running.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn status(&self) -> Status {
        self.conversation
            .lock()
            .map(|c| c.status())
            .unwrap_or(Status::Idle)
    }

    /// Snapshot of the transcript log so far.
    pub fn transcript(&self) -> Vec<TranscriptTurn> {
        self.conversation
            .lock()
            .map(|c| c.transcript().to_vec())
            .unwrap_or_default()
    }

    /// Current microphone RMS level in [0, 1], for volume display.
    pub fn input_level(&self) -> f32 {
        f32::from_bits(self.input_rms.load(Ordering::Relaxed))
    }

    /// The error that ended the session, if it ended abnormally.
    pub fn take_error(&self) -> Option<SessionError> {
        self.last_error.lock().ok().and_then(|mut e| e.take())
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker-side clone of the session's shared state.
struct SessionWorker {
    options: SessionOptions,
    active: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    conversation: Arc<Mutex<ConversationState>>,
    playback: Arc<Mutex<playback::PlaybackQueue>>,
    frames: Arc<Mutex<VecDeque<Vec<f32>>>>,
    input_rms: Arc<AtomicU32>,
    last_error: Arc<Mutex<Option<SessionError>>>,
}

impl SessionWorker {
    fn run(self, ready_tx: mpsc::Sender<Result<(), SessionError>>) {
        // Acquire in order: microphone, speaker, transport. The cpal
        // streams are plain locals so any early return drops (releases)
        // whatever was already open.
        let setup = (|| {
            let input_stream = capture::start_capture(
                self.frames.clone(),
                self.active.clone(),
                self.input_rms.clone(),
            )?;
            let output_stream = playback::open_output(self.playback.clone())?;

            if self.options.api_key.trim().is_empty() {
                return Err(SessionError::TransportOpen(
                    "Missing Gemini API key (set GEMINI_API_KEY or the config file)".to_string(),
                ));
            }
            let mut socket = transport::connect_websocket(&self.options.api_key)
                .map_err(|e| SessionError::TransportOpen(e.to_string()))?;
            let instruction =
                transport::build_instruction(&self.options.source_lang, &self.options.target_lang);
            transport::send_setup_message(&mut socket, &instruction, &self.options.voice_name)
                .map_err(|e| SessionError::TransportOpen(e.to_string()))?;
            transport::wait_for_setup(&mut socket)
                .map_err(|e| SessionError::TransportOpen(e.to_string()))?;
            transport::set_socket_nonblocking(&mut socket)
                .map_err(|e| SessionError::TransportOpen(e.to_string()))?;

            Ok((input_stream, output_stream, socket))
        })();

        let (_input_stream, _output_stream, mut socket) = match setup {
            Ok(streams) => streams,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        self.active.store(true, Ordering::SeqCst);
        if let Ok(mut conversation) = self.conversation.lock() {
            conversation.session_opened();
        }
        let _ = ready_tx.send(Ok(()));

        let mut recorder = self.options.record_dir.as_deref().and_then(|dir| {
            match SessionRecorder::create(dir) {
                Ok(recorder) => {
                    println!("[Session] Recording model audio to {}", recorder.path().display());
                    Some(recorder)
                }
                Err(e) => {
                    eprintln!("[Session] Failed to create recording: {}", e);
                    None
                }
            }
        });

        let mut last_send = Instant::now();
        let mut runtime_error: Option<SessionError> = None;

        while !self.stop.load(Ordering::Relaxed) {
            // Flush queued capture frames. The active flag gates every
            // send so nothing goes out once teardown has begun.
            if last_send.elapsed() >= SEND_INTERVAL {
                let pending: Vec<Vec<f32>> = match self.frames.lock() {
                    Ok(mut queue) => queue.drain(..).collect(),
                    Err(_) => Vec::new(),
                };
                for frame in pending {
                    if !self.active.load(Ordering::Relaxed) {
                        break;
                    }
                    let payload = codec::encode_pcm(&frame);
                    if let Err(e) = transport::send_audio_frame(&mut socket, &payload) {
                        runtime_error = Some(SessionError::TransportRuntime(e.to_string()));
                        break;
                    }
                }
                last_send = Instant::now();
            }
            if runtime_error.is_some() {
                break;
            }

            match socket.read() {
                Ok(tungstenite::Message::Text(msg)) => {
                    if let Some(e) = self.handle_message(msg.as_str(), &mut recorder) {
                        runtime_error = Some(e);
                        break;
                    }
                }
                Ok(tungstenite::Message::Binary(data)) => {
                    if let Ok(text) = String::from_utf8(data.to_vec()) {
                        if let Some(e) = self.handle_message(&text, &mut recorder) {
                            runtime_error = Some(e);
                            break;
                        }
                    }
                }
                Ok(tungstenite::Message::Close(_)) => {
                    // Server-initiated close: clean end, no error.
                    break;
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    runtime_error = Some(SessionError::TransportRuntime(e.to_string()));
                    break;
                }
            }

            std::thread::sleep(Duration::from_millis(5));
        }

        // Teardown, on every exit path: suppress callbacks first, then
        // release transport and devices, then reset session state.
        self.active.store(false, Ordering::SeqCst);
        let _ = socket.close(None);
        drop(_input_stream);
        drop(_output_stream);
        if let Some(recorder) = recorder.take() {
            if let Err(e) = recorder.finalize() {
                eprintln!("[Session] Failed to finalize recording: {}", e);
            }
        }
        if let Ok(mut conversation) = self.conversation.lock() {
            conversation.session_closed();
        }
        if let Ok(mut playback) = self.playback.lock() {
            playback.reset();
        }
        if let Ok(mut queue) = self.frames.lock() {
            queue.clear();
        }
        self.input_rms.store(0, Ordering::Relaxed);

        if let Some(e) = runtime_error {
            eprintln!("[Session] {}", e);
            if let Ok(mut slot) = self.last_error.lock() {
                *slot = Some(e);
            }
        }
    }

    /// Demultiplex one inbound frame into playback, recording and the
    /// state machine. Returns an error only for server error frames.
    fn handle_message(
        &self,
        msg: &str,
        recorder: &mut Option<SessionRecorder>,
    ) -> Option<SessionError> {
        if let Some(error) = parse_error(msg) {
            return Some(SessionError::TransportRuntime(error));
        }

        for event in parse_server_message(msg) {
            match &event {
                LiveEvent::Audio(bytes) => {
                    if let Some(recorder) = recorder.as_mut() {
                        if let Err(e) = recorder.write_pcm(bytes) {
                            eprintln!("[Session] Recording write failed: {}", e);
                        }
                    }
                    let samples = codec::bytes_to_samples(bytes);
                    if let Ok(mut playback) = self.playback.lock() {
                        playback.schedule(samples);
                    }
                }
                LiveEvent::Interrupted => {
                    if let Ok(mut playback) = self.playback.lock() {
                        playback.interrupt();
                    }
                }
                _ => {}
            }
            if let Ok(mut conversation) = self.conversation.lock() {
                conversation.ingest(&event);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> SessionOptions {
        SessionOptions {
            api_key: String::new(),
            source_lang: "en".to_string(),
            target_lang: "es".to_string(),
            voice_name: "Aoede".to_string(),
            record_dir: None,
        }
    }

    #[test]
    fn stop_before_start_is_a_noop() {
        let mut session = VoiceSession::new(options());
        session.stop();
        session.stop();
        assert_eq!(session.status(), Status::Idle);
        assert!(!session.is_running());
        assert!(session.transcript().is_empty());
        assert!(session.take_error().is_none());
    }

    #[test]
    fn options_inherit_config_defaults() {
        let config = Config::default();
        let options = SessionOptions::from_config(&config);
        assert_eq!(options.source_lang, "en");
        assert_eq!(options.target_lang, "es");
        assert_eq!(options.voice_name, "Aoede");
        assert!(options.record_dir.is_none());
    }

    // Inbound "Hola" exchange end to end through demux and state machine.
    #[test]
    fn hola_turn_reaches_the_transcript() {
        let mut conversation = ConversationState::new();
        conversation.session_opened();

        let delta = serde_json::json!({
            "serverContent": { "outputTranscription": { "text": "Hola" } }
        })
        .to_string();
        for event in parse_server_message(&delta) {
            conversation.ingest(&event);
        }
        assert_eq!(conversation.status(), Status::Speaking);

        let complete = serde_json::json!({
            "serverContent": { "turnComplete": true }
        })
        .to_string();
        for event in parse_server_message(&complete) {
            conversation.ingest(&event);
        }
        assert_eq!(conversation.status(), Status::Listening);
        assert_eq!(
            conversation.transcript(),
            &[TranscriptTurn {
                role: Role::Model,
                text: "Hola".to_string()
            }]
        );
    }
}
