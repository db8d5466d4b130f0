//! Test doubles for the collaborator contracts, shared by the server
//! integration tests.

#![allow(dead_code)]

use parley_server::AppState;
use parley_turn::TurnConfig;
use parley_voice::{
    GenerationEvent, Generator, Recognizer, RecognizerEvent, RecognizerFactory, SynthesisEvent,
    Synthesizer, SynthesizerFactory, VoiceError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct ScriptedRecognizer {
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<AtomicBool>,
}

impl Recognizer for ScriptedRecognizer {
    fn write(&self, pcm: &[u8]) {
        self.written.lock().unwrap().push(pcm.to_vec());
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Recognizer factory that records written audio and exposes a tap the test
/// can use to inject transcripts.
#[derive(Clone, Default)]
pub struct ScriptedRecognizerFactory {
    pub written: Arc<Mutex<Vec<Vec<u8>>>>,
    pub closed: Arc<AtomicBool>,
    tap: Arc<Mutex<Option<mpsc::Sender<RecognizerEvent>>>>,
}

impl RecognizerFactory for ScriptedRecognizerFactory {
    fn open(&self) -> Result<(Box<dyn Recognizer>, mpsc::Receiver<RecognizerEvent>), VoiceError> {
        let (tx, rx) = mpsc::channel(64);
        *self.tap.lock().unwrap() = Some(tx);
        Ok((
            Box::new(ScriptedRecognizer {
                written: self.written.clone(),
                closed: self.closed.clone(),
            }),
            rx,
        ))
    }
}

impl ScriptedRecognizerFactory {
    /// Injects a transcript, waiting briefly for the stream to be opened by
    /// the connection handler.
    pub async fn emit(&self, event: RecognizerEvent) {
        let tx = wait_for_tap(&self.tap).await;
        tx.send(event).await.expect("recognizer forwarder gone");
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }
}

pub struct RecordingSynthesizer {
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl Synthesizer for RecordingSynthesizer {
    fn send_text(&self, text: &str) {
        self.sent.lock().unwrap().push(text.to_string());
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Synthesizer factory that records sent text and exposes a tap the test can
/// use to emit audio back through the session.
#[derive(Clone, Default)]
pub struct RecordingSynthesizerFactory {
    pub sent: Arc<Mutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
    tap: Arc<Mutex<Option<mpsc::Sender<SynthesisEvent>>>>,
}

impl SynthesizerFactory for RecordingSynthesizerFactory {
    fn open(&self) -> Result<(Box<dyn Synthesizer>, mpsc::Receiver<SynthesisEvent>), VoiceError> {
        let (tx, rx) = mpsc::channel(64);
        *self.tap.lock().unwrap() = Some(tx);
        self.closed.store(false, Ordering::SeqCst);
        Ok((
            Box::new(RecordingSynthesizer {
                sent: self.sent.clone(),
                closed: self.closed.clone(),
            }),
            rx,
        ))
    }
}

impl RecordingSynthesizerFactory {
    /// Emits a synthesis event, waiting briefly for a stream to be opened by
    /// a starting turn.
    pub async fn emit(&self, event: SynthesisEvent) {
        let tx = wait_for_tap(&self.tap).await;
        tx.send(event).await.expect("synthesis forwarder gone");
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

/// Polls a tap slot until the stream under test has been opened.
async fn wait_for_tap<T: Clone>(tap: &Arc<Mutex<Option<mpsc::Sender<T>>>>) -> mpsc::Sender<T> {
    for _ in 0..400 {
        if let Some(tx) = tap.lock().unwrap().clone() {
            return tx;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("stream was never opened");
}

/// Generator replaying one scripted event list per invocation.
#[derive(Clone, Default)]
pub struct ScriptedGenerator {
    script: Arc<Mutex<VecDeque<Vec<GenerationEvent>>>>,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedGenerator {
    pub fn push_script(&self, events: Vec<GenerationEvent>) {
        self.script.lock().unwrap().push_back(events);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Generator for ScriptedGenerator {
    fn start(&self, prompt: &str, _cancel: CancellationToken) -> mpsc::Receiver<GenerationEvent> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let (tx, rx) = mpsc::channel(64);
        let events = self.script.lock().unwrap().pop_front().unwrap_or_default();
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        rx
    }
}

/// Bundle of scripted collaborators plus the [`AppState`] wired to them.
pub struct TestBackend {
    pub recognizer: ScriptedRecognizerFactory,
    pub synthesizer: RecordingSynthesizerFactory,
    pub generator: ScriptedGenerator,
    pub state: Arc<AppState>,
}

impl TestBackend {
    /// Builds a backend with short timing so integration tests run fast.
    pub fn new() -> Self {
        let recognizer = ScriptedRecognizerFactory::default();
        let synthesizer = RecordingSynthesizerFactory::default();
        let generator = ScriptedGenerator::default();
        let turn_config = TurnConfig {
            quiet_interval_ms: 50,
            flush_debounce_ms: 10,
            settle_delay_ms: 30,
            ..TurnConfig::default()
        };
        let state = Arc::new(AppState {
            turn_config,
            recognizer_factory: Arc::new(recognizer.clone()),
            synthesizer_factory: Arc::new(synthesizer.clone()),
            generator: Arc::new(generator.clone()),
        });
        Self {
            recognizer,
            synthesizer,
            generator,
            state,
        }
    }
}
