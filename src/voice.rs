//! Voice typing: a recognizer capability and the mic control state machine
//! in front of it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::capability::Capability;
use crate::config::VoiceConfig;
use crate::error::ChatError;

pub const MIC_IDLE_LABEL: &str = "🎤";
pub const MIC_LISTENING_LABEL: &str = "🎙️ Listening...";

/// Error codes as reported by the Web Speech API, so messages read the same
/// across hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorCode {
    NoSpeech,
    Aborted,
    AudioCapture,
    Network,
    NotAllowed,
    ServiceNotAllowed,
    BadGrammar,
    LanguageNotSupported,
    Other(String),
}

impl RecognitionErrorCode {
    pub fn parse(code: &str) -> Self {
        match code.trim() {
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            "audio-capture" => Self::AudioCapture,
            "network" => Self::Network,
            "not-allowed" => Self::NotAllowed,
            "service-not-allowed" => Self::ServiceNotAllowed,
            "bad-grammar" => Self::BadGrammar,
            "language-not-supported" => Self::LanguageNotSupported,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for RecognitionErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSpeech => write!(f, "no-speech"),
            Self::Aborted => write!(f, "aborted"),
            Self::AudioCapture => write!(f, "audio-capture"),
            Self::Network => write!(f, "network"),
            Self::NotAllowed => write!(f, "not-allowed"),
            Self::ServiceNotAllowed => write!(f, "service-not-allowed"),
            Self::BadGrammar => write!(f, "bad-grammar"),
            Self::LanguageNotSupported => write!(f, "language-not-supported"),
            Self::Other(code) => write!(f, "{}", code),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// Final transcript of the single best alternative.
    Result(String),
    Error(RecognitionErrorCode),
    /// Capture finished; always the last event of a session.
    End,
}

pub type RecognitionSink = Box<dyn Fn(RecognitionEvent) + Send + Sync + 'static>;

pub trait SpeechRecognizer {
    /// Begin one capture session in `lang`. Events are delivered through
    /// `sink` and finish with [`RecognitionEvent::End`].
    fn start(&mut self, lang: &str, sink: RecognitionSink) -> Result<(), ChatError>;
}

/// Runs an external command that records one utterance and prints the
/// transcript on stdout. A failing command may print a Web Speech error code
/// as its last stderr line.
pub struct CommandRecognizer {
    command: Vec<String>,
    busy: Arc<AtomicBool>,
}

impl CommandRecognizer {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn detect(config: &VoiceConfig) -> Capability<Box<dyn SpeechRecognizer>> {
        let Some(program) = config.command.first() else {
            debug!("No voice command configured");
            return Capability::Unavailable;
        };
        if which::which(program).is_err() {
            warn!("Voice command {:?} not found on PATH", program);
            return Capability::Unavailable;
        }
        info!("Voice typing via {}", program);
        Capability::Available(Box::new(Self::new(config.command.clone())))
    }

    fn argv(&self, lang: &str) -> Vec<String> {
        self.command.iter().map(|a| a.replace("{lang}", lang)).collect()
    }
}

/// Turn a finished recognizer process into the event it stands for.
pub fn interpret_output(success: bool, stdout: &str, stderr: &str, exit_code: Option<i32>) -> RecognitionEvent {
    if success {
        return match stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
            Some(transcript) => RecognitionEvent::Result(transcript.to_string()),
            None => RecognitionEvent::Error(RecognitionErrorCode::NoSpeech),
        };
    }

    let code = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .map(RecognitionErrorCode::parse);

    match code {
        Some(RecognitionErrorCode::Other(_)) | None => RecognitionEvent::Error(
            RecognitionErrorCode::Other(match exit_code {
                Some(c) => format!("exit-{}", c),
                None => "terminated".to_string(),
            }),
        ),
        Some(code) => RecognitionEvent::Error(code),
    }
}

impl SpeechRecognizer for CommandRecognizer {
    fn start(&mut self, lang: &str, sink: RecognitionSink) -> Result<(), ChatError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(ChatError::Recognition("recognition has already started".to_string()));
        }

        let argv = self.argv(lang);
        let busy = self.busy.clone();
        debug!("Starting recognizer {:?}", argv);

        tokio::spawn(async move {
            let event = match Command::new(&argv[0]).args(&argv[1..]).output().await {
                Ok(output) => interpret_output(
                    output.status.success(),
                    &String::from_utf8_lossy(&output.stdout),
                    &String::from_utf8_lossy(&output.stderr),
                    output.status.code(),
                ),
                Err(e) => {
                    error!("Failed to run recognizer: {}", e);
                    RecognitionEvent::Error(RecognitionErrorCode::AudioCapture)
                }
            };
            busy.store(false, Ordering::SeqCst);
            sink(event);
            sink(RecognitionEvent::End);
        });

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Listening,
    /// An error was shown and the mic is usable again; the capture's end
    /// signal may still be on its way.
    Erroring,
}

/// Identifies one capture started by [`VoiceInput::press`]. Events from an
/// earlier capture are ignored once a newer one has started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureId(u64);

/// Receives recognition events tagged with the capture they belong to.
pub type CaptureSink = Box<dyn Fn(CaptureId, RecognitionEvent) + Send + Sync + 'static>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicControl {
    pub visible: bool,
    pub label: &'static str,
    pub enabled: bool,
}

/// What the session has to do after a recognition event.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceOutcome {
    Nothing,
    Submit(String),
    ShowError(String),
}

pub struct VoiceInput {
    recognizer: Capability<Box<dyn SpeechRecognizer>>,
    state: VoiceState,
    next_capture: u64,
    capture: Option<CaptureId>,
}

impl VoiceInput {
    pub fn new(recognizer: Capability<Box<dyn SpeechRecognizer>>) -> Self {
        Self {
            recognizer,
            state: VoiceState::Idle,
            next_capture: 0,
            capture: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.recognizer.is_available()
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    /// The capture whose events are currently accepted.
    pub fn current_capture(&self) -> Option<CaptureId> {
        self.capture
    }

    pub fn mic(&self) -> MicControl {
        MicControl {
            visible: self.is_available(),
            label: if self.state == VoiceState::Listening {
                MIC_LISTENING_LABEL
            } else {
                MIC_IDLE_LABEL
            },
            enabled: self.state != VoiceState::Listening,
        }
    }

    /// Mic press. Returns whether capture started.
    pub fn press(&mut self, lang: &str, sink: CaptureSink) -> bool {
        if self.state == VoiceState::Listening {
            debug!("Mic pressed while listening, ignoring");
            return false;
        }
        let Some(recognizer) = self.recognizer.as_mut() else {
            return false;
        };

        self.next_capture += 1;
        let capture = CaptureId(self.next_capture);
        let tagged: RecognitionSink = Box::new(move |event| sink(capture, event));

        let lang = if lang.is_empty() { "en-US" } else { lang };
        match recognizer.start(lang, tagged) {
            Ok(()) => {
                info!("Listening ({})", lang);
                self.state = VoiceState::Listening;
                self.capture = Some(capture);
                true
            }
            Err(e) => {
                error!("Recognition start error: {}", e);
                false
            }
        }
    }

    pub fn on_event(&mut self, capture: CaptureId, event: RecognitionEvent) -> VoiceOutcome {
        if self.capture != Some(capture) {
            debug!("Dropping {:?} from stale capture {:?}", event, capture);
            return VoiceOutcome::Nothing;
        }

        match event {
            RecognitionEvent::Result(transcript) => {
                if self.state != VoiceState::Listening {
                    debug!("Dropping transcript after an error");
                    return VoiceOutcome::Nothing;
                }
                VoiceOutcome::Submit(transcript)
            }
            RecognitionEvent::Error(code) => {
                error!("Voice recognition error: {}", code);
                self.state = VoiceState::Erroring;
                VoiceOutcome::ShowError(format!("⚠️ Voice recognition error: {}", code))
            }
            RecognitionEvent::End => {
                self.state = VoiceState::Idle;
                self.capture = None;
                VoiceOutcome::Nothing
            }
        }
    }
}
