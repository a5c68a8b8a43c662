use std::io::Write;
use std::process::{Child, Command, Stdio};
use tracing::{debug, info, warn};

use crate::capability::Capability;
use crate::config::SpeechConfig;
use crate::error::ChatError;
use crate::prefs::Preferences;

/// Text plus the voice settings it is spoken with.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
    pub rate: f64,
    pub pitch: f64,
}

impl Utterance {
    /// Empty language and zero or non-finite rate/pitch fall back to
    /// `en-US` and `1.0`.
    pub fn new(text: &str, prefs: &Preferences) -> Self {
        let or_one = |v: f64| if v.is_finite() && v != 0.0 { v } else { 1.0 };
        Self {
            text: text.to_string(),
            lang: if prefs.lang.is_empty() {
                "en-US".to_string()
            } else {
                prefs.lang.clone()
            },
            rate: or_one(prefs.rate),
            pitch: or_one(prefs.pitch),
        }
    }
}

pub trait SpeechSynthesizer {
    /// Stop whatever is being spoken.
    fn cancel(&mut self) -> Result<(), ChatError>;
    /// Start speaking without waiting for playback to finish.
    fn speak(&mut self, utterance: &Utterance) -> Result<(), ChatError>;
    /// Block until the current utterance has been handed off or played.
    fn wait(&mut self) -> Result<(), ChatError> {
        Ok(())
    }
}

/// Text-to-speech front end: at most one utterance plays, the newest wins.
pub struct SpeechOutput {
    synth: Capability<Box<dyn SpeechSynthesizer>>,
}

impl SpeechOutput {
    pub fn new(synth: Capability<Box<dyn SpeechSynthesizer>>) -> Self {
        Self { synth }
    }

    pub fn unavailable() -> Self {
        Self::new(Capability::Unavailable)
    }

    pub fn is_available(&self) -> bool {
        self.synth.is_available()
    }

    /// Speak `text` with the current preferences. Returns whether synthesis
    /// was started.
    pub fn speak(&mut self, text: &str, prefs: &Preferences) -> bool {
        if !prefs.tts_enabled {
            return false;
        }
        let Some(synth) = self.synth.as_mut() else {
            return false;
        };

        if let Err(e) = synth.cancel() {
            debug!("Speech cancel failed: {}", e);
        }

        let utterance = Utterance::new(text, prefs);
        match synth.speak(&utterance) {
            Ok(()) => true,
            Err(e) => {
                warn!("Speech synthesis failed: {}", e);
                false
            }
        }
    }

    pub fn cancel(&mut self) {
        if let Some(synth) = self.synth.as_mut() {
            if let Err(e) = synth.cancel() {
                debug!("Speech cancel failed: {}", e);
            }
        }
    }

    /// Let the last utterance finish before the process exits.
    pub fn wait(&mut self) {
        if let Some(synth) = self.synth.as_mut() {
            if let Err(e) = synth.wait() {
                warn!("Waiting for speech failed: {}", e);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthProgram {
    /// speech-dispatcher client; playback is owned by the daemon.
    SpdSay,
    /// espeak-ng or espeak, one process per utterance.
    Espeak(String),
    /// Any other program, called as `<program> <text>`.
    Custom(String),
}

impl SynthProgram {
    fn from_name(name: &str) -> Self {
        match name {
            "spd-say" => SynthProgram::SpdSay,
            "espeak-ng" | "espeak" => SynthProgram::Espeak(name.to_string()),
            other => SynthProgram::Custom(other.to_string()),
        }
    }

    fn program(&self) -> &str {
        match self {
            SynthProgram::SpdSay => "spd-say",
            SynthProgram::Espeak(p) | SynthProgram::Custom(p) => p,
        }
    }

    /// Arguments for one utterance. espeak reads the text from stdin.
    pub fn args(&self, utterance: &Utterance) -> Vec<String> {
        match self {
            SynthProgram::SpdSay => vec![
                "-l".to_string(),
                primary_subtag(&utterance.lang),
                "-r".to_string(),
                scale_to_percent(utterance.rate, 50.0).to_string(),
                "-p".to_string(),
                scale_to_percent(utterance.pitch, 100.0).to_string(),
                "--".to_string(),
                utterance.text.clone(),
            ],
            SynthProgram::Espeak(_) => {
                let wpm = (175.0 * utterance.rate).round().clamp(80.0, 450.0) as i64;
                let pitch = (50.0 * utterance.pitch).round().clamp(0.0, 99.0) as i64;
                vec![
                    "-v".to_string(),
                    utterance.lang.to_lowercase(),
                    "-s".to_string(),
                    wpm.to_string(),
                    "-p".to_string(),
                    pitch.to_string(),
                    "--stdin".to_string(),
                ]
            }
            SynthProgram::Custom(_) => vec![utterance.text.clone()],
        }
    }
}

/// `1.0` maps to 0, clamped to speech-dispatcher's -100..=100.
fn scale_to_percent(value: f64, per_unit: f64) -> i64 {
    ((value - 1.0) * per_unit).round().clamp(-100.0, 100.0) as i64
}

fn primary_subtag(lang: &str) -> String {
    lang.split('-').next().unwrap_or(lang).to_lowercase()
}

/// Speaks by running an external speech program.
pub struct CommandSynthesizer {
    program: SynthProgram,
    child: Option<Child>,
}

impl CommandSynthesizer {
    pub fn new(program: SynthProgram) -> Self {
        Self {
            program,
            child: None,
        }
    }

    /// Resolve the configured synthesizer. "none" and missing programs are
    /// reported as unavailable.
    pub fn detect(config: &SpeechConfig) -> Capability<Box<dyn SpeechSynthesizer>> {
        let name = config.synthesizer.trim();
        let found = match name {
            "none" => None,
            "auto" => ["spd-say", "espeak-ng", "espeak"]
                .into_iter()
                .find(|p| which::which(p).is_ok()),
            other if which::which(other).is_ok() => Some(other),
            other => {
                warn!("Configured synthesizer {:?} not found on PATH", other);
                None
            }
        };

        match found {
            Some(program) => {
                info!("Text-to-speech via {}", program);
                Capability::Available(Box::new(Self::new(SynthProgram::from_name(program))))
            }
            None => {
                debug!("No speech synthesizer available");
                Capability::Unavailable
            }
        }
    }

    fn reap(&mut self) -> Result<(), ChatError> {
        if let Some(mut child) = self.child.take() {
            if child.try_wait()?.is_none() {
                child.kill()?;
            }
            child.wait()?;
        }
        Ok(())
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn cancel(&mut self) -> Result<(), ChatError> {
        self.reap()?;
        if self.program == SynthProgram::SpdSay {
            let status = Command::new("spd-say")
                .arg("--cancel")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()?;
            if !status.success() {
                return Err(ChatError::Speech("spd-say --cancel failed".to_string()));
            }
        }
        Ok(())
    }

    fn speak(&mut self, utterance: &Utterance) -> Result<(), ChatError> {
        let reads_stdin = matches!(self.program, SynthProgram::Espeak(_));

        let mut child = Command::new(self.program.program())
            .args(self.program.args(utterance))
            .stdin(if reads_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                ChatError::Speech(format!("failed to run {}: {}", self.program.program(), e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(utterance.text.as_bytes())
                .map_err(|e| ChatError::Speech(format!("failed to pass text: {}", e)))?;
        }

        debug!("Speaking {} characters in {}", utterance.text.len(), utterance.lang);
        self.child = Some(child);
        Ok(())
    }

    fn wait(&mut self) -> Result<(), ChatError> {
        if let Some(mut child) = self.child.take() {
            child.wait()?;
        }
        Ok(())
    }
}

impl Drop for CommandSynthesizer {
    fn drop(&mut self) {
        self.reap().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSynthesizer;

    fn utterance(lang: &str, rate: f64, pitch: f64) -> Utterance {
        Utterance {
            text: "hello".to_string(),
            lang: lang.to_string(),
            rate,
            pitch,
        }
    }

    #[test]
    fn test_utterance_fallbacks() {
        let prefs = Preferences {
            tts_enabled: true,
            lang: String::new(),
            rate: 0.0,
            pitch: f64::NAN,
        };
        let u = Utterance::new("hi", &prefs);
        assert_eq!(u.lang, "en-US");
        assert_eq!(u.rate, 1.0);
        assert_eq!(u.pitch, 1.0);
    }

    #[test]
    fn test_utterance_keeps_valid_values() {
        let prefs = Preferences {
            tts_enabled: true,
            lang: "fr-FR".to_string(),
            rate: 1.5,
            pitch: 0.5,
        };
        let u = Utterance::new("hello", &prefs);
        assert_eq!(u, utterance("fr-FR", 1.5, 0.5));
    }

    #[test]
    fn test_speak_disabled_is_noop() {
        let synth = RecordingSynthesizer::new();
        let log = synth.log();
        let mut output = SpeechOutput::new(Capability::Available(Box::new(synth)));

        let prefs = Preferences {
            tts_enabled: false,
            ..Preferences::default()
        };
        assert!(!output.speak("hello", &prefs));
        assert!(log.spoken().is_empty());
        assert_eq!(log.cancels(), 0);
    }

    #[test]
    fn test_speak_unavailable_is_noop() {
        let mut output = SpeechOutput::unavailable();
        assert!(!output.is_available());
        assert!(!output.speak("hello", &Preferences::default()));
    }

    #[test]
    fn test_speak_cancels_before_each_utterance() {
        let synth = RecordingSynthesizer::new();
        let log = synth.log();
        let mut output = SpeechOutput::new(Capability::Available(Box::new(synth)));

        assert!(output.speak("first", &Preferences::default()));
        assert!(output.speak("second", &Preferences::default()));

        assert_eq!(log.spoken(), vec!["first".to_string(), "second".to_string()]);
        assert_eq!(log.cancels(), 2);
    }

    #[test]
    fn test_speak_survives_cancel_failure() {
        let synth = RecordingSynthesizer::new().failing_cancel();
        let log = synth.log();
        let mut output = SpeechOutput::new(Capability::Available(Box::new(synth)));

        assert!(output.speak("still spoken", &Preferences::default()));
        assert_eq!(log.spoken(), vec!["still spoken".to_string()]);
    }

    #[test]
    fn test_spd_say_args() {
        let args = SynthProgram::SpdSay.args(&utterance("en-GB", 1.5, 0.5));
        assert_eq!(args, vec!["-l", "en", "-r", "25", "-p", "-50", "--", "hello"]);
    }

    #[test]
    fn test_spd_say_args_clamped() {
        let args = SynthProgram::SpdSay.args(&utterance("de-DE", 10.0, 2.0));
        assert_eq!(args[3], "100");
        assert_eq!(args[5], "100");
    }

    #[test]
    fn test_espeak_args() {
        let args = SynthProgram::Espeak("espeak-ng".to_string()).args(&utterance("en-US", 1.0, 1.0));
        assert_eq!(args, vec!["-v", "en-us", "-s", "175", "-p", "50", "--stdin"]);
    }

    #[test]
    fn test_custom_args() {
        let args = SynthProgram::Custom("say".to_string()).args(&utterance("en-US", 1.0, 1.0));
        assert_eq!(args, vec!["hello"]);
    }

    #[test]
    fn test_program_from_name() {
        assert_eq!(SynthProgram::from_name("spd-say"), SynthProgram::SpdSay);
        assert_eq!(
            SynthProgram::from_name("espeak"),
            SynthProgram::Espeak("espeak".to_string())
        );
        assert_eq!(
            SynthProgram::from_name("piper"),
            SynthProgram::Custom("piper".to_string())
        );
    }

    #[test]
    fn test_detect_none() {
        let config = SpeechConfig {
            synthesizer: "none".to_string(),
            ..SpeechConfig::default()
        };
        assert!(!CommandSynthesizer::detect(&config).is_available());
    }

    #[test]
    fn test_detect_missing_program() {
        let config = SpeechConfig {
            synthesizer: "definitely-not-a-speech-program-xyz".to_string(),
            ..SpeechConfig::default()
        };
        assert!(!CommandSynthesizer::detect(&config).is_available());
    }

    #[test]
    fn test_command_synthesizer_runs_and_waits() {
        let mut synth = CommandSynthesizer::new(SynthProgram::Custom("true".to_string()));
        let prefs = Preferences::default();
        synth.speak(&Utterance::new("hello", &prefs)).unwrap();
        assert!(synth.child.is_some());
        synth.wait().unwrap();
        assert!(synth.child.is_none());
    }
}
