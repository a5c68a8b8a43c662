//! The chat client: preferences, message list, send pipeline, speech and
//! voice input, all driven from one event loop.
//!
//! Work that has to wait (the chat request, recognition, clipboard writes,
//! the copy confirmation timer) runs as a task and reports back through a
//! [`SessionEvent`]; only the loop that owns the session mutates it.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::clipboard::Clipboard;
use crate::error::ChatError;
use crate::prefs::{is_selectable_lang, validate_pitch, validate_rate, PreferenceStore, Preferences};
use crate::render::{
    describe, describe_thinking, local_time, MessageList, RowId, Sender, COPIED_LABEL, COPY_LABEL,
};
use crate::speech::SpeechOutput;
use crate::storage::KeyValueStore;
use crate::transport::ChatTransport;
use crate::view::{ChatView, Controls};
use crate::voice::{CaptureId, CaptureSink, RecognitionEvent, VoiceInput, VoiceOutcome};

pub const ERROR_REPLY: &str = "⚠️ Error contacting server.";
pub const VOICE_UNSUPPORTED: &str = "🎤 Voice typing not supported on this system.";
pub const WELCOME_TEXT: &str =
    "Welcome! Voice typing is ready 1.) Type /mic 🎤 to speak, & I’ll respond. 2.) Toggle TTS with /tts 🔊.";
pub const WELCOMED_KEY: &str = "welcomed";

#[derive(Debug)]
pub enum SessionEvent {
    ReplyArrived {
        ticket: SendTicket,
        result: Result<String, ChatError>,
    },
    Voice {
        capture: CaptureId,
        event: RecognitionEvent,
    },
    CopyFinished {
        row: RowId,
        result: Result<(), ChatError>,
    },
    CopyLabelExpired {
        row: RowId,
    },
}

/// An accepted submission waiting for its reply.
#[derive(Debug)]
pub struct SendTicket {
    placeholder: RowId,
    message: String,
}

impl SendTicket {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn placeholder(&self) -> RowId {
        self.placeholder
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub default_lang: String,
    pub copy_feedback: Duration,
    pub show_welcome: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            default_lang: crate::config::default_lang(),
            copy_feedback: Duration::from_millis(900),
            show_welcome: true,
        }
    }
}

/// Host capabilities the session is built from.
pub struct SessionParts {
    pub transport: Arc<dyn ChatTransport>,
    pub speech: SpeechOutput,
    pub voice: VoiceInput,
    pub clipboard: Arc<dyn Clipboard>,
    pub prefs: PreferenceStore,
    pub session_store: Box<dyn KeyValueStore>,
    pub view: Box<dyn ChatView>,
}

pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    speech: SpeechOutput,
    voice: VoiceInput,
    clipboard: Arc<dyn Clipboard>,
    prefs_store: PreferenceStore,
    session_store: Box<dyn KeyValueStore>,
    view: Box<dyn ChatView>,
    options: SessionOptions,
    events: UnboundedSender<SessionEvent>,

    prefs: Preferences,
    messages: MessageList,
    input: String,
    input_focused: bool,
    sending: bool,
}

impl ChatSession {
    pub fn new(
        parts: SessionParts,
        options: SessionOptions,
        events: UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            transport: parts.transport,
            speech: parts.speech,
            voice: parts.voice,
            clipboard: parts.clipboard,
            prefs_store: parts.prefs,
            session_store: parts.session_store,
            view: parts.view,
            prefs: Preferences::with_lang(&options.default_lang),
            options,
            events,
            messages: MessageList::new(),
            input: String::new(),
            input_focused: true,
            sending: false,
        }
    }

    /// Load preferences, then show the startup messages: the voice notice
    /// when recognition is missing, and the welcome once per session.
    pub fn start(&mut self) {
        self.load_preferences();

        if !self.voice.is_available() {
            self.append_message(Sender::Bot, VOICE_UNSUPPORTED);
        }

        if self.options.show_welcome && !self.already_welcomed() {
            self.append_message(Sender::Bot, WELCOME_TEXT);
            if let Err(e) = self.session_store.set(WELCOMED_KEY, "1") {
                warn!("Failed to record welcome marker: {}", e);
            }
        }
    }

    fn already_welcomed(&self) -> bool {
        match self.session_store.get(WELCOMED_KEY) {
            Ok(marker) => marker.is_some(),
            Err(e) => {
                warn!("Failed to read welcome marker: {}", e);
                false
            }
        }
    }

    /// Re-read the stored preferences over the live values.
    pub fn load_preferences(&mut self) {
        self.prefs_store.load_into(&mut self.prefs);
        self.publish_controls();
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn tts_enabled(&self) -> bool {
        self.prefs.tts_enabled
    }

    pub fn prefs(&self) -> &Preferences {
        &self.prefs
    }

    pub fn messages(&self) -> &MessageList {
        &self.messages
    }

    pub fn voice(&self) -> &VoiceInput {
        &self.voice
    }

    pub fn controls(&self) -> Controls {
        Controls {
            input: self.input.clone(),
            input_focused: self.input_focused,
            send_enabled: !self.sending,
            mic: self.voice.mic(),
            tts_icon: self.prefs.toggle_icon(),
            lang: self.prefs.lang.clone(),
            rate: self.prefs.rate,
            pitch: self.prefs.pitch,
        }
    }

    fn publish_controls(&mut self) {
        let controls = self.controls();
        self.view.controls_changed(&controls);
    }

    pub fn notice(&mut self, text: &str) {
        self.view.notice(text);
    }

    pub fn set_input(&mut self, text: &str) {
        self.input = text.to_string();
        self.publish_controls();
    }

    /// Render a message row. Bot messages are spoken.
    pub fn append_message(&mut self, sender: Sender, text: &str) -> RowId {
        let id = self.append_row(describe(sender, text, local_time()));
        if sender == Sender::Bot {
            self.speech.speak(text, &self.prefs);
        }
        id
    }

    fn append_row(&mut self, row: crate::render::RenderedRow) -> RowId {
        let (id, followed) = self.messages.append(row);
        if let Some(row) = self.messages.get(id) {
            self.view.row_appended(id, row);
        }
        if followed {
            self.view.scrolled_to_bottom();
        }
        id
    }

    fn replace_bubble(&mut self, id: RowId, text: &str) {
        if let Some(row) = self.messages.replace_text(id, text) {
            self.view.row_updated(id, row);
        }
    }

    /// Accept a submission: steps up to the thinking placeholder. Returns
    /// `None` for blank text or while another send is outstanding.
    pub fn begin_send(&mut self, message: &str) -> Option<SendTicket> {
        if self.sending {
            debug!("Send already in flight, ignoring submit");
            return None;
        }
        if message.trim().is_empty() {
            return None;
        }

        self.sending = true;
        self.append_message(Sender::User, message);
        self.input.clear();
        self.input_focused = true;
        self.publish_controls();

        let placeholder = self.append_row(describe_thinking(local_time()));
        Some(SendTicket {
            placeholder,
            message: message.to_string(),
        })
    }

    /// Finish a send: show the reply (or the error text) in the placeholder
    /// and re-open the pipeline.
    pub fn complete_send(&mut self, ticket: SendTicket, result: Result<String, ChatError>) {
        match result {
            Ok(reply) => {
                self.replace_bubble(ticket.placeholder, &reply);
                self.speech.speak(&reply, &self.prefs);
            }
            Err(e) => {
                warn!("Fetch error: {}", e);
                self.replace_bubble(ticket.placeholder, ERROR_REPLY);
            }
        }

        self.sending = false;
        self.publish_controls();
    }

    /// Submit and let the reply arrive as a [`SessionEvent::ReplyArrived`].
    pub fn submit(&mut self, message: &str) -> bool {
        let Some(ticket) = self.begin_send(message) else {
            return false;
        };

        let transport = self.transport.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = transport.post_message(&ticket.message).await;
            let _ = events.send(SessionEvent::ReplyArrived { ticket, result });
        });
        true
    }

    pub fn submit_input(&mut self) -> bool {
        let message = self.input.clone();
        self.submit(&message)
    }

    /// Run the whole pipeline inline. Returns whether a request was made.
    pub async fn send(&mut self, message: &str) -> bool {
        let Some(ticket) = self.begin_send(message) else {
            return false;
        };
        let result = self.transport.post_message(&ticket.message).await;
        self.complete_send(ticket, result);
        true
    }

    /// Block until queued speech is done; used before a one-shot exit.
    pub fn finish_speech(&mut self) {
        self.speech.wait();
    }

    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ReplyArrived { ticket, result } => self.complete_send(ticket, result),
            SessionEvent::Voice { capture, event } => self.on_voice_event(capture, event),
            SessionEvent::CopyFinished { row, result } => self.on_copy_finished(row, result),
            SessionEvent::CopyLabelExpired { row } => {
                if let Some(row_ref) = self.messages.set_copy_label(row, COPY_LABEL) {
                    self.view.row_updated(row, row_ref);
                }
            }
        }
    }

    pub fn toggle_tts(&mut self) {
        self.prefs.tts_enabled = !self.prefs.tts_enabled;
        if !self.prefs.tts_enabled {
            self.speech.cancel();
        }
        info!("Text-to-speech {}", if self.prefs.tts_enabled { "on" } else { "off" });
        self.save_preferences();
    }

    pub fn set_lang(&mut self, lang: &str) -> Result<(), ChatError> {
        if !is_selectable_lang(lang, self.prefs_store.languages()) {
            return Err(ChatError::Config(format!(
                "unsupported language '{}' (choices: {})",
                lang,
                self.prefs_store.languages().join(", ")
            )));
        }
        self.prefs.lang = lang.to_string();
        self.save_preferences();
        Ok(())
    }

    pub fn set_rate(&mut self, rate: f64) -> Result<(), ChatError> {
        self.prefs.rate = validate_rate(rate)?;
        self.save_preferences();
        Ok(())
    }

    pub fn set_pitch(&mut self, pitch: f64) -> Result<(), ChatError> {
        self.prefs.pitch = validate_pitch(pitch)?;
        self.save_preferences();
        Ok(())
    }

    fn save_preferences(&mut self) {
        self.prefs_store.save(&self.prefs);
        self.publish_controls();
    }

    /// Mic control press.
    pub fn press_mic(&mut self) -> bool {
        let events = self.events.clone();
        let sink: CaptureSink = Box::new(move |capture, event| {
            let _ = events.send(SessionEvent::Voice { capture, event });
        });
        let started = self.voice.press(&self.prefs.lang, sink);
        self.publish_controls();
        started
    }

    fn on_voice_event(&mut self, capture: CaptureId, event: RecognitionEvent) {
        match self.voice.on_event(capture, event) {
            VoiceOutcome::Nothing => {}
            VoiceOutcome::Submit(transcript) => {
                self.set_input(&transcript);
                self.submit(&transcript);
            }
            VoiceOutcome::ShowError(text) => {
                self.append_message(Sender::Bot, &text);
            }
        }
        self.publish_controls();
    }

    /// Copy a row's text to the clipboard. Returns false for unknown rows.
    pub fn copy(&mut self, row: RowId) -> bool {
        let Some(text) = self.messages.get(row).map(|r| r.text.clone()) else {
            return false;
        };

        let clipboard = self.clipboard.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = clipboard.copy(&text).await;
            let _ = events.send(SessionEvent::CopyFinished { row, result });
        });
        true
    }

    fn on_copy_finished(&mut self, row: RowId, result: Result<(), ChatError>) {
        if let Err(e) = result {
            debug!("Clipboard copy failed: {}", e);
            return;
        }
        if let Some(row_ref) = self.messages.set_copy_label(row, COPIED_LABEL) {
            self.view.row_updated(row, row_ref);
        }

        let events = self.events.clone();
        let deadline = tokio::time::Instant::now() + self.options.copy_feedback;
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = events.send(SessionEvent::CopyLabelExpired { row });
        });
    }

    pub fn scroll_up(&mut self, rows: usize) {
        self.messages.scroll_up(rows);
        self.view.scrolled(&self.messages);
    }

    pub fn scroll_down(&mut self, rows: usize) {
        self.messages.scroll_down(rows);
        self.view.scrolled(&self.messages);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.messages.scroll_to_bottom();
        self.view.scrolled(&self.messages);
    }
}
