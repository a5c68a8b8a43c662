//! Test doubles for the host capabilities.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::clipboard::Clipboard;
use crate::error::ChatError;
use crate::render::{MessageList, RenderedRow, RowId};
use crate::speech::{SpeechSynthesizer, Utterance};
use crate::transport::ChatTransport;
use crate::view::{ChatView, Controls};
use crate::voice::{RecognitionEvent, RecognitionSink, SpeechRecognizer};

/// Answers from a queue and records every message posted.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<String, ChatError>>>,
    sent: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(self: &Arc<Self>, text: &str) -> Arc<Self> {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
        self.clone()
    }

    pub fn fail(self: &Arc<Self>, reason: &str) -> Arc<Self> {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(ChatError::Transport(reason.to_string())));
        self.clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn post_message(&self, message: &str) -> Result<String, ChatError> {
        self.sent.lock().unwrap().push(message.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_string()))
    }
}

#[derive(Default)]
struct SynthRecord {
    spoken: Vec<Utterance>,
    cancels: usize,
}

#[derive(Clone, Default)]
pub struct SynthLog(Arc<Mutex<SynthRecord>>);

impl SynthLog {
    pub fn spoken(&self) -> Vec<String> {
        self.0.lock().unwrap().spoken.iter().map(|u| u.text.clone()).collect()
    }

    pub fn utterances(&self) -> Vec<Utterance> {
        self.0.lock().unwrap().spoken.clone()
    }

    pub fn cancels(&self) -> usize {
        self.0.lock().unwrap().cancels
    }
}

#[derive(Default)]
pub struct RecordingSynthesizer {
    log: SynthLog,
    fail_cancel: bool,
}

impl RecordingSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_cancel(mut self) -> Self {
        self.fail_cancel = true;
        self
    }

    pub fn log(&self) -> SynthLog {
        self.log.clone()
    }
}

impl SpeechSynthesizer for RecordingSynthesizer {
    fn cancel(&mut self) -> Result<(), ChatError> {
        self.log.0.lock().unwrap().cancels += 1;
        if self.fail_cancel {
            return Err(ChatError::Speech("cancel refused".to_string()));
        }
        Ok(())
    }

    fn speak(&mut self, utterance: &Utterance) -> Result<(), ChatError> {
        self.log.0.lock().unwrap().spoken.push(utterance.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingClipboard {
    contents: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingClipboard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn contents(&self) -> Vec<String> {
        self.contents.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clipboard for RecordingClipboard {
    async fn copy(&self, text: &str) -> Result<(), ChatError> {
        if self.fail {
            return Err(ChatError::Clipboard("permission denied".to_string()));
        }
        self.contents.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Records start calls and keeps the sink so a test can play the events.
#[derive(Default)]
pub struct ScriptedRecognizer {
    starts: Arc<Mutex<Vec<String>>>,
    sink: Arc<Mutex<Option<RecognitionSink>>>,
    fail_start: bool,
}

#[derive(Clone)]
pub struct RecognitionEmitter(Arc<Mutex<Option<RecognitionSink>>>);

impl RecognitionEmitter {
    pub fn emit(&self, event: RecognitionEvent) {
        if let Some(sink) = self.0.lock().unwrap().as_ref() {
            sink(event);
        }
    }
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn starts(&self) -> Arc<Mutex<Vec<String>>> {
        self.starts.clone()
    }

    pub fn emitter(&self) -> RecognitionEmitter {
        RecognitionEmitter(self.sink.clone())
    }
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn start(&mut self, lang: &str, sink: RecognitionSink) -> Result<(), ChatError> {
        if self.fail_start {
            return Err(ChatError::Recognition("not-allowed".to_string()));
        }
        self.starts.lock().unwrap().push(lang.to_string());
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }
}

#[derive(Default)]
pub struct ViewRecord {
    pub appended: Vec<(RowId, RenderedRow)>,
    pub updated: Vec<(RowId, RenderedRow)>,
    pub controls: Option<Controls>,
    pub notices: Vec<String>,
    pub bottom_scrolls: usize,
    pub history_scrolls: usize,
}

#[derive(Clone, Default)]
pub struct RecordingView(pub Arc<Mutex<ViewRecord>>);

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatView for RecordingView {
    fn row_appended(&mut self, id: RowId, row: &RenderedRow) {
        self.0.lock().unwrap().appended.push((id, row.clone()));
    }

    fn row_updated(&mut self, id: RowId, row: &RenderedRow) {
        self.0.lock().unwrap().updated.push((id, row.clone()));
    }

    fn scrolled_to_bottom(&mut self) {
        self.0.lock().unwrap().bottom_scrolls += 1;
    }

    fn scrolled(&mut self, _messages: &MessageList) {
        self.0.lock().unwrap().history_scrolls += 1;
    }

    fn controls_changed(&mut self, controls: &Controls) {
        self.0.lock().unwrap().controls = Some(controls.clone());
    }

    fn notice(&mut self, text: &str) {
        self.0.lock().unwrap().notices.push(text.to_string());
    }
}
