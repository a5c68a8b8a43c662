use crate::render::{MessageList, RenderedRow, RowId};
use crate::voice::MicControl;

/// Snapshot of every input control the user can see.
#[derive(Debug, Clone, PartialEq)]
pub struct Controls {
    pub input: String,
    pub input_focused: bool,
    pub send_enabled: bool,
    pub mic: MicControl,
    pub tts_icon: &'static str,
    pub lang: String,
    pub rate: f64,
    pub pitch: f64,
}

/// Applies session changes to a host display.
pub trait ChatView {
    fn row_appended(&mut self, id: RowId, row: &RenderedRow);
    /// Text or copy label of an existing row changed.
    fn row_updated(&mut self, id: RowId, row: &RenderedRow);
    fn scrolled_to_bottom(&mut self) {}
    /// The reader moved through history.
    fn scrolled(&mut self, messages: &MessageList);
    fn controls_changed(&mut self, controls: &Controls);
    /// Host-level text that is not part of the conversation.
    fn notice(&mut self, text: &str);
}
