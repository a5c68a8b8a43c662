//! Message rows: a pure description step and the in-memory list they are
//! applied to.

use chrono::{Local, NaiveTime};

pub const THINKING_TEXT: &str = "Thinking…";
pub const COPY_LABEL: &str = "Copy";
pub const COPIED_LABEL: &str = "Copied!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn avatar(self) -> &'static str {
        match self {
            Sender::User => "🧑",
            Sender::Bot => "🤖",
        }
    }

    pub fn style(self) -> &'static str {
        match self {
            Sender::User => "user-message",
            Sender::Bot => "bot-message",
        }
    }
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::User => write!(f, "You"),
            Sender::Bot => write!(f, "Bot"),
        }
    }
}

/// Everything a host needs to draw one message row.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRow {
    pub sender: Sender,
    pub avatar: &'static str,
    pub style: &'static str,
    pub text: String,
    /// De-emphasized placeholder.
    pub dimmed: bool,
    pub timestamp: String,
    pub copy_label: String,
}

pub fn timestamp(at: NaiveTime) -> String {
    at.format("%H:%M").to_string()
}

pub fn local_time() -> NaiveTime {
    Local::now().time()
}

pub fn describe(sender: Sender, text: &str, at: NaiveTime) -> RenderedRow {
    RenderedRow {
        sender,
        avatar: sender.avatar(),
        style: sender.style(),
        text: text.to_string(),
        dimmed: false,
        timestamp: timestamp(at),
        copy_label: COPY_LABEL.to_string(),
    }
}

pub fn describe_thinking(at: NaiveTime) -> RenderedRow {
    RenderedRow {
        dimmed: true,
        ..describe(Sender::Bot, THINKING_TEXT, at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId(usize);

impl RowId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Rows in display order plus the reader's scroll position, counted in rows
/// from the bottom. Zero means following the newest message.
#[derive(Debug, Default)]
pub struct MessageList {
    rows: Vec<RenderedRow>,
    offset_from_bottom: usize,
}

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row. Returns its id and whether the view follows it to the
    /// bottom; a reader scrolled up into history keeps their place.
    pub fn append(&mut self, row: RenderedRow) -> (RowId, bool) {
        let was_bottom = self.is_at_bottom();
        self.rows.push(row);
        if !was_bottom {
            self.offset_from_bottom += 1;
        }
        (RowId(self.rows.len() - 1), was_bottom)
    }

    /// Swap a row's text in place. The placeholder styling goes with it.
    pub fn replace_text(&mut self, id: RowId, text: &str) -> Option<&RenderedRow> {
        let row = self.rows.get_mut(id.0)?;
        row.text = text.to_string();
        row.dimmed = false;
        Some(row)
    }

    pub fn set_copy_label(&mut self, id: RowId, label: &str) -> Option<&RenderedRow> {
        let row = self.rows.get_mut(id.0)?;
        row.copy_label = label.to_string();
        Some(row)
    }

    pub fn get(&self, id: RowId) -> Option<&RenderedRow> {
        self.rows.get(id.0)
    }

    /// Id for a zero-based position, if a row exists there.
    pub fn id_at(&self, index: usize) -> Option<RowId> {
        (index < self.rows.len()).then_some(RowId(index))
    }

    pub fn last_id(&self) -> Option<RowId> {
        self.rows.len().checked_sub(1).map(RowId)
    }

    pub fn rows(&self) -> &[RenderedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_at_bottom(&self) -> bool {
        self.offset_from_bottom == 0
    }

    pub fn offset_from_bottom(&self) -> usize {
        self.offset_from_bottom
    }

    pub fn scroll_up(&mut self, rows: usize) {
        let max = self.rows.len().saturating_sub(1);
        self.offset_from_bottom = (self.offset_from_bottom + rows).min(max);
    }

    pub fn scroll_down(&mut self, rows: usize) {
        self.offset_from_bottom = self.offset_from_bottom.saturating_sub(rows);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.offset_from_bottom = 0;
    }

    /// The `height` rows ending at the current scroll position, with the
    /// index of the first one.
    pub fn visible(&self, height: usize) -> (usize, &[RenderedRow]) {
        let end = self.rows.len().saturating_sub(self.offset_from_bottom);
        let start = end.saturating_sub(height);
        (start, &self.rows[start..end])
    }
}
