use std::io::{self, Stdout, Write};
use tracing::warn;

use crate::render::{MessageList, RenderedRow, RowId, COPY_LABEL};
use crate::view::{ChatView, Controls};

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Line-oriented [`ChatView`] for a terminal. Rows are printed as they
/// arrive; updates re-print the row under its number.
pub struct TerminalView<W: Write> {
    out: W,
    history_rows: usize,
    color: bool,
    last_status: Option<String>,
}

impl TerminalView<Stdout> {
    pub fn stdout(history_rows: usize) -> Self {
        Self::new(io::stdout(), history_rows, true)
    }
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W, history_rows: usize, color: bool) -> Self {
        Self {
            out,
            history_rows: history_rows.max(1),
            color,
            last_status: None,
        }
    }

    pub fn format_row(&self, id: RowId, row: &RenderedRow) -> String {
        let mut line = format!("[#{} {}] {} ", id.index() + 1, row.timestamp, row.avatar);
        if row.dimmed && self.color {
            line.push_str(&format!("{}{}{}", DIM, row.text, RESET));
        } else {
            line.push_str(&row.text);
        }
        if row.copy_label != COPY_LABEL {
            line.push_str(&format!("  ({})", row.copy_label));
        }
        line
    }

    fn write_line(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            warn!("Failed to write to terminal: {}", e);
        }
    }
}

pub fn status_line(controls: &Controls) -> String {
    let mut status = format!(
        "{} {} · rate {} · pitch {}",
        controls.tts_icon, controls.lang, controls.rate, controls.pitch
    );
    if controls.mic.visible {
        status.push_str(&format!(" · {}", controls.mic.label));
    }
    if !controls.send_enabled {
        status.push_str(" · waiting for reply");
    }
    status
}

impl<W: Write> ChatView for TerminalView<W> {
    fn row_appended(&mut self, id: RowId, row: &RenderedRow) {
        let line = self.format_row(id, row);
        self.write_line(&line);
    }

    fn row_updated(&mut self, id: RowId, row: &RenderedRow) {
        let line = format!("  ↳ {}", self.format_row(id, row));
        self.write_line(&line);
    }

    fn scrolled(&mut self, messages: &MessageList) {
        if messages.is_at_bottom() {
            self.write_line("── latest ──");
            return;
        }

        let (start, rows) = messages.visible(self.history_rows);
        let header = format!(
            "── history {}-{} of {} ──",
            start + 1,
            start + rows.len(),
            messages.len()
        );
        self.write_line(&header);
        for (offset, row) in rows.iter().enumerate() {
            if let Some(id) = messages.id_at(start + offset) {
                let line = self.format_row(id, row);
                self.write_line(&line);
            }
        }
    }

    fn controls_changed(&mut self, controls: &Controls) {
        let status = status_line(controls);
        if self.last_status.as_deref() == Some(status.as_str()) {
            return;
        }
        self.write_line(&format!("» {}", status));
        self.last_status = Some(status);
    }

    fn notice(&mut self, text: &str) {
        self.write_line(&format!("» {}", text));
    }
}
