pub mod app;
pub mod capability;
pub mod clipboard;
pub mod config;
pub mod error;
pub mod prefs;
pub mod render;
pub mod session;
pub mod speech;
pub mod storage;
pub mod transport;
pub mod ui;
pub mod view;
pub mod voice;

#[cfg(test)]
pub mod testing;

pub use capability::Capability;
pub use config::Config;
pub use error::ChatError;
pub use session::{ChatSession, SessionEvent};
pub use transport::{ChatTransport, HttpTransport};
pub use ui::TerminalView;
