use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, info};

use crate::clipboard::WaylandClipboard;
use crate::config::Config;
use crate::prefs::PreferenceStore;
use crate::session::{ChatSession, SessionEvent, SessionOptions, SessionParts};
use crate::speech::{CommandSynthesizer, SpeechOutput};
use crate::storage::{
    durable_store_path, prune_stale_session_stores, session_store_path, JsonFileStore,
};
use crate::transport::HttpTransport;
use crate::view::ChatView;
use crate::voice::{CommandRecognizer, VoiceInput};

pub const HELP_TEXT: &str = "Type a message and press Enter to send. Commands:
  /tts            toggle reading replies aloud
  /lang <tag>     speech and recognition language
  /rate <n>       speech rate (0.1-10)
  /pitch <n>      speech pitch (0-2)
  /mic            speak a message
  /copy [n]       copy message #n (default: last)
  /up [n]         scroll back n messages (default: 5)
  /down [n]       scroll forward n messages (default: 5)
  /bottom         jump to the newest message
  /prefs          show current preferences
  /help           show this help
  /quit           leave";

const DEFAULT_SCROLL: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    Say(String),
    ToggleTts,
    Lang(String),
    Rate(f64),
    Pitch(f64),
    Mic,
    /// 1-based message number as printed.
    Copy(Option<usize>),
    Up(usize),
    Down(usize),
    Bottom,
    Prefs,
    Help,
    Quit,
}

/// Parse one input line. Anything not starting with `/` is a message.
pub fn parse_command(line: &str) -> Result<ChatCommand, String> {
    let trimmed = line.trim();
    if !trimmed.starts_with('/') {
        return Ok(ChatCommand::Say(line.to_string()));
    }

    let mut parts = trimmed.split_whitespace();
    let name = parts.next().unwrap_or("/");
    let arg = parts.next();
    if parts.next().is_some() {
        return Err(format!("Too many arguments for {}", name));
    }

    let number = |arg: Option<&str>| -> Result<f64, String> {
        let arg = arg.ok_or_else(|| format!("{} needs a number", name))?;
        arg.parse::<f64>()
            .map_err(|_| format!("Not a number: {}", arg))
    };
    let count = |arg: Option<&str>, default: Option<usize>| -> Result<Option<usize>, String> {
        match arg {
            None => Ok(default),
            Some(a) => match a.parse::<usize>() {
                Ok(n) if n > 0 => Ok(Some(n)),
                _ => Err(format!("Not a positive count: {}", a)),
            },
        }
    };

    let cmd = match name {
        "/tts" => ChatCommand::ToggleTts,
        "/lang" => match arg {
            Some(tag) => ChatCommand::Lang(tag.to_string()),
            None => return Err("/lang needs a language tag".to_string()),
        },
        "/rate" => ChatCommand::Rate(number(arg)?),
        "/pitch" => ChatCommand::Pitch(number(arg)?),
        "/mic" => ChatCommand::Mic,
        "/copy" => ChatCommand::Copy(count(arg, None)?),
        "/up" => ChatCommand::Up(count(arg, Some(DEFAULT_SCROLL))?.unwrap_or(DEFAULT_SCROLL)),
        "/down" => ChatCommand::Down(count(arg, Some(DEFAULT_SCROLL))?.unwrap_or(DEFAULT_SCROLL)),
        "/bottom" => ChatCommand::Bottom,
        "/prefs" => ChatCommand::Prefs,
        "/help" => ChatCommand::Help,
        "/quit" | "/exit" => ChatCommand::Quit,
        other => return Err(format!("Unknown command: {}", other)),
    };
    debug!("Parsed command: {:?}", cmd);
    Ok(cmd)
}

/// Apply one input line. Returns false when the user asked to leave.
pub fn dispatch(session: &mut ChatSession, line: &str) -> bool {
    let cmd = match parse_command(line) {
        Ok(cmd) => cmd,
        Err(message) => {
            session.notice(&message);
            session.notice(HELP_TEXT);
            return true;
        }
    };

    match cmd {
        ChatCommand::Say(text) => {
            if session.is_sending() && !text.trim().is_empty() {
                session.notice("Still waiting for the previous reply");
            } else {
                session.set_input(&text);
                session.submit_input();
            }
        }
        ChatCommand::ToggleTts => session.toggle_tts(),
        ChatCommand::Lang(tag) => {
            if let Err(e) = session.set_lang(&tag) {
                session.notice(&e.to_string());
            }
        }
        ChatCommand::Rate(rate) => {
            if let Err(e) = session.set_rate(rate) {
                session.notice(&e.to_string());
            }
        }
        ChatCommand::Pitch(pitch) => {
            if let Err(e) = session.set_pitch(pitch) {
                session.notice(&e.to_string());
            }
        }
        ChatCommand::Mic => {
            if !session.voice().is_available() {
                session.notice("Voice typing is not available");
            } else if !session.press_mic() {
                session.notice("Microphone is busy");
            }
        }
        ChatCommand::Copy(number) => {
            let row = match number {
                Some(n) => session.messages().id_at(n - 1),
                None => session.messages().last_id(),
            };
            let copied = row.is_some_and(|row| session.copy(row));
            if !copied {
                let what = number.map_or("messages".to_string(), |n| format!("message #{}", n));
                session.notice(&format!("No {} to copy", what));
            }
        }
        ChatCommand::Up(rows) => session.scroll_up(rows),
        ChatCommand::Down(rows) => session.scroll_down(rows),
        ChatCommand::Bottom => session.scroll_to_bottom(),
        ChatCommand::Prefs => match serde_json::to_string(session.prefs()) {
            Ok(json) => session.notice(&json),
            Err(e) => session.notice(&format!("Failed to show preferences: {}", e)),
        },
        ChatCommand::Help => session.notice(HELP_TEXT),
        ChatCommand::Quit => return false,
    }
    true
}

/// Wire the real host capabilities into a session.
pub fn build_session(
    config: &Config,
    view: Box<dyn ChatView>,
) -> Result<(ChatSession, UnboundedReceiver<SessionEvent>)> {
    let transport = HttpTransport::new(&config.client).context("Failed to create HTTP client")?;
    info!("Chatting with {}", transport.endpoint());

    prune_stale_session_stores();
    let durable = JsonFileStore::open(durable_store_path());
    let session_store = JsonFileStore::open(session_store_path());
    debug!("Preferences in {:?}, session markers in {:?}", durable.path(), session_store.path());

    let parts = SessionParts {
        transport: Arc::new(transport),
        speech: SpeechOutput::new(CommandSynthesizer::detect(&config.speech)),
        voice: VoiceInput::new(CommandRecognizer::detect(&config.voice)),
        clipboard: Arc::new(WaylandClipboard::new()),
        prefs: PreferenceStore::new(Box::new(durable), config.speech.languages.clone()),
        session_store: Box::new(session_store),
        view,
    };
    let options = SessionOptions {
        default_lang: config.speech.default_lang.clone(),
        copy_feedback: Duration::from_millis(config.ui.copy_feedback_ms),
        show_welcome: config.ui.show_welcome,
    };

    let (tx, rx) = unbounded_channel();
    Ok((ChatSession::new(parts, options, tx), rx))
}

/// Interactive loop: stdin lines, session events and termination signals.
/// After stdin closes the loop waits for an outstanding reply, then ends.
pub async fn run_chat(
    mut session: ChatSession,
    mut events: UnboundedReceiver<SessionEvent>,
) -> Result<()> {
    session.start();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down...");
                break;
            }
            line = lines.next_line(), if stdin_open => {
                match line.context("Failed to read from stdin")? {
                    Some(line) => {
                        if !dispatch(&mut session, &line) {
                            info!("Quit requested");
                            break;
                        }
                    }
                    None => {
                        debug!("stdin closed");
                        stdin_open = false;
                    }
                }
            }
            Some(event) = events.recv() => {
                session.handle(event);
            }
        }

        if !stdin_open && !session.is_sending() {
            break;
        }
    }

    session.finish_speech();
    Ok(())
}

/// One send pipeline run without the interactive loop.
pub async fn send_once(mut session: ChatSession, message: &str) -> Result<()> {
    session.load_preferences();
    if !session.send(message).await {
        return Err(anyhow::anyhow!("Nothing to send"));
    }
    session.finish_speech();
    Ok(())
}
