//! Operator command interpreter
//!
//! One line of text becomes a [`Command`]; [`execute`] runs it against a
//! [`Gateway`] and returns the lines to print. The stdin shell and the TCP
//! server in [`server`] only move lines in and out.

use serde::Serialize;
use tracing::debug;

use crate::gateway::Gateway;
use crate::types::{ChannelKind, ChannelValue};
use crate::{CoeError, Result};

mod server;

pub use server::{run_shell, serve_telnet};

/// Reply to data commands while nothing has been received yet.
pub const NO_FRAMES: &str = "no frames, need to wait for new input.";

const SEND_USAGE: &str =
    "command has wrong syntax. use e.g. \"send a 54 15 22.3 1\" for analogue requests.";

const HELP: &[&str] = &[
    "Command         [long command] Description",
    "----------------------------------------------------------------------",
    "  a\t\t[analogue] all analogue values (JSON)",
    "  d\t\t[digital] all digital values (JSON)",
    "  ar\t\t[analogue raw] all analogue raw values (JSON)",
    "  dr\t\t[digital raw] all digital raw values (JSON)",
    "  da\t\t[diff analogue] differences of analogue values since last call (JSON)",
    "  dd\t\t[diff digital] differences of digital values since last call (JSON)",
    "  f\t\t[frames] show all available frames",
    "  lf\t\t[last frame] show last frame",
    "  c\t\t[clean] drop all frames",
    "  r\t\t[restore] restore saved frames",
    "  w\t\t[write] write available frames to disc",
    "  s\t\t[send] send a value, e.g. \"s a <node> <index> <value> <decimals>\" or \"s d <node> <index> <0|1>\"",
    "  h\t\t[help] show this help",
    "  q\t\t[quit] quit",
];

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Quit,
    Help,
    Values(ChannelKind),
    RawValues(ChannelKind),
    Difference(ChannelKind),
    Frames,
    LastFrame,
    Clean,
    Restore,
    Write,
    Send { node: u8, index: u8, value: ChannelValue, decimals: u8 },
    /// Blank input; answered with nothing but a new prompt.
    Nothing,
}

impl Command {
    /// Parse one input line. Surrounding whitespace is ignored.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let command = match line {
            "" => Command::Nothing,
            "q" | "quit" => Command::Quit,
            "h" | "help" => Command::Help,
            "a" | "analogue" => Command::Values(ChannelKind::Analogue),
            "d" | "digital" => Command::Values(ChannelKind::Digital),
            "ar" | "analogue raw" => Command::RawValues(ChannelKind::Analogue),
            "dr" | "digital raw" => Command::RawValues(ChannelKind::Digital),
            "da" | "diff analogue" => Command::Difference(ChannelKind::Analogue),
            "dd" | "diff digital" => Command::Difference(ChannelKind::Digital),
            "f" | "frames" => Command::Frames,
            "lf" | "last frame" => Command::LastFrame,
            "c" | "clean" => Command::Clean,
            "r" | "restore" => Command::Restore,
            "w" | "write" => Command::Write,
            _ => match line.split_once(char::is_whitespace) {
                Some(("s" | "send", args)) => parse_send(args)?,
                _ => return Err(CoeError::parse_error("command", "invalid command.")),
            },
        };
        Ok(command)
    }

    /// Commands that only make sense once frames have been received.
    pub fn needs_frames(&self) -> bool {
        matches!(
            self,
            Command::Values(_)
                | Command::RawValues(_)
                | Command::Difference(_)
                | Command::Frames
                | Command::LastFrame
                | Command::Clean
                | Command::Write
        )
    }
}

fn parse_send(args: &str) -> Result<Command> {
    let usage = || CoeError::parse_error("send", SEND_USAGE);
    let fields: Vec<&str> = args.split_whitespace().collect();

    let (kind, rest) = match fields.split_first() {
        Some((&"a", rest)) if rest.len() == 4 => (ChannelKind::Analogue, rest),
        Some((&"d", rest)) if rest.len() == 3 => (ChannelKind::Digital, rest),
        _ => return Err(usage()),
    };

    let node = rest[0].parse::<u8>().map_err(|_| usage())?;
    let index = rest[1].parse::<u8>().map_err(|_| usage())?;
    let value = match kind {
        ChannelKind::Analogue => ChannelValue::parse(kind, rest[2])?,
        // Only 0 and 1 on the command line
        ChannelKind::Digital => match rest[2] {
            "0" => ChannelValue::Digital(false),
            "1" => ChannelValue::Digital(true),
            _ => return Err(usage()),
        },
    };
    let decimals = match kind {
        ChannelKind::Analogue => rest[3].parse::<u8>().map_err(|_| usage())?,
        ChannelKind::Digital => 0,
    };

    Ok(Command::Send { node, index, value, decimals })
}

/// Output of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub lines: Vec<String>,
    /// The session should end after this reply.
    pub quit: bool,
}

impl Reply {
    fn line(line: impl Into<String>) -> Self {
        Self { lines: vec![line.into()], quit: false }
    }

    fn ok() -> Self {
        Self::line("OK.")
    }

    fn error(error: &CoeError) -> Self {
        match error {
            // Command syntax problems already read as a sentence
            CoeError::Parse { context, details } if context == "command" || context == "send" => {
                Self::line(details.clone())
            }
            other => Self::line(format!("error: {}", other)),
        }
    }

    fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(json) => Self::line(json),
            Err(e) => Self::line(format!("error: {}", e)),
        }
    }
}

/// Parse and run one input line.
pub async fn handle_line(gateway: &Gateway, line: &str) -> Reply {
    match Command::parse(line) {
        Ok(command) => execute(gateway, command).await,
        Err(e) => Reply::error(&e),
    }
}

/// Run one command against the gateway.
pub async fn execute(gateway: &Gateway, command: Command) -> Reply {
    debug!(?command, "Executing command");

    if command.needs_frames() && gateway.frame_count() == 0 {
        return Reply::line(NO_FRAMES);
    }

    match command {
        Command::Nothing => Reply::default(),
        Command::Quit => Reply { lines: vec!["quit.".into()], quit: true },
        Command::Help => Reply { lines: HELP.iter().map(|l| l.to_string()).collect(), quit: false },
        Command::Values(kind) => Reply::json(&gateway.values(kind)),
        Command::RawValues(kind) => Reply::json(&gateway.raw_values(kind)),
        Command::Difference(kind) => Reply::json(&gateway.difference(kind)),
        Command::Frames => {
            let frames = gateway.frames();
            let mut lines: Vec<String> = frames.iter().map(|f| f.verbose()).collect();
            lines.push(format!("({} frames)", frames.len()));
            Reply { lines, quit: false }
        }
        Command::LastFrame => match gateway.last_frame() {
            Some(frame) => Reply::line(frame.verbose()),
            None => Reply::line(NO_FRAMES),
        },
        Command::Clean => gateway.clean().map_or_else(|e| Reply::error(&e), |_| Reply::ok()),
        Command::Restore => match gateway.restore() {
            Ok(count) => Reply::line(format!("OK. ({} frames)", count)),
            Err(e) => Reply::error(&e),
        },
        Command::Write => match gateway.save() {
            Ok(count) => Reply::line(format!("OK. ({} frames)", count)),
            Err(e) => Reply::error(&e),
        },
        Command::Send { node, index, value, decimals } => {
            match gateway.send_value(node, index, value, decimals).await {
                Ok(frame) => Reply::line(format!("OK. {}", frame)),
                Err(e) => Reply::error(&e),
            }
        }
    }
}
