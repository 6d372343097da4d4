//! Slash-command parsing.
//!
//! A chat line starting with `/` is a command:
//!
//! ```text
//! /<word> <target> [free text...]
//! ```
//!
//! The word is case-insensitive. The target is either a double-quoted string
//! (quotes stripped, may contain spaces) or a single whitespace-free token.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

pub const WHISPER_USAGE: &str = "Usage: /w <name> <message>";
pub const BAN_USAGE: &str = "Usage: /ban <name|address>";
pub const UNBAN_USAGE: &str = "Usage: /unban <name|address>";

/// Four dot-separated groups of 1-3 ASCII digits. Octet ranges are not checked.
static ADDRESS_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{1,3}(?:\.[0-9]{1,3}){3}$").expect("static regex"));

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Whisper { target: String, text: String },
    Ban(Target),
    Unban(Target),
    Help,
}

/// Who a ban/unban is aimed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Literal origin address, used as the ban key directly.
    Address(String),
    /// Display name, resolved through the registry.
    Name(String),
}

impl Target {
    pub fn classify(raw: &str) -> Self {
        if is_address_literal(raw) {
            Target::Address(raw.to_string())
        } else {
            Target::Name(raw.to_string())
        }
    }

    /// The raw target string, for notices.
    pub fn as_str(&self) -> &str {
        match self {
            Target::Address(s) | Target::Name(s) => s,
        }
    }
}

pub fn is_address_literal(s: &str) -> bool {
    ADDRESS_LITERAL.is_match(s)
}

/// Parse a chat line.
///
/// Returns `Ok(None)` when the line is ordinary chat, `Ok(Some(_))` for a
/// well-formed command, and an error for a malformed or unknown one.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let trimmed = line.trim();
    let Some(body) = trimmed.strip_prefix('/') else {
        return Ok(None);
    };

    let (word, remainder) = match body.find(char::is_whitespace) {
        Some(idx) => (&body[..idx], body[idx..].trim_start()),
        None => (body, ""),
    };
    let word = word.to_lowercase();

    match word.as_str() {
        "w" | "whisper" => {
            let (target, text) = split_target(remainder).ok_or(Error::Usage { usage: WHISPER_USAGE })?;
            if text.is_empty() {
                return Err(Error::Usage { usage: WHISPER_USAGE });
            }
            Ok(Some(Command::Whisper {
                target,
                text: text.to_string(),
            }))
        }
        "ban" => {
            let (target, _) = split_target(remainder).ok_or(Error::Usage { usage: BAN_USAGE })?;
            Ok(Some(Command::Ban(Target::classify(&target))))
        }
        "unban" => {
            let (target, _) = split_target(remainder).ok_or(Error::Usage { usage: UNBAN_USAGE })?;
            Ok(Some(Command::Unban(Target::classify(&target))))
        }
        "help" => Ok(Some(Command::Help)),
        _ => Err(Error::UnknownCommand(word)),
    }
}

/// Split `remainder` into a target and the trailing text (trimmed).
/// Returns `None` when there is no usable target.
fn split_target(remainder: &str) -> Option<(String, &str)> {
    if remainder.is_empty() {
        return None;
    }

    let (target, rest) = if let Some(quoted) = remainder.strip_prefix('"') {
        match quoted.find('"') {
            Some(end) => (&quoted[..end], &quoted[end + 1..]),
            // Unterminated quote: the whole line is the target.
            None => (quoted, ""),
        }
    } else {
        match remainder.find(char::is_whitespace) {
            Some(idx) => (&remainder[..idx], &remainder[idx..]),
            None => (remainder, ""),
        }
    };

    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    Some((target.to_string(), rest.trim()))
}

/// Text of the `/help` notice.
pub fn help_text(is_admin: bool) -> String {
    let mut lines = vec![
        "Available commands:",
        "  /w <name> <message> - Whisper to one user (quote names with spaces)",
        "  /help - Show this message",
    ];
    if is_admin {
        lines.push("Admin commands:");
        lines.push("  /ban <name|address> - Ban a user by name or IPv4 address");
        lines.push("  /unban <name|address> - Lift a ban");
    }
    lines.join("\n")
}
