//! SMTP Command Parser
//!
//! This module turns one raw input line into a typed [`Command`].
//! The parser is stateless: the same instance is shared by every session.
//!
//! ## How the Parser Works
//!
//! 1. Split the line on whitespace.
//! 2. If the first token is `MAIL` or `RCPT` and the second token is `FROM` or `TO`
//!    (case-insensitive, optional trailing colon), the command type is the two-word form.
//! 3. Otherwise the command type is the uppercased first token.
//! 4. The remaining tokens are joined with a single space to form the payload.
//!
//! Anything that does not name a supported command becomes
//! [`CommandKind::Unrecognized`]. That is not a parse failure: the session replies
//! with a 503 and keeps going.
//!
//! ## Example
//!
//! ```
//! use argopost::protocol::{CommandKind, CommandParser};
//!
//! let parser = CommandParser::new();
//! let cmd = parser.parse("mail from: <a@b.com>").unwrap();
//! assert_eq!(cmd.kind, CommandKind::MailFrom);
//! assert_eq!(cmd.verb, "MAIL FROM");
//! assert_eq!(cmd.payload, "<a@b.com>");
//! ```

use std::fmt;

/// The closed set of commands a session knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `HELO <domain>`
    Helo,
    /// `MAIL FROM <address>`
    MailFrom,
    /// `RCPT TO <address>`
    RcptTo,
    /// `DATA`
    Data,
    /// `QUIT`
    Quit,
    /// Anything else, including `MAIL`/`RCPT` without a valid `FROM`/`TO`
    Unrecognized,
}

impl CommandKind {
    /// Maps an uppercase command type string to its kind.
    pub fn from_verb(verb: &str) -> Self {
        match verb {
            "HELO" => CommandKind::Helo,
            "MAIL FROM" => CommandKind::MailFrom,
            "RCPT TO" => CommandKind::RcptTo,
            "DATA" => CommandKind::Data,
            "QUIT" => CommandKind::Quit,
            _ => CommandKind::Unrecognized,
        }
    }

    /// The canonical wire name, or `None` for unrecognized commands.
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            CommandKind::Helo => Some("HELO"),
            CommandKind::MailFrom => Some("MAIL FROM"),
            CommandKind::RcptTo => Some("RCPT TO"),
            CommandKind::Data => Some("DATA"),
            CommandKind::Quit => Some("QUIT"),
            CommandKind::Unrecognized => None,
        }
    }
}

/// A single parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// What the session should do with it
    pub kind: CommandKind,
    /// Uppercase command type as read from the line (e.g. `"MAIL FROM"`, `"FOO"`)
    pub verb: String,
    /// Trailing text after the verb token(s), rejoined with single spaces
    pub payload: String,
}

impl Command {
    /// Returns the whitespace-separated payload tokens.
    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.payload.split_whitespace()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.payload.is_empty() {
            write!(f, "{}", self.verb)
        } else {
            write!(f, "{} {}", self.verb, self.payload)
        }
    }
}

/// Stateless line-to-command parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandParser;

impl CommandParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self
    }

    /// Parses one input line.
    ///
    /// Returns `None` for an empty or all-whitespace line; callers skip such
    /// lines without replying.
    pub fn parse(&self, line: &str) -> Option<Command> {
        let mut tokens = line.split_whitespace();
        let first = tokens.next()?;
        let rest: Vec<&str> = tokens.collect();

        if let Some((verb, consumed, leading)) = envelope_verb(first, rest.first().copied()) {
            let mut payload: Vec<&str> = Vec::with_capacity(rest.len());
            if let Some(leading) = leading {
                payload.push(leading);
            }
            payload.extend_from_slice(&rest[consumed..]);

            return Some(Command {
                kind: CommandKind::from_verb(&verb),
                verb,
                payload: payload.join(" "),
            });
        }

        let verb = first.to_ascii_uppercase();
        Some(Command {
            kind: CommandKind::from_verb(&verb),
            verb,
            payload: rest.join(" "),
        })
    }
}

/// Recognizes the two-token `MAIL FROM` / `RCPT TO` forms.
///
/// Returns the combined verb, how many tokens after the first were consumed,
/// and an optional leading payload token for the `FROM:<addr>` spelling.
fn envelope_verb<'a>(
    first: &str,
    second: Option<&'a str>,
) -> Option<(String, usize, Option<&'a str>)> {
    let head = first.to_ascii_uppercase();
    if head != "MAIL" && head != "RCPT" {
        return None;
    }
    let second = second?;

    let keyword = second.trim_end_matches(':');
    if keyword.eq_ignore_ascii_case("FROM") || keyword.eq_ignore_ascii_case("TO") {
        return Some((format!("{} {}", head, keyword.to_ascii_uppercase()), 1, None));
    }

    // `FROM:<a@b.com>` with no space after the colon
    let (keyword, tail) = second.split_once(':')?;
    if tail.is_empty() {
        return None;
    }
    if keyword.eq_ignore_ascii_case("FROM") || keyword.eq_ignore_ascii_case("TO") {
        return Some((
            format!("{} {}", head, keyword.to_ascii_uppercase()),
            1,
            Some(tail),
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Option<Command> {
        CommandParser::new().parse(line)
    }

    #[test]
    fn test_parse_basic_commands() {
        let cases = [
            ("HELO example.com", CommandKind::Helo, "HELO", "example.com"),
            (
                "MAIL FROM <test@example.com>",
                CommandKind::MailFrom,
                "MAIL FROM",
                "<test@example.com>",
            ),
            (
                "RCPT TO <test@example.com>",
                CommandKind::RcptTo,
                "RCPT TO",
                "<test@example.com>",
            ),
            ("DATA", CommandKind::Data, "DATA", ""),
            ("QUIT", CommandKind::Quit, "QUIT", ""),
        ];

        for (line, kind, verb, payload) in cases {
            let cmd = parse(line).unwrap();
            assert_eq!(cmd.kind, kind, "{}", line);
            assert_eq!(cmd.verb, verb, "{}", line);
            assert_eq!(cmd.payload, payload, "{}", line);
        }
    }

    #[test]
    fn test_parse_empty_line() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("   \t  "), None);
        assert_eq!(parse("\r\n"), None);
    }

    #[test]
    fn test_parse_case_insensitive() {
        let cmd = parse("helo mixed.Case.org").unwrap();
        assert_eq!(cmd.kind, CommandKind::Helo);
        assert_eq!(cmd.payload, "mixed.Case.org");

        let cmd = parse("mail From: <a@b.com>").unwrap();
        assert_eq!(cmd.kind, CommandKind::MailFrom);
        assert_eq!(cmd.verb, "MAIL FROM");

        let cmd = parse("Rcpt to <c@d.com>").unwrap();
        assert_eq!(cmd.kind, CommandKind::RcptTo);
    }

    #[test]
    fn test_parse_trailing_colon() {
        let cmd = parse("MAIL FROM: <a@b.com>\r\n").unwrap();
        assert_eq!(cmd.kind, CommandKind::MailFrom);
        assert_eq!(cmd.payload, "<a@b.com>");

        let cmd = parse("RCPT TO: <c@d.com>").unwrap();
        assert_eq!(cmd.kind, CommandKind::RcptTo);
        assert_eq!(cmd.payload, "<c@d.com>");
    }

    #[test]
    fn test_parse_colon_attached_address() {
        let cmd = parse("MAIL FROM:<a@b.com> SIZE=100").unwrap();
        assert_eq!(cmd.kind, CommandKind::MailFrom);
        assert_eq!(cmd.payload, "<a@b.com> SIZE=100");

        let cmd = parse("rcpt to:<c@d.com>").unwrap();
        assert_eq!(cmd.kind, CommandKind::RcptTo);
        assert_eq!(cmd.payload, "<c@d.com>");
    }

    #[test]
    fn test_parse_whitespace_normalized() {
        let cmd = parse("  HELO   a.com    extra\t\ttokens \r\n").unwrap();
        assert_eq!(cmd.kind, CommandKind::Helo);
        assert_eq!(cmd.payload, "a.com extra tokens");
    }

    #[test]
    fn test_parse_mail_without_from() {
        let cmd = parse("MAIL <a@b.com>").unwrap();
        assert_eq!(cmd.kind, CommandKind::Unrecognized);
        assert_eq!(cmd.verb, "MAIL");
        assert_eq!(cmd.payload, "<a@b.com>");

        let cmd = parse("RCPT").unwrap();
        assert_eq!(cmd.kind, CommandKind::Unrecognized);
        assert_eq!(cmd.verb, "RCPT");
    }

    #[test]
    fn test_parse_mismatched_envelope_keyword() {
        // The keyword is kept, but the pairing is not a supported command
        let cmd = parse("MAIL TO <a@b.com>").unwrap();
        assert_eq!(cmd.kind, CommandKind::Unrecognized);
        assert_eq!(cmd.verb, "MAIL TO");
        assert_eq!(cmd.payload, "<a@b.com>");
    }

    #[test]
    fn test_parse_unknown_command() {
        let cmd = parse("FOO bar").unwrap();
        assert_eq!(cmd.kind, CommandKind::Unrecognized);
        assert_eq!(cmd.verb, "FOO");
        assert_eq!(cmd.payload, "bar");
        assert_eq!(cmd.to_string(), "FOO bar");

        let cmd = parse("HELLO test").unwrap();
        assert_eq!(cmd.kind, CommandKind::Unrecognized);
    }

    #[test]
    fn test_args() {
        let cmd = parse("DATA now please").unwrap();
        assert_eq!(cmd.args().collect::<Vec<_>>(), vec!["now", "please"]);
    }

    #[test]
    fn test_kind_names() {
        for kind in [
            CommandKind::Helo,
            CommandKind::MailFrom,
            CommandKind::RcptTo,
            CommandKind::Data,
            CommandKind::Quit,
        ] {
            assert_eq!(CommandKind::from_verb(kind.as_str().unwrap()), kind);
        }
        assert_eq!(CommandKind::Unrecognized.as_str(), None);
    }
}
