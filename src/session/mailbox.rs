//! Argument clean-up for HELO, MAIL FROM and RCPT TO.

use mailparse::{addrparse, MailAddr};

/// Strips surrounding angle brackets, double quotes and colons from a token.
pub fn strip_decorations(token: &str) -> &str {
    token.trim_matches(|c: char| matches!(c, '<' | '>' | '"' | ':'))
}

/// Parses one argument token as a single mailbox address.
///
/// Returns the bare `local@domain` form, or `None` if the token is not a
/// single, complete address.
pub fn parse_mailbox(token: &str) -> Option<String> {
    let candidate = strip_decorations(token);
    if candidate.is_empty() {
        return None;
    }

    let list = addrparse(candidate).ok()?;
    let addr = match list.as_slice() {
        [MailAddr::Single(info)] => info.addr.trim(),
        _ => return None,
    };

    if addr.contains(char::is_whitespace) {
        return None;
    }
    let (local, domain) = addr.split_once('@')?;
    if !is_dot_atom(local) || !is_dot_atom(domain) {
        return None;
    }
    Some(addr.to_string())
}

/// Dot-atom shape check: non-empty, no `@`, no empty dot-separated segments.
fn is_dot_atom(part: &str) -> bool {
    !part.is_empty() && !part.contains('@') && part.split('.').all(|atom| !atom.is_empty())
}
