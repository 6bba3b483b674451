//! Turns lexed `.job` lines into [`Command`] values.
//!
//! Grammar, one command per line:
//!
//! ```doc
//! WRITE [(k1,v1)(k2,v2)...]     # up to 256 pairs, optional commas between
//! READ [k1,k2,...]
//! DELETE [k1,k2,...]
//! SHOW
//! WAIT <ms>
//! BACKUP
//! HELP
//! ```
//!
//! Keys and values are bounded at 40 bytes here, at the grammar level; the
//! store enforces its own bounds again. A line that fails to parse becomes
//! [`Command::Invalid`] so the executor can log and move on, matching the
//! classic "Invalid command. See HELP for usage" behavior.

use kvs::script::{Command, MAX_WRITE_PAIRS};

use crate::ast::token_kind::TokenKind;
use crate::ast::tokenizer::{tokenize_line, Token};

/// Longest key or value accepted by the script grammar, in bytes.
pub const MAX_STRING_SIZE: usize = 40;

/// Parses one script line. `None` means there is nothing to execute (blank
/// or comment-only line).
pub fn parse_line(line: &str) -> Option<Command> {
    let tokens = match tokenize_line(line) {
        Ok(tokens) => tokens,
        Err(reason) => return Some(Command::Invalid(reason)),
    };
    let Some((head, rest)) = tokens.split_first() else {
        return None;
    };

    let parsed = match head.kind {
        TokenKind::Write => parse_write(rest),
        TokenKind::Read => parse_key_list(rest).map(Command::Read),
        TokenKind::Delete => parse_key_list(rest).map(Command::Delete),
        TokenKind::Show => lone(rest, Command::Show),
        TokenKind::Wait => parse_wait(rest),
        TokenKind::Backup => lone(rest, Command::Backup),
        TokenKind::Help => lone(rest, Command::Help),
        _ => Err(format!("unknown command {:?}", head.slice)),
    };

    Some(parsed.unwrap_or_else(Command::Invalid))
}

fn lone(rest: &[Token<'_>], command: Command) -> Result<Command, String> {
    if rest.is_empty() {
        Ok(command)
    } else {
        Err("trailing tokens after command".to_string())
    }
}

fn parse_wait(rest: &[Token<'_>]) -> Result<Command, String> {
    match rest {
        [delay] if delay.kind == TokenKind::LiteralInteger => {
            let ms = delay
                .slice
                .parse::<u64>()
                .map_err(|err| format!("bad delay {:?}: {err}", delay.slice))?;
            Ok(Command::Wait(ms))
        }
        _ => Err("WAIT takes a single millisecond count".to_string()),
    }
}

/// `[(k,v)(k2,v2)]` with optional commas between pairs.
fn parse_write(rest: &[Token<'_>]) -> Result<Command, String> {
    let body = bracketed(rest)?;
    let mut pairs = Vec::new();
    let mut at = 0;

    while at < body.len() {
        // Skip a separating comma between pairs.
        if body[at].kind == TokenKind::Comma && !pairs.is_empty() {
            at += 1;
            continue;
        }
        match body.get(at..at + 5) {
            Some([open, key, comma, value, close])
                if open.kind == TokenKind::LParen
                    && key.kind.is_argument()
                    && comma.kind == TokenKind::Comma
                    && value.kind.is_argument()
                    && close.kind == TokenKind::RParen =>
            {
                pairs.push((argument(key)?, argument(value)?));
                at += 5;
            }
            _ => return Err("malformed pair list".to_string()),
        }
    }

    if pairs.is_empty() {
        return Err("WRITE needs at least one pair".to_string());
    }
    if pairs.len() > MAX_WRITE_PAIRS {
        return Err(format!("WRITE carries more than {MAX_WRITE_PAIRS} pairs"));
    }
    Ok(Command::Write(pairs))
}

/// `[k1,k2,...]` for READ and DELETE.
fn parse_key_list(rest: &[Token<'_>]) -> Result<Vec<String>, String> {
    let body = bracketed(rest)?;
    let mut keys = Vec::new();
    let mut expect_key = true;

    for token in body {
        match (expect_key, token.kind) {
            (true, kind) if kind.is_argument() => {
                keys.push(argument(token)?);
                expect_key = false;
            }
            (false, TokenKind::Comma) => expect_key = true,
            _ => return Err("malformed key list".to_string()),
        }
    }

    if keys.is_empty() || expect_key {
        return Err("key list needs at least one key".to_string());
    }
    if keys.len() > MAX_WRITE_PAIRS {
        return Err(format!("key list carries more than {MAX_WRITE_PAIRS} keys"));
    }
    Ok(keys)
}

/// Strips the surrounding brackets of an argument list.
fn bracketed<'a, 'b>(rest: &'a [Token<'b>]) -> Result<&'a [Token<'b>], String> {
    match rest {
        [open, body @ .., close]
            if open.kind == TokenKind::LBracket && close.kind == TokenKind::RBracket =>
        {
            Ok(body)
        }
        _ => Err("expected a bracketed argument list".to_string()),
    }
}

fn argument(token: &Token<'_>) -> Result<String, String> {
    let text = token.slice;
    if text.len() > MAX_STRING_SIZE {
        return Err(format!(
            "argument of {} bytes exceeds {MAX_STRING_SIZE} bytes",
            text.len()
        ));
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parsed(line: &str) -> Command {
        parse_line(line).expect("line is a command")
    }

    fn is_invalid(line: &str) -> bool {
        matches!(parsed(line), Command::Invalid(_))
    }

    #[test]
    fn parses_every_command() {
        assert_eq!(
            parsed("WRITE [(a,1)(b,2)]"),
            Command::Write(vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ])
        );
        assert_eq!(
            parsed("READ [b,a]"),
            Command::Read(vec!["b".to_string(), "a".to_string()])
        );
        assert_eq!(
            parsed("DELETE [x,y]"),
            Command::Delete(vec!["x".to_string(), "y".to_string()])
        );
        assert_eq!(parsed("SHOW"), Command::Show);
        assert_eq!(parsed("WAIT 150"), Command::Wait(150));
        assert_eq!(parsed("BACKUP"), Command::Backup);
        assert_eq!(parsed("HELP"), Command::Help);
    }

    #[test]
    fn pairs_accept_an_optional_separating_comma() {
        assert_eq!(
            parsed("WRITE [(a,1),(b,2)]"),
            Command::Write(vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ])
        );
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("# WRITE [(a,1)]"), None);
    }

    #[test]
    fn malformed_lines_become_invalid() {
        assert!(is_invalid("FROB"));
        assert!(is_invalid("WRITE"));
        assert!(is_invalid("WRITE [(a)]"));
        assert!(is_invalid("WRITE [(a,1]"));
        assert!(is_invalid("WRITE []"));
        assert!(is_invalid("READ []"));
        assert!(is_invalid("READ [a,]"));
        assert!(is_invalid("READ a,b"));
        assert!(is_invalid("WAIT"));
        assert!(is_invalid("WAIT soon"));
        assert!(is_invalid("SHOW ME"));
        assert!(is_invalid("BACKUP now"));
    }

    #[test]
    fn grammar_bounds_are_enforced() {
        let long = "k".repeat(MAX_STRING_SIZE + 1);
        assert!(is_invalid(&format!("READ [{long}]")));
        assert!(parse_line(&format!("READ [{}]", "k".repeat(MAX_STRING_SIZE)))
            .map_or(false, |c| matches!(c, Command::Read(_))));

        let pairs: String = (0..MAX_WRITE_PAIRS + 1).map(|i| format!("(k{i},v)")).collect();
        assert!(is_invalid(&format!("WRITE [{pairs}]")));

        let pairs: String = (0..MAX_WRITE_PAIRS).map(|i| format!("(k{i},v)")).collect();
        assert!(matches!(
            parsed(&format!("WRITE [{pairs}]")),
            Command::Write(p) if p.len() == MAX_WRITE_PAIRS
        ));
    }

    #[test]
    fn numeric_keys_and_values_are_plain_arguments() {
        assert_eq!(
            parsed("WRITE [(42,007)]"),
            Command::Write(vec![("42".to_string(), "007".to_string())])
        );
        assert_eq!(parsed("READ [42]"), Command::Read(vec!["42".to_string()]));
    }
}
