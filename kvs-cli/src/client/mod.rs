pub mod api;

use crate::ast::parser::MAX_STRING_SIZE;
use crate::ast::token_kind::TokenKind;
use crate::ast::tokenizer::{tokenize_line, Token};

/// One parsed client command.
///
/// The client language is the session-side sibling of the `.job` grammar:
///
/// ```doc
/// SUBSCRIBE [key]
/// UNSUBSCRIBE [key]
/// DELAY <ms>
/// DISCONNECT
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientCommand {
    Subscribe(String),
    Unsubscribe(String),
    Delay(u64),
    Disconnect,
    Invalid(String),
}

/// Parses one stdin line; `None` for blank or comment-only lines.
pub fn parse_client_line(line: &str) -> Option<ClientCommand> {
    let tokens = match tokenize_line(line) {
        Ok(tokens) => tokens,
        Err(reason) => return Some(ClientCommand::Invalid(reason)),
    };
    let Some((head, rest)) = tokens.split_first() else {
        return None;
    };

    let parsed = match head.kind {
        TokenKind::Subscribe => single_key(rest).map(ClientCommand::Subscribe),
        TokenKind::Unsubscribe => single_key(rest).map(ClientCommand::Unsubscribe),
        TokenKind::Delay => parse_delay(rest),
        TokenKind::Disconnect if rest.is_empty() => Ok(ClientCommand::Disconnect),
        TokenKind::Disconnect => Err("trailing tokens after DISCONNECT".to_string()),
        _ => Err(format!("unknown command {:?}", head.slice)),
    };
    Some(parsed.unwrap_or_else(ClientCommand::Invalid))
}

/// `[key]` — a bracketed list of exactly one key.
fn single_key(rest: &[Token<'_>]) -> Result<String, String> {
    match rest {
        [open, key, close]
            if open.kind == TokenKind::LBracket
                && key.kind.is_argument()
                && close.kind == TokenKind::RBracket =>
        {
            if key.slice.len() > MAX_STRING_SIZE {
                return Err(format!(
                    "key of {} bytes exceeds {MAX_STRING_SIZE} bytes",
                    key.slice.len()
                ));
            }
            Ok(key.slice.to_string())
        }
        _ => Err("expected a bracketed key".to_string()),
    }
}

fn parse_delay(rest: &[Token<'_>]) -> Result<ClientCommand, String> {
    match rest {
        [delay] if delay.kind == TokenKind::LiteralInteger => delay
            .slice
            .parse::<u64>()
            .map(ClientCommand::Delay)
            .map_err(|err| format!("bad delay {:?}: {err}", delay.slice)),
        _ => Err("DELAY takes a single millisecond count".to_string()),
    }
}

/// Usage text printed when a line fails to parse.
pub fn usage() -> &'static str {
    "Available commands:\n  SUBSCRIBE [key]\n  UNSUBSCRIBE [key]\n  DELAY <delay_ms>\n  DISCONNECT\n"
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_the_client_language() {
        assert_eq!(
            parse_client_line("SUBSCRIBE [order1]"),
            Some(ClientCommand::Subscribe("order1".to_string()))
        );
        assert_eq!(
            parse_client_line("UNSUBSCRIBE [order1]"),
            Some(ClientCommand::Unsubscribe("order1".to_string()))
        );
        assert_eq!(parse_client_line("DELAY 250"), Some(ClientCommand::Delay(250)));
        assert_eq!(parse_client_line("DISCONNECT"), Some(ClientCommand::Disconnect));
    }

    #[test]
    fn blanks_and_comments_are_skipped() {
        assert_eq!(parse_client_line(""), None);
        assert_eq!(parse_client_line("# note"), None);
    }

    #[test]
    fn malformed_client_lines_are_invalid() {
        for line in [
            "SUBSCRIBE",
            "SUBSCRIBE order1",
            "SUBSCRIBE [a,b]",
            "DELAY",
            "DELAY soon",
            "DISCONNECT now",
            "WRITE [(a,1)]",
        ] {
            assert!(
                matches!(parse_client_line(line), Some(ClientCommand::Invalid(_))),
                "{line:?} should be invalid"
            );
        }
    }

    #[test]
    fn keys_keep_the_grammar_bound() {
        let long = "k".repeat(MAX_STRING_SIZE + 1);
        assert!(matches!(
            parse_client_line(&format!("SUBSCRIBE [{long}]")),
            Some(ClientCommand::Invalid(_))
        ));
    }
}
