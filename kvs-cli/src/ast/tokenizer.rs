use std::ops::Range;

use logos::{Lexer, Logos};

use crate::ast::token_kind::TokenKind;

type Result<T> = std::result::Result<T, String>;

/// A lexed token, keeping a borrow of the source line for diagnostics.
#[derive(Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub source: &'a str,
    pub slice: &'a str,
    pub kind: TokenKind,
    pub span: Range<usize>,
}

impl<'a> Token<'a> {
    pub fn text(&self) -> &'a str {
        &self.source[self.span.clone()]
    }
}

impl<'a> std::fmt::Debug for Token<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({:?})", self.kind, self.span)
    }
}

pub struct Tokenizer<'a> {
    source: &'a str,
    lexer: Lexer<'a, TokenKind>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Tokenizer { source, lexer: TokenKind::lexer(source) }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lexer.next() {
            Some(Err(_)) => Some(Err(format!(
                "unrecognized token at byte {}",
                self.lexer.span().start
            ))),
            Some(Ok(kind)) => Some(Ok(Token {
                source: self.source,
                slice: self.lexer.slice(),
                kind,
                span: self.lexer.span(),
            })),
            None => None,
        }
    }
}

/// Lexes one line; blank and comment-only lines come back empty.
pub fn tokenize_line(line: &str) -> Result<Vec<Token<'_>>> {
    Tokenizer::new(line).collect::<Result<Vec<_>>>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(line: &str) -> Vec<TokenKind> {
        tokenize_line(line).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_a_write_line() {
        assert_eq!(
            kinds("WRITE [(a,1)(b,2)]"),
            vec![
                TokenKind::Write,
                TokenKind::LBracket,
                TokenKind::LParen,
                TokenKind::Ident,
                TokenKind::Comma,
                TokenKind::LiteralInteger,
                TokenKind::RParen,
                TokenKind::LParen,
                TokenKind::Ident,
                TokenKind::Comma,
                TokenKind::LiteralInteger,
                TokenKind::RParen,
                TokenKind::RBracket,
            ]
        );
    }

    #[test]
    fn comments_and_blanks_lex_to_nothing() {
        assert!(kinds("").is_empty());
        assert!(kinds("   ").is_empty());
        assert!(kinds("# a comment").is_empty());
        assert_eq!(kinds("SHOW # trailing"), vec![TokenKind::Show]);
    }

    #[test]
    fn keywords_are_case_sensitive() {
        // Lowercase is just an argument token, never a command.
        assert_eq!(kinds("write"), vec![TokenKind::Ident]);
        assert_eq!(kinds("WRITEX"), vec![TokenKind::Ident]);
        assert_eq!(kinds("WAIT 100"), vec![TokenKind::Wait, TokenKind::LiteralInteger]);
    }

    #[test]
    fn token_text_matches_the_slice() {
        let tokens = tokenize_line("READ [order_key]").unwrap();
        assert_eq!(tokens[2].text(), "order_key");
        assert_eq!(tokens[2].slice, "order_key");
    }
}
