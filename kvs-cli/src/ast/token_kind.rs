use logos::Logos;

/// Token kinds shared by the `.job` script grammar and the client's command
/// language. Commands are case-sensitive uppercase words; everything that is
/// not punctuation, whitespace or a `#` comment is an argument token.
#[derive(Logos, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Whitespace,

    #[regex(r"#[^\n]*", logos::skip)]
    Comment,

    // Script commands.
    #[token("WRITE")]
    Write,
    #[token("READ")]
    Read,
    #[token("DELETE")]
    Delete,
    #[token("SHOW")]
    Show,
    #[token("WAIT")]
    Wait,
    #[token("BACKUP")]
    Backup,
    #[token("HELP")]
    Help,

    // Client commands.
    #[token("SUBSCRIBE")]
    Subscribe,
    #[token("UNSUBSCRIBE")]
    Unsubscribe,
    #[token("DELAY")]
    Delay,
    #[token("DISCONNECT")]
    Disconnect,

    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,

    #[regex(r"[0-9]+", priority = 3)]
    LiteralInteger,

    /// A bare key or value: any run of bytes that is not whitespace,
    /// punctuation or a comment opener.
    #[regex(r"[^ \t\r\f\n\[\](),#]+")]
    Ident,
}

impl TokenKind {
    /// Whether this token can stand for a key or value argument.
    pub fn is_argument(self) -> bool {
        matches!(self, TokenKind::Ident | TokenKind::LiteralInteger)
    }
}
