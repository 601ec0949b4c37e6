//! CHTL token model.
//!
//! The kind set is closed; adding a kind is a source-level change that every
//! `match` over [`TokenKind`] surfaces.

use serde::{Deserialize, Serialize};

use crate::parse_util::ParseSourceSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TokenKind {
    Identifier,
    StringLiteral,
    UnquotedLiteral,
    Number,

    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Colon,
    Semicolon,
    Comma,
    Equals,
    Dot,
    Hash,
    Ampersand,
    Percent,
    Minus,

    // Keyword blocks
    KwTemplate,
    KwCustom,
    KwOrigin,
    KwConfiguration,
    KwNamespace,
    KwImport,
    KwInfo,
    KwExport,

    // Type markers
    AtStyle,
    AtElement,
    AtVar,
    AtHtml,
    AtJavaScript,
    AtChtl,
    AtCJmod,
    /// `@Name` for a user-declared origin format.
    AtIdentifier,

    /// `-- text`, preserved through to the generated output.
    GeneratorComment,

    Eof,
}

impl TokenKind {
    pub fn is_at_marker(&self) -> bool {
        matches!(
            self,
            TokenKind::AtStyle
                | TokenKind::AtElement
                | TokenKind::AtVar
                | TokenKind::AtHtml
                | TokenKind::AtJavaScript
                | TokenKind::AtChtl
                | TokenKind::AtCJmod
                | TokenKind::AtIdentifier
        )
    }

    pub fn is_keyword_block(&self) -> bool {
        matches!(
            self,
            TokenKind::KwTemplate
                | TokenKind::KwCustom
                | TokenKind::KwOrigin
                | TokenKind::KwConfiguration
                | TokenKind::KwNamespace
                | TokenKind::KwImport
                | TokenKind::KwInfo
                | TokenKind::KwExport
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: ParseSourceSpan,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: String, span: ParseSourceSpan) -> Self {
        Token { kind, lexeme, span }
    }

    /// Name of an `@` type marker with the sigil stripped.
    pub fn at_name(&self) -> &str {
        self.lexeme.strip_prefix('@').unwrap_or(&self.lexeme)
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// True for an identifier with exactly this lexeme. Contextual keywords
    /// (`from`, `as`, `text`, `style`, `script`, ...) are matched this way
    /// rather than owning token kinds.
    pub fn is_ident(&self, text: &str) -> bool {
        self.kind == TokenKind::Identifier && self.lexeme == text
    }
}
