//! Character constants and predicates shared by the lexers and the scanner.

#![allow(non_upper_case_globals)]

pub const EOF: char = '\0';
pub const TAB: char = '\t';
pub const LF: char = '\n';
pub const NEWLINE: char = '\n';
pub const CR: char = '\r';
pub const SPACE: char = ' ';

pub const BANG: char = '!';
pub const DQ: char = '"';
pub const HASH: char = '#';
pub const PERCENT: char = '%';
pub const AMPERSAND: char = '&';
pub const SQ: char = '\'';
pub const LPAREN: char = '(';
pub const RPAREN: char = ')';
pub const STAR: char = '*';
pub const PLUS: char = '+';
pub const COMMA: char = ',';
pub const MINUS: char = '-';
pub const PERIOD: char = '.';
pub const SLASH: char = '/';
pub const COLON: char = ':';
pub const SEMICOLON: char = ';';
pub const LT: char = '<';
pub const EQ: char = '=';
pub const GT: char = '>';
pub const AT: char = '@';

pub const LBRACKET: char = '[';
pub const BACKSLASH: char = '\\';
pub const RBRACKET: char = ']';
pub const UNDERSCORE: char = '_';

pub const LBRACE: char = '{';
pub const RBRACE: char = '}';

pub fn is_whitespace(c: char) -> bool {
    c == SPACE || c == TAB || c == LF || c == CR || c == '\x0C'
}

pub fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

/// First character of an identifier.
pub fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == UNDERSCORE
}

/// Subsequent character of an identifier. Hyphens are admitted because CSS
/// property names and custom tag names flow through the same lexer.
pub fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == UNDERSCORE || c == MINUS
}

pub fn is_quote(c: char) -> bool {
    c == DQ || c == SQ
}
