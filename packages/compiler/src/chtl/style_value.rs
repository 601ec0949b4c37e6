//! Whitespace policies for CSS property values.
//!
//! Values are re-assembled from tokens, so the joiner must know where CSS
//! forbids a space (`#336`, `10px`, `rgb(0,0,0)`) and where it requires one.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use super::tokens::{Token, TokenKind};

static CSS_UNITS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "px", "em", "rem", "ex", "ch", "vw", "vh", "vmin", "vmax", "cm", "mm", "in", "pt", "pc",
        "q", "s", "ms", "deg", "rad", "grad", "turn", "fr", "dpi", "dpcm", "dppx",
    ]
    .into_iter()
    .collect()
});

pub fn is_unit(text: &str) -> bool {
    CSS_UNITS.contains(text)
}

/// Join value tokens into CSS text, applying the spacing policies:
/// space-join by default; no space after `#`, `(`, `,` or before `)`, `,`;
/// no space between a number and a unit or `%`.
pub fn join_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 && !no_space_between(&tokens[i - 1], token) {
            out.push(' ');
        }
        out.push_str(render(token));
    }
    out
}

fn render(token: &Token) -> &str {
    &token.lexeme
}

fn no_space_between(prev: &Token, next: &Token) -> bool {
    // No space after an opening context.
    if matches!(prev.kind, TokenKind::Hash | TokenKind::LParen | TokenKind::Comma) {
        return true;
    }
    // No space before a closing context.
    if matches!(next.kind, TokenKind::RParen | TokenKind::Comma) {
        return true;
    }
    // A number glues to its unit or percent sign.
    if prev.kind == TokenKind::Number {
        if next.kind == TokenKind::Percent {
            return true;
        }
        if next.kind == TokenKind::Identifier && is_unit(&next.lexeme) {
            return true;
        }
    }
    // Function name glues to its argument list.
    if prev.kind == TokenKind::Identifier && next.kind == TokenKind::LParen {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticsSink;
    use crate::chtl::lexer::Lexer;
    use crate::parse_util::ParseSourceFile;

    fn tokens_of(source: &str) -> Vec<Token> {
        let sink = DiagnosticsSink::new();
        let mut lexer = Lexer::new(
            ParseSourceFile::new(source.to_string(), "t".to_string()),
            &sink,
        );
        let mut out = Vec::new();
        loop {
            let t = lexer.next_token();
            if t.kind == TokenKind::Eof {
                break;
            }
            out.push(t);
        }
        out
    }

    #[test]
    fn space_joined_by_default() {
        assert_eq!(join_tokens(&tokens_of("0 auto")), "0 auto");
        assert_eq!(join_tokens(&tokens_of("1px solid red")), "1px solid red");
    }

    #[test]
    fn number_glues_to_unit_and_percent() {
        assert_eq!(join_tokens(&tokens_of("10px")), "10px");
        assert_eq!(join_tokens(&tokens_of("1.5em")), "1.5em");
        assert_eq!(join_tokens(&tokens_of("100%")), "100%");
    }

    #[test]
    fn hash_color_has_no_inner_space() {
        assert_eq!(join_tokens(&tokens_of("#336")), "#336");
        assert_eq!(join_tokens(&tokens_of("#aabbcc")), "#aabbcc");
    }

    #[test]
    fn function_calls_stay_tight() {
        assert_eq!(join_tokens(&tokens_of("rgb(255,0,0)")), "rgb(255,0,0)");
    }

    #[test]
    fn negative_number_keeps_leading_space() {
        assert_eq!(join_tokens(&tokens_of("margin -5px")), "margin -5px");
    }

    #[test]
    fn unknown_suffix_is_a_separate_token() {
        assert_eq!(join_tokens(&tokens_of("10 foo")), "10 foo");
    }
}
