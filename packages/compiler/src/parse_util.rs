//! Source files, locations, spans and recoverable parse errors.

use serde::{Deserialize, Serialize};

use crate::chars;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParseSourceFile {
    pub content: String,
    pub url: String,
}

impl ParseSourceFile {
    pub fn new(content: String, url: String) -> Self {
        ParseSourceFile { content, url }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParseLocation {
    pub file: ParseSourceFile,
    pub offset: usize,
    pub line: usize,
    pub col: usize,
}

impl ParseLocation {
    pub fn new(file: ParseSourceFile, offset: usize, line: usize, col: usize) -> Self {
        ParseLocation { file, offset, line, col }
    }

    /// Start-of-file location.
    pub fn start_of(file: &ParseSourceFile) -> Self {
        ParseLocation::new(file.clone(), 0, 0, 0)
    }

    pub fn display(&self) -> String {
        format!("{}:{}:{}", self.file.url, self.line + 1, self.col + 1)
    }

    /// Return up to `max_chars` of source on each side of the location,
    /// clipped to `max_lines` lines per side.
    pub fn get_context(&self, max_chars: usize, max_lines: usize) -> Option<(String, String)> {
        let content = &self.file.content;
        if content.is_empty() {
            return None;
        }
        let bytes = content.as_bytes();
        let anchor = self.offset.min(content.len());

        let mut start = anchor;
        let mut lines = 0;
        while start > 0 && anchor - start < max_chars {
            start -= 1;
            if bytes[start] == b'\n' {
                lines += 1;
                if lines >= max_lines {
                    start += 1;
                    break;
                }
            }
        }
        while !content.is_char_boundary(start) {
            start -= 1;
        }

        let mut end = anchor;
        lines = 0;
        while end < content.len() && end - anchor < max_chars {
            if bytes[end] == b'\n' {
                lines += 1;
                if lines >= max_lines {
                    break;
                }
            }
            end += 1;
        }
        while !content.is_char_boundary(end) {
            end += 1;
        }

        Some((content[start..anchor].to_string(), content[anchor..end].to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParseSourceSpan {
    pub start: ParseLocation,
    pub end: ParseLocation,
    pub details: Option<String>,
}

impl ParseSourceSpan {
    pub fn new(start: ParseLocation, end: ParseLocation) -> Self {
        ParseSourceSpan { start, end, details: None }
    }

    /// Zero-width span at the start of a file; used for synthesized nodes.
    pub fn empty(file: &ParseSourceFile) -> Self {
        let loc = ParseLocation::start_of(file);
        ParseSourceSpan::new(loc.clone(), loc)
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }

    /// The source text covered by this span.
    pub fn text(&self) -> &str {
        let content = &self.start.file.content;
        let end = self.end.offset.min(content.len());
        let start = self.start.offset.min(end);
        &content[start..end]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseErrorLevel {
    Warning,
    Error,
}

/// A recoverable error attached to a source span. These accumulate in the
/// diagnostics sink; only fatal pipeline errors abort a compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseError {
    pub span: ParseSourceSpan,
    pub msg: String,
    pub level: ParseErrorLevel,
}

impl ParseError {
    pub fn new(span: ParseSourceSpan, msg: String) -> Self {
        ParseError { span, msg, level: ParseErrorLevel::Error }
    }

    pub fn warning(span: ParseSourceSpan, msg: String) -> Self {
        ParseError { span, msg, level: ParseErrorLevel::Warning }
    }

    pub fn contextual_message(&self) -> String {
        if let Some((before, after)) = self.span.start.get_context(40, 2) {
            format!("{} (\"{}[->]{}\")", self.msg, before.replace('\n', " "), after.replace('\n', " "))
        } else {
            self.msg.clone()
        }
    }
}

/// Count lines and the trailing column of `text`, starting from `(line, col)`.
pub fn advance_position(text: &str, line: usize, col: usize) -> (usize, usize) {
    let mut line = line;
    let mut col = col;
    for c in text.chars() {
        if c == chars::NEWLINE {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
    }
    (line, col)
}
