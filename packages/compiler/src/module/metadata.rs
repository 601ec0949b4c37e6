//! Module metadata: the `[Info]` and `[Export]` blocks of
//! `info/<Name>.chtl`, parsed with the regular CHTL lexer but a dedicated
//! grammar.

use crate::chtl::ast::RefKind;
use crate::chtl::lexer::Lexer;
use crate::chtl::tokens::{Token, TokenKind};
use crate::diagnostics::{DiagnosticsSink, FatalError, FatalResult};
use crate::parse_util::ParseSourceFile;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub license: String,
    pub dependencies: Vec<String>,
    pub category: String,
    pub min_chtl_version: Option<String>,
    pub max_chtl_version: Option<String>,
    // CJMOD only
    pub entry_point: Option<String>,
    pub header_files: Vec<String>,
    pub link_libraries: Vec<String>,
    pub compiler_flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleExport {
    pub kind: RefKind,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleMetadata {
    pub info: ModuleInfo,
    /// `None` publishes every declaration.
    pub exports: Option<Vec<ModuleExport>>,
}

/// Parse the metadata file. Missing required fields (`name`, `version`) are
/// a module error, fatal to the load.
pub fn parse_metadata(source: &str, url: &str, sink: &DiagnosticsSink) -> FatalResult<ModuleMetadata> {
    let file = ParseSourceFile::new(source.to_string(), url.to_string());
    let mut lexer = Lexer::new(file, sink);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            break;
        }
    }

    let mut metadata = ModuleMetadata::default();
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i].kind {
            TokenKind::KwInfo => {
                i = parse_info_block(&tokens, i + 1, &mut metadata.info, url)?;
            }
            TokenKind::KwExport => {
                let mut exports = Vec::new();
                i = parse_export_block(&tokens, i + 1, &mut exports, url)?;
                metadata.exports = Some(exports);
            }
            TokenKind::Eof => break,
            _ => i += 1,
        }
    }

    if metadata.info.name.is_empty() {
        return Err(FatalError::Module(format!(
            "{}: [Info] block is missing the required 'name' field",
            url
        )));
    }
    if metadata.info.version.is_empty() {
        return Err(FatalError::Module(format!(
            "{}: [Info] block is missing the required 'version' field",
            url
        )));
    }
    Ok(metadata)
}

fn expect_brace(tokens: &[Token], i: usize, url: &str) -> FatalResult<usize> {
    if tokens.get(i).map(|t| t.kind) != Some(TokenKind::LBrace) {
        return Err(FatalError::Module(format!("{}: expected '{{' in metadata block", url)));
    }
    Ok(i + 1)
}

fn parse_info_block(
    tokens: &[Token],
    i: usize,
    info: &mut ModuleInfo,
    url: &str,
) -> FatalResult<usize> {
    let mut i = expect_brace(tokens, i, url)?;
    while i < tokens.len() {
        match tokens[i].kind {
            TokenKind::RBrace => return Ok(i + 1),
            TokenKind::Eof => {
                return Err(FatalError::Module(format!("{}: unterminated [Info] block", url)));
            }
            TokenKind::Semicolon => i += 1,
            TokenKind::Identifier => {
                let key = tokens[i].lexeme.clone();
                i += 1;
                if matches!(
                    tokens.get(i).map(|t| t.kind),
                    Some(TokenKind::Equals) | Some(TokenKind::Colon)
                ) {
                    i += 1;
                }
                let mut value = String::new();
                while i < tokens.len()
                    && !matches!(tokens[i].kind, TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof)
                {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(&tokens[i].lexeme);
                    i += 1;
                }
                apply_info_field(info, &key, &value);
            }
            _ => i += 1,
        }
    }
    Err(FatalError::Module(format!("{}: unterminated [Info] block", url)))
}

fn apply_info_field(info: &mut ModuleInfo, key: &str, value: &str) {
    let list = || {
        value
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
    };
    match key {
        "name" => info.name = value.to_string(),
        "version" => info.version = value.to_string(),
        "description" => info.description = value.to_string(),
        "author" => info.author = value.to_string(),
        "license" => info.license = value.to_string(),
        "dependencies" => info.dependencies = list(),
        "category" => info.category = value.to_string(),
        "minCHTLVersion" => info.min_chtl_version = Some(value.to_string()),
        "maxCHTLVersion" => info.max_chtl_version = Some(value.to_string()),
        "entryPoint" => info.entry_point = Some(value.to_string()),
        "headerFiles" => info.header_files = list(),
        "linkLibraries" => info.link_libraries = list(),
        "compilerFlags" => info.compiler_flags = list(),
        _ => {}
    }
}

fn parse_export_block(
    tokens: &[Token],
    i: usize,
    exports: &mut Vec<ModuleExport>,
    url: &str,
) -> FatalResult<usize> {
    let mut i = expect_brace(tokens, i, url)?;
    while i < tokens.len() {
        match tokens[i].kind {
            TokenKind::RBrace => return Ok(i + 1),
            TokenKind::Eof => {
                return Err(FatalError::Module(format!("{}: unterminated [Export] block", url)));
            }
            TokenKind::Semicolon | TokenKind::Comma => i += 1,
            TokenKind::AtStyle | TokenKind::AtElement | TokenKind::AtVar => {
                let kind = match tokens[i].kind {
                    TokenKind::AtStyle => RefKind::Style,
                    TokenKind::AtElement => RefKind::Element,
                    _ => RefKind::Var,
                };
                i += 1;
                if tokens.get(i).map(|t| t.kind) == Some(TokenKind::Identifier) {
                    exports.push(ModuleExport { kind, name: tokens[i].lexeme.clone() });
                    i += 1;
                } else {
                    return Err(FatalError::Module(format!(
                        "{}: [Export] entry is missing a name",
                        url
                    )));
                }
            }
            _ => i += 1,
        }
    }
    Err(FatalError::Module(format!("{}: unterminated [Export] block", url)))
}

/// Compare dotted numeric versions; tolerant of unequal lengths.
pub fn version_in_range(version: &str, min: Option<&str>, max: Option<&str>) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.').filter_map(|part| part.trim().parse::<u64>().ok()).collect()
    };
    let current = parse(version);
    if let Some(min) = min {
        if current < parse(min) {
            return false;
        }
    }
    if let Some(max) = max {
        if current > parse(max) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[Info] {
    name = "Chtholly";
    version = "1.2.0";
    description = "Theme components";
    author = "chtl";
    license = "MIT";
    dependencies = "Base, Colors";
    minCHTLVersion = "1.0";
}

[Export] {
    @Style ChthollyStyle;
    @Element Card;
    @Var Palette;
}
"#;

    #[test]
    fn parses_info_and_exports() {
        let sink = DiagnosticsSink::new();
        let metadata = parse_metadata(SAMPLE, "info/Chtholly.chtl", &sink).unwrap();
        assert_eq!(metadata.info.name, "Chtholly");
        assert_eq!(metadata.info.version, "1.2.0");
        assert_eq!(metadata.info.dependencies, vec!["Base", "Colors"]);
        let exports = metadata.exports.unwrap();
        assert_eq!(exports.len(), 3);
        assert_eq!(exports[1], ModuleExport { kind: RefKind::Element, name: "Card".to_string() });
    }

    #[test]
    fn missing_name_is_a_module_error() {
        let sink = DiagnosticsSink::new();
        let err = parse_metadata("[Info] { version = \"1.0\"; }", "info/x.chtl", &sink).unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn missing_version_is_a_module_error() {
        let sink = DiagnosticsSink::new();
        let err = parse_metadata("[Info] { name = \"x\"; }", "info/x.chtl", &sink).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn version_ranges() {
        assert!(version_in_range("1.2.0", Some("1.0"), Some("2.0")));
        assert!(!version_in_range("0.9", Some("1.0"), None));
        assert!(!version_in_range("2.1", None, Some("2.0")));
        assert!(version_in_range("1.0", None, None));
    }

    #[test]
    fn cjmod_fields() {
        let sink = DiagnosticsSink::new();
        let source = r#"[Info] {
            name = "printMylove";
            version = "0.1.0";
            entryPoint = "create_extension";
            linkLibraries = "m, pthread";
            compilerFlags = "-O2, -std=c++17";
        }"#;
        let metadata = parse_metadata(source, "info/p.chtl", &sink).unwrap();
        assert_eq!(metadata.info.entry_point.as_deref(), Some("create_extension"));
        assert_eq!(metadata.info.link_libraries, vec!["m", "pthread"]);
        assert_eq!(metadata.info.compiler_flags, vec!["-O2", "-std=c++17"]);
        assert!(metadata.exports.is_none());
    }
}
