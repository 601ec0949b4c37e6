//! Keyword registry shared by the unified scanner and the CHTL-JS parser.
//!
//! The base table covers the built-in CHTL-JS forms; CJMOD modules contribute
//! further keywords with attached extension handles. Registration happens
//! during the pre-scan module pass; during scanning the registry is
//! read-only.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

/// Contract a CJMOD extension fulfils. Native modules are adapted onto this
/// trait by the loader; tests register in-process implementations directly.
pub trait SyntaxExtension {
    fn name(&self) -> String;
    fn version(&self) -> String;
    fn keywords(&self) -> Vec<String>;
    /// Quick filter used before committing to a full parse.
    fn matches_syntax(&self, pattern: &str, context: &str) -> bool;
    /// Returns an opaque payload the resolution engine carries untouched.
    fn parse_syntax(&self, input: &str, context: &str) -> Result<String, String>;
    /// Called by the JS generator on foreign nodes owned by this extension.
    fn generate_javascript(&self, payload: &str, context: &str) -> Result<String, String>;
    fn initialize(&self) -> Result<(), String>;
    fn cleanup(&self);
}

impl fmt::Debug for dyn SyntaxExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyntaxExtension({} v{})", self.name(), self.version())
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateKeyword {
    pub keyword: String,
    pub owner: String,
}

/// Keywords active inside CHTL-JS regions. `{{`, `->` and `=>` are lexical
/// forms handled by the tokenizers; the named forms live here.
const BASE_KEYWORDS: &[&str] = &["listen", "delegate", "animate", "vir"];

#[derive(Clone, Default)]
pub struct KeywordRegistry {
    base: HashSet<&'static str>,
    extensions: IndexMap<String, Arc<dyn SyntaxExtension>>,
}

impl fmt::Debug for KeywordRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeywordRegistry")
            .field("base", &self.base)
            .field("extension_keywords", &self.extensions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl KeywordRegistry {
    pub fn new() -> Self {
        KeywordRegistry {
            base: BASE_KEYWORDS.iter().copied().collect(),
            extensions: IndexMap::new(),
        }
    }

    /// Register every keyword an extension declares. Two modules claiming the
    /// same keyword is a load-time error, including across nested script
    /// blocks; the first registration wins and the conflict is reported.
    pub fn register_extension(
        &mut self,
        extension: Arc<dyn SyntaxExtension>,
    ) -> Result<(), DuplicateKeyword> {
        for keyword in extension.keywords() {
            if self.base.contains(keyword.as_str()) {
                return Err(DuplicateKeyword {
                    keyword,
                    owner: "the CHTL-JS base dialect".to_string(),
                });
            }
            if let Some(existing) = self.extensions.get(&keyword) {
                return Err(DuplicateKeyword {
                    keyword,
                    owner: existing.name(),
                });
            }
            self.extensions.insert(keyword, extension.clone());
        }
        Ok(())
    }

    pub fn extension_for(&self, keyword: &str) -> Option<Arc<dyn SyntaxExtension>> {
        self.extensions.get(keyword).cloned()
    }

    pub fn is_extension_keyword(&self, word: &str) -> bool {
        self.extensions.contains_key(word)
    }

    pub fn is_base_keyword(&self, word: &str) -> bool {
        self.base.contains(word)
    }

    /// True when seeing `word` inside a script region means the surrounding
    /// fragment is CHTL-JS rather than plain JavaScript.
    pub fn is_chtl_js_trigger(&self, word: &str) -> bool {
        self.is_base_keyword(word) || self.is_extension_keyword(word)
    }

    pub fn extension_keywords(&self) -> impl Iterator<Item = &str> {
        self.extensions.keys().map(String::as_str)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// In-process extension used by scanner and module tests.
    pub struct StubExtension {
        pub ext_name: String,
        pub kw: Vec<String>,
    }

    impl SyntaxExtension for StubExtension {
        fn name(&self) -> String {
            self.ext_name.clone()
        }
        fn version(&self) -> String {
            "1.0.0".to_string()
        }
        fn keywords(&self) -> Vec<String> {
            self.kw.clone()
        }
        fn matches_syntax(&self, pattern: &str, _context: &str) -> bool {
            self.kw.iter().any(|k| pattern.starts_with(k.as_str()))
        }
        fn parse_syntax(&self, input: &str, _context: &str) -> Result<String, String> {
            Ok(input.to_string())
        }
        fn generate_javascript(&self, payload: &str, _context: &str) -> Result<String, String> {
            Ok(format!("/* {} */", payload))
        }
        fn initialize(&self) -> Result<(), String> {
            Ok(())
        }
        fn cleanup(&self) {}
    }
}
