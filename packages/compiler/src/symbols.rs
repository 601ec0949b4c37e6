//! Global symbol map: the namespaced registry of templates, customs, origins
//! and configurations.
//!
//! Declarations self-register while parsing runs; after parse the map is
//! read-only. Each compilation unit owns its own map.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::chtl::ast::{DeclKind, Node};
use crate::parse_util::ParseSourceSpan;

pub const NAMESPACE_SEPARATOR: char = '.';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalKind {
    TemplateStyle,
    TemplateElement,
    TemplateVar,
    CustomStyle,
    CustomElement,
    CustomVar,
    Origin,
    Configuration,
}

impl GlobalKind {
    pub fn template(kind: DeclKind) -> Self {
        match kind {
            DeclKind::Style => GlobalKind::TemplateStyle,
            DeclKind::Element => GlobalKind::TemplateElement,
            DeclKind::Var => GlobalKind::TemplateVar,
        }
    }

    pub fn custom(kind: DeclKind) -> Self {
        match kind {
            DeclKind::Style => GlobalKind::CustomStyle,
            DeclKind::Element => GlobalKind::CustomElement,
            DeclKind::Var => GlobalKind::CustomVar,
        }
    }

    pub fn decl_kind(&self) -> Option<DeclKind> {
        match self {
            GlobalKind::TemplateStyle | GlobalKind::CustomStyle => Some(DeclKind::Style),
            GlobalKind::TemplateElement | GlobalKind::CustomElement => Some(DeclKind::Element),
            GlobalKind::TemplateVar | GlobalKind::CustomVar => Some(DeclKind::Var),
            _ => None,
        }
    }
}

impl fmt::Display for GlobalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GlobalKind::TemplateStyle => "[Template] @Style",
            GlobalKind::TemplateElement => "[Template] @Element",
            GlobalKind::TemplateVar => "[Template] @Var",
            GlobalKind::CustomStyle => "[Custom] @Style",
            GlobalKind::CustomElement => "[Custom] @Element",
            GlobalKind::CustomVar => "[Custom] @Var",
            GlobalKind::Origin => "[Origin]",
            GlobalKind::Configuration => "[Configuration]",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct GlobalObject {
    pub kind: GlobalKind,
    pub qualified_name: String,
    pub namespace_path: Vec<String>,
    pub defining_file: String,
    pub span: ParseSourceSpan,
    /// The declaration subtree. Shared, never mutated after registration.
    pub body: Rc<Node>,
}

impl GlobalObject {
    /// The unqualified trailing segment of the name.
    pub fn local_name(&self) -> &str {
        self.qualified_name
            .rsplit(NAMESPACE_SEPARATOR)
            .next()
            .unwrap_or(&self.qualified_name)
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateError {
    pub existing_span: ParseSourceSpan,
    pub qualified_name: String,
}

pub fn qualify(namespace_path: &[String], name: &str) -> String {
    if namespace_path.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", namespace_path.join("."), NAMESPACE_SEPARATOR, name)
    }
}

/// Registry keyed by `(kind, qualified_name)`. Uniqueness is enforced within
/// a namespace scope; the same local name may recur in sibling namespaces.
#[derive(Debug, Default)]
pub struct GlobalSymbolMap {
    entries: RefCell<IndexMap<(GlobalKind, String), Rc<GlobalObject>>>,
}

impl GlobalSymbolMap {
    pub fn new() -> Self {
        GlobalSymbolMap::default()
    }

    pub fn register(&self, obj: GlobalObject) -> Result<Rc<GlobalObject>, DuplicateError> {
        let key = (obj.kind, obj.qualified_name.clone());
        let mut entries = self.entries.borrow_mut();
        if let Some(existing) = entries.get(&key) {
            return Err(DuplicateError {
                existing_span: existing.span.clone(),
                qualified_name: obj.qualified_name,
            });
        }
        let obj = Rc::new(obj);
        entries.insert(key, obj.clone());
        Ok(obj)
    }

    /// Resolve `name` relative to `from_namespace`: an already-qualified name
    /// is looked up exactly; otherwise the namespace and its ancestors are
    /// searched innermost-first, ending at the root.
    pub fn find(
        &self,
        kind: GlobalKind,
        name: &str,
        from_namespace: &[String],
    ) -> Option<Rc<GlobalObject>> {
        let entries = self.entries.borrow();
        if name.contains(NAMESPACE_SEPARATOR) {
            return entries.get(&(kind, name.to_string())).cloned();
        }
        for depth in (0..=from_namespace.len()).rev() {
            let qualified = qualify(&from_namespace[..depth], name);
            if let Some(found) = entries.get(&(kind, qualified)) {
                return Some(found.clone());
            }
        }
        None
    }

    /// All objects of `kind` declared directly inside `namespace`.
    pub fn enumerate(&self, kind: GlobalKind, namespace: &[String]) -> Vec<Rc<GlobalObject>> {
        self.entries
            .borrow()
            .values()
            .filter(|obj| obj.kind == kind && obj.namespace_path == namespace)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chtl::ast::{Root, Node};
    use crate::parse_util::{ParseLocation, ParseSourceFile, ParseSourceSpan};

    fn dummy_body() -> Rc<Node> {
        let f = ParseSourceFile::new(String::new(), "t.chtl".to_string());
        Rc::new(Node::Root(Root { children: vec![], span: ParseSourceSpan::empty(&f) }))
    }

    fn obj(kind: GlobalKind, namespace: &[&str], name: &str) -> GlobalObject {
        let namespace_path: Vec<String> = namespace.iter().map(|s| s.to_string()).collect();
        let f = ParseSourceFile::new(String::new(), "t.chtl".to_string());
        GlobalObject {
            kind,
            qualified_name: qualify(&namespace_path, name),
            namespace_path,
            defining_file: "t.chtl".to_string(),
            span: ParseSourceSpan::new(ParseLocation::start_of(&f), ParseLocation::start_of(&f)),
            body: dummy_body(),
        }
    }

    #[test]
    fn register_and_find_in_root() {
        let map = GlobalSymbolMap::new();
        map.register(obj(GlobalKind::TemplateVar, &[], "Theme")).unwrap();
        assert!(map.find(GlobalKind::TemplateVar, "Theme", &[]).is_some());
        assert!(map.find(GlobalKind::TemplateStyle, "Theme", &[]).is_none());
    }

    #[test]
    fn duplicate_in_same_namespace_collides() {
        let map = GlobalSymbolMap::new();
        map.register(obj(GlobalKind::CustomElement, &["ui"], "Box")).unwrap();
        let err = map.register(obj(GlobalKind::CustomElement, &["ui"], "Box")).unwrap_err();
        assert_eq!(err.qualified_name, "ui.Box");
    }

    #[test]
    fn same_name_in_sibling_namespaces_is_fine() {
        let map = GlobalSymbolMap::new();
        map.register(obj(GlobalKind::TemplateStyle, &["a"], "S")).unwrap();
        map.register(obj(GlobalKind::TemplateStyle, &["b"], "S")).unwrap();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn find_searches_ancestors_then_root() {
        let map = GlobalSymbolMap::new();
        map.register(obj(GlobalKind::TemplateStyle, &[], "Base")).unwrap();
        map.register(obj(GlobalKind::TemplateStyle, &["outer"], "Mid")).unwrap();
        let from = vec!["outer".to_string(), "inner".to_string()];
        assert_eq!(
            map.find(GlobalKind::TemplateStyle, "Mid", &from).unwrap().qualified_name,
            "outer.Mid"
        );
        assert_eq!(
            map.find(GlobalKind::TemplateStyle, "Base", &from).unwrap().qualified_name,
            "Base"
        );
    }

    #[test]
    fn qualified_name_bypasses_search() {
        let map = GlobalSymbolMap::new();
        map.register(obj(GlobalKind::CustomVar, &["theme"], "Colors")).unwrap();
        assert!(map.find(GlobalKind::CustomVar, "theme.Colors", &[]).is_some());
        assert!(map.find(GlobalKind::CustomVar, "other.Colors", &[]).is_none());
    }

    #[test]
    fn enumerate_filters_by_namespace() {
        let map = GlobalSymbolMap::new();
        map.register(obj(GlobalKind::Origin, &["m"], "A")).unwrap();
        map.register(obj(GlobalKind::Origin, &["m"], "B")).unwrap();
        map.register(obj(GlobalKind::Origin, &[], "C")).unwrap();
        assert_eq!(map.enumerate(GlobalKind::Origin, &["m".to_string()]).len(), 2);
    }
}
