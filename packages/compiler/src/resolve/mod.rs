//! Resolution engine.
//!
//! Runs between parse and generation: inheritance merging, specialization
//! application, reference expansion, variable substitution and constraint
//! checking. The engine never mutates the parsed tree; it produces a resolved
//! clone in which no reference nodes remain, so resolving an already
//! resolved tree is a no-op.

pub mod imports;

use std::rc::Rc;

use indexmap::IndexMap;

use crate::chtl::ast::*;
use crate::diagnostics::{DiagnosticKind, DiagnosticsSink};
use crate::parse_util::ParseSourceSpan;
use crate::symbols::{GlobalKind, GlobalObject, GlobalSymbolMap};

pub struct Resolver<'a> {
    map: &'a GlobalSymbolMap,
    sink: &'a DiagnosticsSink,
    namespace: Vec<String>,
    /// Qualified names currently being expanded; cycle guard.
    active: Vec<String>,
}

impl<'a> Resolver<'a> {
    pub fn new(map: &'a GlobalSymbolMap, sink: &'a DiagnosticsSink) -> Self {
        Resolver {
            map,
            sink,
            namespace: Vec::new(),
            active: Vec::new(),
        }
    }

    pub fn resolve(&mut self, root: &Root) -> Root {
        let children = self.resolve_nodes(&root.children);
        self.check_namespace_constraints(&children);
        Root { children, span: root.span.clone() }
    }

    fn error(&self, span: &ParseSourceSpan, msg: String) {
        self.sink
            .error(DiagnosticKind::Resolution, msg, Some(span.clone()));
    }

    // ---- tree walk ------------------------------------------------------

    fn resolve_nodes(&mut self, nodes: &[Node]) -> Vec<Node> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Element(element) => {
                    out.push(Node::Element(self.resolve_element(element)));
                }
                Node::Namespace(ns) => {
                    self.namespace.push(ns.name.clone());
                    let body = self.resolve_nodes(&ns.body);
                    self.namespace.pop();
                    out.push(Node::Namespace(NamespaceDecl {
                        name: ns.name.clone(),
                        body,
                        span: ns.span.clone(),
                    }));
                }
                Node::StyleBlock(style) => {
                    out.push(Node::StyleBlock(self.resolve_style_block(style)));
                }
                Node::TemplateRef(reference) | Node::CustomRef(reference) => {
                    let custom_only = matches!(node, Node::CustomRef(_)) && reference.fully_qualified;
                    let template_only = matches!(node, Node::TemplateRef(_)) && reference.fully_qualified;
                    out.extend(self.expand_reference(reference, custom_only, template_only));
                }
                // Imports were expanded in phase 1; a survivor means the
                // expander could not process it and already reported why.
                Node::Import(_) => {}
                other => out.push(other.clone()),
            }
        }
        out
    }

    fn resolve_element(&mut self, element: &Element) -> Element {
        let children = self.resolve_nodes(&element.children);
        self.check_element_constraints(element, &children);
        Element {
            tag: element.tag.clone(),
            attributes: element.attributes.clone(),
            children,
            span: element.span.clone(),
        }
    }

    // ---- style ----------------------------------------------------------

    fn resolve_style_block(&mut self, style: &StyleBlock) -> StyleBlock {
        let children = self.resolve_style_children(&style.children);
        StyleBlock {
            local: style.local,
            children,
            span: style.span.clone(),
        }
    }

    /// Expand style references into properties, resolve variable calls, then
    /// apply property deletions in document order. Public entry point for
    /// CSS fragments dispatched outside a full tree.
    pub fn resolve_style_children(&mut self, children: &[Node]) -> Vec<Node> {
        let mut expanded: Vec<Node> = Vec::new();
        let mut deletions: Vec<Deletion> = Vec::new();
        for child in children {
            match child {
                Node::TemplateRef(reference) | Node::CustomRef(reference) => {
                    let custom_only = matches!(child, Node::CustomRef(_)) && reference.fully_qualified;
                    let template_only = matches!(child, Node::TemplateRef(_)) && reference.fully_qualified;
                    expanded.extend(self.expand_reference(reference, custom_only, template_only));
                }
                Node::Property(property) => {
                    expanded.push(Node::Property(self.resolve_property(property)));
                }
                Node::Selector(selector) => {
                    expanded.push(Node::Selector(self.resolve_selector(selector)));
                }
                Node::Deletion(deletion) if deletion.kind == DeletionKind::Property => {
                    deletions.push(deletion.clone());
                }
                other => expanded.push(other.clone()),
            }
        }
        for deletion in &deletions {
            for target in &deletion.targets {
                let before = expanded.len();
                expanded.retain(|node| match node {
                    Node::Property(p) => p.name != target.name,
                    _ => true,
                });
                if expanded.len() == before {
                    self.error(
                        &deletion.span,
                        format!("delete target '{}' does not match any property", target.name),
                    );
                }
            }
        }
        merge_duplicate_properties(expanded)
    }

    fn resolve_selector(&mut self, selector: &Selector) -> Selector {
        Selector {
            kind: selector.kind,
            text: selector.text.clone(),
            properties: selector
                .properties
                .iter()
                .map(|p| self.resolve_property(p))
                .collect(),
            nested: selector
                .nested
                .iter()
                .map(|s| self.resolve_selector(s))
                .collect(),
            span: selector.span.clone(),
        }
    }

    /// Substitute variable-group calls; a call whose name does not resolve to
    /// a `@Var` object is an ordinary CSS function and stays textual.
    fn resolve_property(&mut self, property: &Property) -> Property {
        let segments = property
            .segments
            .iter()
            .map(|segment| match segment {
                ValueSegment::Call { name, args } => {
                    match self.lookup_var_group(name) {
                        Some(group) => {
                            let text = self.resolve_var_call(&group, name, args, &property.span);
                            ValueSegment::Text(text)
                        }
                        None => segment.clone(),
                    }
                }
                text => text.clone(),
            })
            .collect();
        Property {
            name: property.name.clone(),
            segments,
            assigned_with_equals: property.assigned_with_equals,
            span: property.span.clone(),
        }
    }

    fn lookup_var_group(&self, name: &str) -> Option<Rc<GlobalObject>> {
        self.map
            .find(GlobalKind::TemplateVar, name, &self.namespace)
            .or_else(|| self.map.find(GlobalKind::CustomVar, name, &self.namespace))
    }

    /// `Group(key)` or `Group(key=default)`.
    fn resolve_var_call(
        &mut self,
        group: &GlobalObject,
        group_name: &str,
        args: &[String],
        span: &ParseSourceSpan,
    ) -> String {
        if args.len() != 1 {
            self.error(
                span,
                format!("variable group '{}' expects one key, got {}", group_name, args.len()),
            );
            return String::new();
        }
        let (key, default) = match args[0].split_once('=') {
            Some((key, default)) => (key.trim(), Some(default.trim())),
            None => (args[0].trim(), None),
        };
        let body = self.resolved_decl_body(group);
        for node in &body {
            if let Node::Property(p) = node {
                if p.name == key {
                    return p.value_text();
                }
            }
        }
        match default {
            Some(default) => default.to_string(),
            None => {
                self.error(
                    span,
                    format!("variable '{}' is not defined in group '{}'", key, group_name),
                );
                String::new()
            }
        }
    }

    // ---- reference expansion --------------------------------------------

    /// Expand a template/custom reference into a deep clone of the resolved
    /// body. Positions are rebound to the reference site. Unqualified
    /// references try templates first, then customs.
    fn expand_reference(
        &mut self,
        reference: &Reference,
        custom_only: bool,
        template_only: bool,
    ) -> Vec<Node> {
        let name = match &reference.namespace {
            Some(ns) => format!("{}.{}", ns, reference.name),
            None => reference.name.clone(),
        };
        let decl_kind = reference.kind.decl_kind();
        let template = if custom_only {
            None
        } else {
            self.map.find(GlobalKind::template(decl_kind), &name, &self.namespace)
        };
        let custom = if template_only || template.is_some() {
            None
        } else {
            self.map.find(GlobalKind::custom(decl_kind), &name, &self.namespace)
        };
        let Some(obj) = template.or(custom) else {
            self.error(
                &reference.span,
                format!("unresolved reference to {} '{}'", reference.kind.decl_kind().marker(), name),
            );
            return Vec::new();
        };

        if self.active.contains(&obj.qualified_name) {
            self.error(
                &reference.span,
                format!("cyclic expansion of '{}'", obj.qualified_name),
            );
            return Vec::new();
        }

        let body = self.resolved_decl_body(&obj);
        let body = self.apply_specializations(body, &reference.specializations, &reference.span);

        self.active.push(obj.qualified_name.clone());
        let respanned: Vec<Node> = body
            .iter()
            .map(|node| node.respanned(&reference.span))
            .collect();
        let resolved = match decl_kind {
            DeclKind::Element => self.resolve_nodes(&respanned),
            _ => self.resolve_style_children(&respanned),
        };
        self.active.pop();
        resolved
    }

    /// Body of a declaration with inheritance merged and its own
    /// specialization operators applied.
    fn resolved_decl_body(&mut self, obj: &GlobalObject) -> Vec<Node> {
        let (kind, inherits, body) = match obj.body.as_ref() {
            Node::Template(t) => (t.kind, t.inherits.clone(), t.body.clone()),
            Node::Custom(c) => (c.kind, c.inherits.clone(), c.body.clone()),
            _ => return Vec::new(),
        };

        if self.active.contains(&obj.qualified_name) {
            self.error(&obj.span, format!("inheritance cycle through '{}'", obj.qualified_name));
            return Vec::new();
        }
        self.active.push(obj.qualified_name.clone());

        // Inheritance deletions name parents to drop before merging.
        let excluded: Vec<String> = body
            .iter()
            .filter_map(|node| match node {
                Node::Deletion(d)
                    if matches!(
                        d.kind,
                        DeletionKind::Inheritance | DeletionKind::ElementInheritance
                    ) =>
                {
                    Some(d.targets.iter().map(|t| t.name.clone()).collect::<Vec<_>>())
                }
                _ => None,
            })
            .flatten()
            .collect();

        // Merge parent bodies left to right, later entries overriding.
        let mut merged: Vec<Node> = Vec::new();
        for parent_ref in &inherits {
            if excluded.contains(&parent_ref.name) {
                continue;
            }
            if parent_ref.kind.decl_kind() != kind {
                self.error(
                    &parent_ref.span,
                    format!(
                        "type mismatch: cannot inherit {} '{}' into a {} body",
                        parent_ref.kind.decl_kind().marker(),
                        parent_ref.name,
                        kind.marker()
                    ),
                );
                continue;
            }
            let name = match &parent_ref.namespace {
                Some(ns) => format!("{}.{}", ns, parent_ref.name),
                None => parent_ref.name.clone(),
            };
            let parent = self
                .map
                .find(GlobalKind::template(kind), &name, &self.namespace)
                .or_else(|| self.map.find(GlobalKind::custom(kind), &name, &self.namespace));
            let Some(parent) = parent else {
                self.error(
                    &parent_ref.span,
                    format!("unresolved parent '{}' in inheritance", name),
                );
                continue;
            };
            let parent_body = self.resolved_decl_body(&parent);
            merged = merge_bodies(kind, merged, parent_body);
        }

        // Own body last: overrides parents. Specialization operators are
        // applied afterwards in document order.
        let own: Vec<Node> = body
            .iter()
            .filter(|node| !matches!(node, Node::Deletion(_) | Node::Insertion(_)))
            .cloned()
            .collect();
        let mut resolved = merge_bodies(kind, merged, own);

        let ops: Vec<Node> = body
            .iter()
            .filter(|node| {
                matches!(node, Node::Insertion(_))
                    || matches!(node, Node::Deletion(d) if !matches!(
                        d.kind,
                        DeletionKind::Inheritance | DeletionKind::ElementInheritance
                    ))
            })
            .cloned()
            .collect();
        resolved = self.apply_specializations(resolved, &ops, &obj.span);

        self.active.pop();
        resolved
    }

    /// Apply use-site specializations: property overrides, deletions and
    /// insertions, in document order.
    fn apply_specializations(
        &mut self,
        body: Vec<Node>,
        specializations: &[Node],
        _site: &ParseSourceSpan,
    ) -> Vec<Node> {
        if specializations.is_empty() {
            return body;
        }
        let mut body = body;
        let mut replaced_targets: Vec<String> = Vec::new();
        for spec in specializations {
            match spec {
                Node::Property(property) => {
                    let resolved = self.resolve_property(property);
                    let mut found = false;
                    for node in body.iter_mut() {
                        if let Node::Property(existing) = node {
                            if existing.name == resolved.name {
                                *existing = resolved.clone();
                                found = true;
                            }
                        }
                    }
                    if !found {
                        body.push(Node::Property(resolved));
                    }
                }
                Node::Deletion(deletion) => {
                    body = self.apply_deletion(body, deletion);
                }
                Node::Insertion(insertion) => {
                    if insertion.position == InsertPosition::Replace {
                        if let Some(target) = &insertion.target {
                            let key = format!("{}[{}]", target.name, target.index.unwrap_or(0));
                            if replaced_targets.contains(&key) {
                                self.error(
                                    &insertion.span,
                                    format!("conflicting specialization: '{}' replaced twice", key),
                                );
                                continue;
                            }
                            replaced_targets.push(key);
                        }
                    }
                    body = self.apply_insertion(body, insertion);
                }
                Node::Element(element) => {
                    body.push(Node::Element(self.resolve_element(element)));
                }
                other => body.push(other.clone()),
            }
        }
        body
    }

    fn apply_deletion(&mut self, body: Vec<Node>, deletion: &Deletion) -> Vec<Node> {
        let mut body = body;
        for target in &deletion.targets {
            match deletion.kind {
                DeletionKind::Property => {
                    body.retain(|node| match node {
                        Node::Property(p) => p.name != target.name,
                        _ => true,
                    });
                }
                _ => {
                    // Element deletion: `div` removes every div, `div[1]`
                    // only the second one.
                    match target.index {
                        Some(index) => {
                            let mut seen = 0usize;
                            let mut removed = false;
                            body.retain(|node| {
                                if removed {
                                    return true;
                                }
                                if let Node::Element(e) = node {
                                    if e.tag == target.name {
                                        if seen == index {
                                            removed = true;
                                            seen += 1;
                                            return false;
                                        }
                                        seen += 1;
                                    }
                                }
                                true
                            });
                            if !removed {
                                self.error(
                                    &deletion.span,
                                    format!("delete target '{}[{}]' not found", target.name, index),
                                );
                            }
                        }
                        None => {
                            body.retain(|node| match node {
                                Node::Element(e) => e.tag != target.name,
                                _ => true,
                            });
                        }
                    }
                }
            }
        }
        body
    }

    fn apply_insertion(&mut self, body: Vec<Node>, insertion: &Insertion) -> Vec<Node> {
        let mut body = body;
        let inserted = self.resolve_nodes(&insertion.body);
        match insertion.position {
            InsertPosition::AtTop => {
                let mut out = inserted;
                out.extend(body);
                return out;
            }
            InsertPosition::AtBottom => {
                body.extend(inserted);
                return body;
            }
            _ => {}
        }
        let Some(target) = &insertion.target else {
            self.error(&insertion.span, "insertion requires a target".to_string());
            return body;
        };
        let wanted_index = target.index.unwrap_or(0);
        let mut seen = 0usize;
        let mut position = None;
        for (i, node) in body.iter().enumerate() {
            if let Node::Element(e) = node {
                if e.tag == target.name {
                    if seen == wanted_index {
                        position = Some(i);
                        break;
                    }
                    seen += 1;
                }
            }
        }
        let Some(at) = position else {
            self.error(
                &insertion.span,
                format!("insertion target '{}' not found", target.name),
            );
            return body;
        };
        match insertion.position {
            InsertPosition::Before => {
                body.splice(at..at, inserted);
            }
            InsertPosition::After => {
                body.splice(at + 1..at + 1, inserted);
            }
            InsertPosition::Replace => {
                body.splice(at..at + 1, inserted);
            }
            _ => unreachable!("at_top/at_bottom handled above"),
        }
        body
    }

    // ---- constraints ----------------------------------------------------

    /// `except` constraints inside a namespace exclude declaration kinds.
    fn check_namespace_constraints(&mut self, nodes: &[Node]) {
        for node in nodes {
            if let Node::Namespace(ns) = node {
                let mut path = self.namespace.clone();
                path.push(ns.name.clone());
                for child in &ns.body {
                    if let Node::Constraint(constraint) = child {
                        self.enforce_namespace_constraint(constraint, &path);
                    }
                }
                self.check_namespace_constraints(&ns.body);
            }
        }
    }

    fn enforce_namespace_constraint(&mut self, constraint: &Constraint, path: &[String]) {
        for target in &constraint.targets {
            let kinds: &[GlobalKind] = match target.as_str() {
                "@Style" => &[GlobalKind::TemplateStyle, GlobalKind::CustomStyle],
                "@Element" => &[GlobalKind::TemplateElement, GlobalKind::CustomElement],
                "@Var" => &[GlobalKind::TemplateVar, GlobalKind::CustomVar],
                "@Html" => &[GlobalKind::Origin],
                _ => continue,
            };
            for kind in kinds {
                if !self.map.enumerate(*kind, path).is_empty() {
                    self.error(
                        &constraint.span,
                        format!(
                            "namespace '{}' excludes {} declarations",
                            path.join("."),
                            target
                        ),
                    );
                }
            }
        }
    }

    /// `except span, a;` inside an element forbids those child tags.
    fn check_element_constraints(&mut self, element: &Element, children: &[Node]) {
        for node in children {
            if let Node::Constraint(constraint) = node {
                for target in &constraint.targets {
                    if target.starts_with('@') {
                        continue;
                    }
                    let violating = children.iter().any(|child| {
                        matches!(child, Node::Element(e) if e.tag == *target)
                    });
                    if violating {
                        self.error(
                            &constraint.span,
                            format!(
                                "element '{}' excludes '{}' children",
                                element.tag, target
                            ),
                        );
                    }
                }
            }
        }
    }
}

/// Key-merge for style/var bodies (later wins, position of first occurrence
/// kept); concatenation for element bodies.
fn merge_bodies(kind: DeclKind, base: Vec<Node>, overlay: Vec<Node>) -> Vec<Node> {
    match kind {
        DeclKind::Element => {
            let mut merged = base;
            merged.extend(overlay);
            merged
        }
        DeclKind::Style | DeclKind::Var => {
            let mut merged = base;
            for node in overlay {
                match node {
                    Node::Property(property) => {
                        let mut replaced = false;
                        for existing in merged.iter_mut() {
                            if let Node::Property(p) = existing {
                                if p.name == property.name {
                                    *p = property.clone();
                                    replaced = true;
                                    break;
                                }
                            }
                        }
                        if !replaced {
                            merged.push(Node::Property(property));
                        }
                    }
                    other => merged.push(other),
                }
            }
            merged
        }
    }
}

/// Last duplicate wins while keeping the first occurrence's position.
fn merge_duplicate_properties(nodes: Vec<Node>) -> Vec<Node> {
    let mut values: IndexMap<String, Property> = IndexMap::new();
    let mut order: Vec<Node> = Vec::new();
    for node in &nodes {
        if let Node::Property(p) = node {
            values.insert(p.name.clone(), p.clone());
        }
    }
    let mut emitted: Vec<String> = Vec::new();
    for node in nodes {
        match node {
            Node::Property(p) => {
                if emitted.contains(&p.name) {
                    continue;
                }
                emitted.push(p.name.clone());
                order.push(Node::Property(values[&p.name].clone()));
            }
            other => order.push(other),
        }
    }
    order
}
