//! Typed, position-tagged source fragments produced by the unified scanner.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FragmentKind {
    Chtl,
    ChtlJs,
    Css,
    Js,
    /// Only emitted by error recovery, always alongside a scan error.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FragmentIntegrity {
    Complete,
    ContinuesNext,
    ContinuedFromPrev,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanContext {
    TopLevel,
    InsideElement,
    InsideStyle,
    InsideScript,
    InsideBraceExpression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FragmentPosition {
    pub offset: usize,
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeFragment {
    /// Monotonically increasing within a compilation unit.
    pub fragment_id: usize,
    /// 0-based position in the emitted sequence.
    pub sequence_index: usize,
    pub kind: FragmentKind,
    pub content: String,
    pub start: FragmentPosition,
    pub end: FragmentPosition,
    pub integrity: FragmentIntegrity,
    pub context: ScanContext,
    /// For CJMOD-recognised spans, the keyword that triggered the cut.
    pub keyword: Option<String>,
}

impl CodeFragment {
    pub fn is_script(&self) -> bool {
        matches!(self.kind, FragmentKind::Js | FragmentKind::ChtlJs)
    }
}

/// Source order: ascending fragment id.
pub fn source_order(fragments: &[CodeFragment]) -> Vec<usize> {
    let mut ids: Vec<usize> = fragments.iter().map(|f| f.fragment_id).collect();
    ids.sort_unstable();
    ids
}

/// Merge order for the dispatcher: CHTL structural fragments keep document
/// order, then all CSS fragments, then all script fragments. Within each
/// group source order is preserved, which keeps every
/// `continues_next`/`continued_from_prev` pair adjacent (the interrupting
/// fragment is always of another kind and moves to its own group).
pub fn optimal_merge_order(fragments: &[CodeFragment]) -> Vec<usize> {
    let mut order = Vec::with_capacity(fragments.len());
    let of_kind = |keep: fn(&CodeFragment) -> bool| {
        let mut ids: Vec<usize> = fragments
            .iter()
            .filter(|f| keep(f))
            .map(|f| f.fragment_id)
            .collect();
        ids.sort_unstable();
        ids
    };
    order.extend(of_kind(|f| {
        matches!(f.kind, FragmentKind::Chtl | FragmentKind::Unknown)
    }));
    order.extend(of_kind(|f| f.kind == FragmentKind::Css));
    order.extend(of_kind(|f| f.is_script()));
    order
}

/// Fragments that cannot stand alone: `partial` integrity, or a
/// `continues_next` with no matching successor of the same kind.
pub fn find_incomplete_fragments(fragments: &[CodeFragment]) -> Vec<&CodeFragment> {
    let mut incomplete = Vec::new();
    for (i, fragment) in fragments.iter().enumerate() {
        match fragment.integrity {
            FragmentIntegrity::Partial => incomplete.push(fragment),
            FragmentIntegrity::ContinuesNext => {
                let has_successor = fragments[i + 1..].iter().any(|f| {
                    f.kind == fragment.kind
                        && matches!(
                            f.integrity,
                            FragmentIntegrity::ContinuedFromPrev | FragmentIntegrity::ContinuesNext
                        )
                        && f.context == fragment.context
                });
                if !has_successor {
                    incomplete.push(fragment);
                }
            }
            _ => {}
        }
    }
    incomplete
}
