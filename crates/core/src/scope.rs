//! Scope resolver.
//!
//! A reference site sees a stack of frames, one per node on the path from
//! the root, with the global dictionary as the outermost scope. Each frame
//! exposes the node's local dictionary and, for chain composites, the
//! outputs of the chain segments already evaluated at that point. The
//! innermost frame can additionally expose the node's own earlier outputs.

use crate::document::{Document, Name, NodeIndex};
use crate::topology::Topology;
use serde::Serialize;
use std::fmt;

/// Where a visible field is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldLocation {
    Global,
    Local(NodeIndex),
    Output { node: NodeIndex, position: usize },
}

impl fmt::Display for FieldLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldLocation::Global => write!(f, "global dictionary"),
            FieldLocation::Local(node) => write!(f, "local dictionary of {}", node),
            FieldLocation::Output { node, position } => {
                write!(f, "output field #{} of {}", position, node)
            }
        }
    }
}

/// A dictionary that can hold a derived-field definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Global,
    Node(NodeIndex),
}

impl Placement {
    pub fn location(&self) -> FieldLocation {
        match self {
            Placement::Global => FieldLocation::Global,
            Placement::Node(node) => FieldLocation::Local(*node),
        }
    }

    pub fn of(location: FieldLocation) -> Option<Placement> {
        match location {
            FieldLocation::Global => Some(Placement::Global),
            FieldLocation::Local(node) => Some(Placement::Node(node)),
            FieldLocation::Output { .. } => None,
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Global => write!(f, "global"),
            Placement::Node(node) => write!(f, "{}", node),
        }
    }
}

/// Identity of a field: its defining location plus its name. Same-named
/// definitions in disjoint subtrees are different fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FieldKey {
    pub location: FieldLocation,
    pub name: Name,
}

impl FieldKey {
    pub fn new(location: FieldLocation, name: Name) -> Self {
        FieldKey { location, name }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({})", self.name, self.location)
    }
}

/// One node's contribution to a scope stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub node: NodeIndex,
    /// Number of leading children whose outputs are visible (chains only).
    pub chain_cut: usize,
    /// Number of the node's own leading outputs that are visible.
    pub own_outputs: usize,
}

impl Frame {
    /// The frame a node presents to the subtree of its `k`-th child, and to
    /// that child's gating predicate.
    pub fn toward_child(doc: &Document, node: NodeIndex, k: usize) -> Self {
        let chain_cut = if doc.node(node).children.is_chain() { k } else { 0 };
        Frame {
            node,
            chain_cut,
            own_outputs: 0,
        }
    }

    /// The frame seen by a node's own body, local definitions and schema.
    pub fn content(doc: &Document, node: NodeIndex) -> Self {
        let children = &doc.node(node).children;
        let chain_cut = if children.is_chain() { children.len() } else { 0 };
        Frame {
            node,
            chain_cut,
            own_outputs: 0,
        }
    }

    /// The frame seen by the expression of output `position`.
    pub fn output(doc: &Document, node: NodeIndex, position: usize) -> Self {
        Frame {
            own_outputs: position,
            ..Frame::content(doc, node)
        }
    }
}

/// A resolution context: borrowed ancestor frames plus the innermost frame.
/// `innermost == None` is the scope of global derived definitions.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub ancestors: &'a [Frame],
    pub innermost: Option<Frame>,
}

impl<'a> Scope<'a> {
    pub fn new(ancestors: &'a [Frame], innermost: Frame) -> Self {
        Scope {
            ancestors,
            innermost: Some(innermost),
        }
    }

    pub fn global() -> Scope<'static> {
        Scope {
            ancestors: &[],
            innermost: None,
        }
    }

    fn frames_inside_out(&self) -> impl Iterator<Item = &Frame> {
        self.innermost.iter().chain(self.ancestors.iter().rev())
    }
}

/// Frames of every ancestor of `node`, root first, each cut toward the path.
pub fn ancestor_frames(doc: &Document, topo: &Topology, node: NodeIndex) -> Vec<Frame> {
    let path = topo.path(node);
    path.windows(2)
        .map(|pair| {
            let k = topo.position(pair[1]).unwrap_or(0);
            Frame::toward_child(doc, pair[0], k)
        })
        .collect()
}

/// Resolve `name` at `scope`. The innermost definition wins.
pub fn resolve(doc: &Document, name: &str, scope: &Scope<'_>) -> Option<FieldLocation> {
    let mut found = None;
    visit_candidates(doc, name, scope, |location| {
        found = Some(location);
        false
    });
    found
}

/// Every location defining `name` visible at `scope`, innermost first.
pub fn resolve_all(doc: &Document, name: &str, scope: &Scope<'_>) -> Vec<FieldLocation> {
    let mut found = Vec::new();
    visit_candidates(doc, name, scope, |location| {
        found.push(location);
        true
    });
    found
}

/// Feed matches to `accept` in lookup order until it returns false.
fn visit_candidates(
    doc: &Document,
    name: &str,
    scope: &Scope<'_>,
    mut accept: impl FnMut(FieldLocation) -> bool,
) {
    for frame in scope.frames_inside_out() {
        let node = doc.node(frame.node);

        if node.local_dict.contains_key(name) && !accept(FieldLocation::Local(frame.node)) {
            return;
        }

        for (position, output) in node.outputs.iter().take(frame.own_outputs).enumerate() {
            if output.name.as_str() == name
                && !accept(FieldLocation::Output {
                    node: frame.node,
                    position,
                })
            {
                return;
            }
        }

        // Nearest earlier segment first.
        let children = node.children.nodes();
        for &child in children.iter().take(frame.chain_cut).rev() {
            if let Some(position) = doc.node(child).output_position(name) {
                if !accept(FieldLocation::Output {
                    node: child,
                    position,
                }) {
                    return;
                }
            }
        }
    }

    if doc.global.contains_key(name) {
        accept(FieldLocation::Global);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DocumentBuilder;
    use crate::document::{CombineMethod, CompareOp, Expr, Literal, OutputField, Predicate};

    struct Sample {
        doc: Document,
        s0: NodeIndex,
        s1: NodeIndex,
        chain: NodeIndex,
        root: NodeIndex,
    }

    // root { local: h } -> chain { local: x } -> [s0 (outputs p, q), s1 { local: x2 }]
    fn sample() -> Sample {
        let mut b = DocumentBuilder::new();
        b.input("a").input("b");
        let s0 = b
            .node()
            .active("a")
            .output(OutputField::predicted("p"))
            .output(OutputField::transformed("q", Expr::field("p")))
            .finish();
        let s1 = b.node().local("x2", Expr::field("p")).finish();
        let gate = Predicate::simple("p", CompareOp::GreaterThan, Literal::Number("0.5".into()));
        let chain = b
            .node()
            .local("x", Expr::field("a"))
            .segments(
                CombineMethod::ModelChain,
                [(Predicate::True, s0), (gate, s1)],
            )
            .finish();
        let root = b
            .node()
            .local("h", Expr::field("b"))
            .segments(CombineMethod::Sum, [(Predicate::True, chain)])
            .finish();
        Sample {
            doc: b.build(root),
            s0,
            s1,
            chain,
            root,
        }
    }

    #[test]
    fn local_then_ancestor_then_global() {
        let s = sample();
        let topo = Topology::build(&s.doc).unwrap();
        let frames = ancestor_frames(&s.doc, &topo, s.s1);
        let scope = Scope::new(&frames, Frame::content(&s.doc, s.s1));

        assert_eq!(resolve(&s.doc, "x2", &scope), Some(FieldLocation::Local(s.s1)));
        assert_eq!(resolve(&s.doc, "x", &scope), Some(FieldLocation::Local(s.chain)));
        assert_eq!(resolve(&s.doc, "h", &scope), Some(FieldLocation::Local(s.root)));
        assert_eq!(resolve(&s.doc, "a", &scope), Some(FieldLocation::Global));
        assert_eq!(resolve(&s.doc, "nope", &scope), None);
    }

    #[test]
    fn chain_outputs_visible_to_later_segments_only() {
        let s = sample();
        let topo = Topology::build(&s.doc).unwrap();

        let later = ancestor_frames(&s.doc, &topo, s.s1);
        let scope = Scope::new(&later, Frame::content(&s.doc, s.s1));
        assert_eq!(
            resolve(&s.doc, "p", &scope),
            Some(FieldLocation::Output {
                node: s.s0,
                position: 0
            })
        );

        let earlier = ancestor_frames(&s.doc, &topo, s.s0);
        let scope = Scope::new(&earlier, Frame::content(&s.doc, s.s0));
        assert_eq!(resolve(&s.doc, "p", &scope), None);
    }

    #[test]
    fn own_outputs_visible_in_order() {
        let s = sample();
        let topo = Topology::build(&s.doc).unwrap();
        let frames = ancestor_frames(&s.doc, &topo, s.s0);

        let first = Scope::new(&frames, Frame::output(&s.doc, s.s0, 0));
        assert_eq!(resolve(&s.doc, "p", &first), None);

        let second = Scope::new(&frames, Frame::output(&s.doc, s.s0, 1));
        assert_eq!(
            resolve(&s.doc, "p", &second),
            Some(FieldLocation::Output {
                node: s.s0,
                position: 0
            })
        );
    }

    #[test]
    fn global_scope_sees_only_global() {
        let s = sample();
        assert_eq!(resolve(&s.doc, "a", &Scope::global()), Some(FieldLocation::Global));
        assert_eq!(resolve(&s.doc, "h", &Scope::global()), None);
    }

    #[test]
    fn resolve_all_reports_shadowed_definitions() {
        let mut s = sample();
        s.doc
            .node_mut(s.s1)
            .local_dict
            .insert(Name::new("a"), Expr::number("1"));
        let topo = Topology::build(&s.doc).unwrap();
        let frames = ancestor_frames(&s.doc, &topo, s.s1);
        let scope = Scope::new(&frames, Frame::content(&s.doc, s.s1));

        assert_eq!(resolve(&s.doc, "a", &scope), Some(FieldLocation::Local(s.s1)));
        assert_eq!(
            resolve_all(&s.doc, "a", &scope),
            vec![FieldLocation::Local(s.s1), FieldLocation::Global]
        );
    }

    #[test]
    fn location_display() {
        assert_eq!(FieldLocation::Local(NodeIndex(2)).to_string(), "local dictionary of node 2");
        assert_eq!(FieldLocation::Global.to_string(), "global dictionary");
        let key = FieldKey::new(FieldLocation::Global, Name::new("g"));
        assert_eq!(key.to_string(), "'g' (global dictionary)");
    }
}
