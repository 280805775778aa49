//! Active-field finder: the names a node uses directly.
//!
//! Local dictionary definitions are not walked here. Their
//! references only matter once the definition itself is live, which is the
//! dependency expander's job.

use crate::document::{Document, Name, Node, NodeIndex};
use crate::error::Site;
use crate::scope::Frame;
use indexmap::IndexSet;

/// One direct reference and where in the node it occurs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: Name,
    pub site: Site,
}

impl Reference {
    /// The innermost frame this reference is resolved in.
    pub fn frame(&self, doc: &Document, node: NodeIndex) -> Frame {
        match self.site {
            Site::Output(position) => Frame::output(doc, node, position),
            Site::SegmentPredicate(k) => Frame::toward_child(doc, node, k),
            _ => Frame::content(doc, node),
        }
    }
}

/// Direct references of `node`, in document order: body terms, output
/// expressions, segment gating predicates, then target/predicted schema
/// entries. A name may appear once per site.
pub fn find_references(node: &Node) -> Vec<Reference> {
    let mut out = Vec::new();
    let mut push = |names: IndexSet<Name>, site: Site| {
        out.extend(names.into_iter().map(|name| Reference {
            name,
            site: site.clone(),
        }));
    };

    let mut body = IndexSet::new();
    for term in &node.body {
        term.collect_refs(&mut body);
    }
    push(body, Site::Body);

    for (position, output) in node.outputs.iter().enumerate() {
        if let Some(expr) = &output.expr {
            push(expr.refs(), Site::Output(position));
        }
    }

    for (k, predicate) in node.children.predicates() {
        let mut names = IndexSet::new();
        predicate.collect_refs(&mut names);
        push(names, Site::SegmentPredicate(k));
    }

    let sinks: IndexSet<Name> = node
        .schema
        .iter()
        .filter(|(_, role)| role.is_sink())
        .map(|(name, _)| name.clone())
        .collect();
    push(sinks, Site::Schema);

    out
}

/// The set of names `node` references directly.
pub fn find_direct_references(node: &Node) -> IndexSet<Name> {
    find_references(node).into_iter().map(|r| r.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DocumentBuilder;
    use crate::document::{
        BodyTerm, CombineMethod, CompareOp, Expr, Literal, OutputField, Predicate,
    };

    fn names(set: &IndexSet<Name>) -> Vec<&str> {
        set.iter().map(|n| n.as_str()).collect()
    }

    #[test]
    fn local_definitions_are_not_walked() {
        let mut b = DocumentBuilder::new();
        let leaf = b
            .node()
            .local("x", Expr::binary("+", Expr::field("a"), Expr::field("b")))
            .output(OutputField::transformed(
                "y",
                Expr::binary("*", Expr::field("x"), Expr::number("2")),
            ))
            .finish();
        let doc = b.build(leaf);
        let refs = find_direct_references(doc.node(leaf));
        assert_eq!(names(&refs), vec!["x"]);
    }

    #[test]
    fn sites_cover_body_outputs_predicates_and_sinks() {
        let mut b = DocumentBuilder::new();
        let child = b.node().finish();
        let gate = Predicate::simple("g", CompareOp::Equal, Literal::Int(1));
        let parent = b
            .node()
            .target("t")
            .active("ignored")
            .body_expr(Expr::field("m"))
            .body_predicate(Predicate::simple("m", CompareOp::IsMissing, Literal::Missing))
            .output(OutputField::predicted("out"))
            .output(OutputField::transformed("o2", Expr::field("out")))
            .segments(CombineMethod::SelectFirst, [(gate, child)])
            .finish();
        let doc = b.build(parent);

        let refs = find_references(doc.node(parent));
        let sites: Vec<(&str, Site)> = refs
            .iter()
            .map(|r| (r.name.as_str(), r.site.clone()))
            .collect();
        assert_eq!(
            sites,
            vec![
                ("m", Site::Body),
                ("out", Site::Output(1)),
                ("g", Site::SegmentPredicate(0)),
                ("t", Site::Schema),
            ]
        );
        assert!(matches!(doc.node(parent).body[1], BodyTerm::Predicate(_)));
    }

    #[test]
    fn output_reference_frame_sees_earlier_outputs() {
        let mut b = DocumentBuilder::new();
        let leaf = b
            .node()
            .output(OutputField::predicted("p"))
            .output(OutputField::transformed("q", Expr::field("p")))
            .finish();
        let doc = b.build(leaf);
        let refs = find_references(doc.node(leaf));
        assert_eq!(refs[0].frame(&doc, leaf).own_outputs, 1);
    }
}
