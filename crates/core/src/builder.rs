//! Construction API for documents.
//!
//! Encoders (and tests) build nodes bottom-up: children first, then the
//! composite that links them, then [`DocumentBuilder::build`] with the root.
//! Every name passing through the builder is interned.

use crate::document::*;
use crate::intern::NameInterner;
use indexmap::IndexMap;

#[derive(Debug, Default)]
pub struct DocumentBuilder {
    interner: NameInterner,
    global: IndexMap<Name, FieldDef>,
    nodes: Vec<Node>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&mut self, s: &str) -> Name {
        self.interner.intern(s)
    }

    /// Declare a primitive input field in the global dictionary.
    pub fn input(&mut self, name: &str) -> &mut Self {
        let name = self.name(name);
        self.global.insert(name, FieldDef::Input);
        self
    }

    /// Declare a global derived field.
    pub fn derived(&mut self, name: &str, mut expr: Expr) -> &mut Self {
        let name = self.name(name);
        self.intern_expr(&mut expr);
        self.global.insert(name, FieldDef::Derived(expr));
        self
    }

    /// Start a new node. The node is added to the arena by [`NodeBuilder::finish`].
    pub fn node(&mut self) -> NodeBuilder<'_> {
        NodeBuilder {
            builder: self,
            node: Node::default(),
        }
    }

    pub fn build(self, root: NodeIndex) -> Document {
        Document {
            global: self.global,
            nodes: self.nodes,
            root,
        }
    }

    fn intern_expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::Literal(_) => {}
            Expr::FieldRef(name) => *name = self.interner.intern(name.as_str()),
            Expr::Apply { args, .. } => {
                for arg in args {
                    self.intern_expr(arg);
                }
            }
        }
    }

    fn intern_predicate(&mut self, predicate: &mut Predicate) {
        match predicate {
            Predicate::True | Predicate::False => {}
            Predicate::Simple { field, .. } | Predicate::SimpleSet { field, .. } => {
                *field = self.interner.intern(field.as_str())
            }
            Predicate::Compound { predicates, .. } => {
                for p in predicates {
                    self.intern_predicate(p);
                }
            }
        }
    }
}

pub struct NodeBuilder<'b> {
    builder: &'b mut DocumentBuilder,
    node: Node,
}

impl NodeBuilder<'_> {
    pub fn name(mut self, name: &str) -> Self {
        self.node.name = Some(name.to_owned());
        self
    }

    pub fn schema(mut self, field: &str, role: Role) -> Self {
        let field = self.builder.name(field);
        self.node.schema.insert(field, role);
        self
    }

    pub fn active(self, field: &str) -> Self {
        self.schema(field, Role::Active)
    }

    pub fn target(self, field: &str) -> Self {
        self.schema(field, Role::Target)
    }

    pub fn local(mut self, field: &str, mut expr: Expr) -> Self {
        let field = self.builder.name(field);
        self.builder.intern_expr(&mut expr);
        self.node.local_dict.insert(field, expr);
        self
    }

    pub fn body_expr(mut self, mut expr: Expr) -> Self {
        self.builder.intern_expr(&mut expr);
        self.node.body.push(BodyTerm::Expr(expr));
        self
    }

    pub fn body_predicate(mut self, mut predicate: Predicate) -> Self {
        self.builder.intern_predicate(&mut predicate);
        self.node.body.push(BodyTerm::Predicate(predicate));
        self
    }

    pub fn output(mut self, mut output: OutputField) -> Self {
        output.name = self.builder.name(output.name.as_str());
        if let Some(expr) = output.expr.as_mut() {
            self.builder.intern_expr(expr);
        }
        self.node.outputs.push(output);
        self
    }

    pub fn verification(mut self, mut verification: Verification) -> Self {
        for column in &mut verification.columns {
            column.field = self.builder.name(column.field.as_str());
        }
        self.node.verification = Some(verification);
        self
    }

    pub fn segments(
        mut self,
        method: CombineMethod,
        segments: impl IntoIterator<Item = (Predicate, NodeIndex)>,
    ) -> Self {
        let segments = segments
            .into_iter()
            .map(|(mut predicate, node)| {
                self.builder.intern_predicate(&mut predicate);
                Segment {
                    id: None,
                    predicate,
                    node,
                }
            })
            .collect();
        self.node.children = NodeChildren::Segments { segments, method };
        self
    }

    pub fn chain(mut self, nodes: impl IntoIterator<Item = NodeIndex>) -> Self {
        self.node.children = NodeChildren::Chain(nodes.into_iter().collect());
        self
    }

    pub fn finish(self) -> NodeIndex {
        let index = NodeIndex::new(self.builder.nodes.len());
        self.builder.nodes.push(self.node);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_interns_all_names() {
        let mut b = DocumentBuilder::new();
        b.input("a");
        let leaf = b
            .node()
            .active("a")
            .local("x", Expr::binary("+", Expr::field("a"), Expr::number("1")))
            .output(OutputField::transformed("y", Expr::field("x")))
            .finish();
        let doc = b.build(leaf);

        let global_a = doc.global.keys().next().unwrap();
        let schema_a = doc.node(leaf).schema.keys().next().unwrap();
        assert!(global_a.ptr_eq(schema_a));

        let x_key = doc.node(leaf).local_dict.keys().next().unwrap();
        match &doc.node(leaf).outputs[0].expr {
            Some(Expr::FieldRef(x_ref)) => assert!(x_key.ptr_eq(x_ref)),
            other => panic!("unexpected output expr: {:?}", other),
        }
    }

    #[test]
    fn nodes_are_indexed_in_finish_order() {
        let mut b = DocumentBuilder::new();
        let first = b.node().name("first").finish();
        let second = b.node().name("second").finish();
        let root = b
            .node()
            .segments(CombineMethod::Sum, [(Predicate::True, first), (Predicate::True, second)])
            .finish();
        let doc = b.build(root);
        assert_eq!(first, NodeIndex(0));
        assert_eq!(second, NodeIndex(1));
        assert_eq!(doc.root, NodeIndex(2));
        assert_eq!(doc.node(root).children.nodes(), vec![first, second]);
    }
}
