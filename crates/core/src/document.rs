//! Document model shared by every cleanup pass.
//!
//! A document is an arena of model nodes plus a global field dictionary.
//! Nodes own their usage schema, local derived-field dictionary, encoded
//! model body and output fields; composite nodes refer to their children by
//! [`NodeIndex`], never by owning reference, so passes can move definitions
//! between nodes while walking the tree.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

// ──────────────────────────────────────────────
// Names and indices
// ──────────────────────────────────────────────

/// An interned field name. Cloning is a reference-count bump.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(Arc<str>);

impl Name {
    pub fn new(name: &str) -> Self {
        Name(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if both names share one allocation (i.e. came from the same interner).
    pub fn ptr_eq(&self, other: &Name) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<&str> for Name {
    fn from(name: &str) -> Self {
        Name::new(name)
    }
}

impl From<String> for Name {
    fn from(name: String) -> Self {
        Name(Arc::from(name))
    }
}

impl From<Arc<str>> for Name {
    fn from(name: Arc<str>) -> Self {
        Name(name)
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Index of a node in [`Document::nodes`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    #[inline(always)]
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    pub fn new(idx: usize) -> Self {
        Self(idx as u32)
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}", self.0)
    }
}

// ──────────────────────────────────────────────
// Expressions and predicates
// ──────────────────────────────────────────────

/// A literal leaf. Decimal values keep their source text so expressions stay
/// hashable and compare structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Number(String),
    Str(String),
    Missing,
}

/// An expression tree. Only [`Expr::FieldRef`] leaves matter to cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Literal(Literal),
    FieldRef(Name),
    Apply { function: String, args: Vec<Expr> },
}

impl Expr {
    pub fn field(name: impl Into<Name>) -> Self {
        Expr::FieldRef(name.into())
    }

    pub fn number(text: &str) -> Self {
        Expr::Literal(Literal::Number(text.to_owned()))
    }

    pub fn apply(function: &str, args: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Apply {
            function: function.to_owned(),
            args: args.into_iter().collect(),
        }
    }

    pub fn binary(function: &str, left: Expr, right: Expr) -> Self {
        Expr::apply(function, [left, right])
    }

    /// Append every referenced field name, in first-occurrence order.
    pub fn collect_refs(&self, out: &mut IndexSet<Name>) {
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expr::Literal(_) => {}
                Expr::FieldRef(name) => {
                    out.insert(name.clone());
                }
                // Reverse so the leftmost argument is visited first.
                Expr::Apply { args, .. } => stack.extend(args.iter().rev()),
            }
        }
    }

    pub fn refs(&self) -> IndexSet<Name> {
        let mut out = IndexSet::new();
        self.collect_refs(&mut out);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    IsMissing,
    IsNotMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOp {
    IsIn,
    IsNotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolOp {
    And,
    Or,
    Xor,
    Surrogate,
}

/// A boolean test over field values, used to gate segments and tree splits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    True,
    False,
    Simple {
        field: Name,
        op: CompareOp,
        value: Literal,
    },
    SimpleSet {
        field: Name,
        op: SetOp,
        values: Vec<Literal>,
    },
    Compound {
        op: BoolOp,
        predicates: Vec<Predicate>,
    },
}

impl Predicate {
    pub fn simple(field: impl Into<Name>, op: CompareOp, value: Literal) -> Self {
        Predicate::Simple {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn collect_refs(&self, out: &mut IndexSet<Name>) {
        let mut stack = vec![self];
        while let Some(predicate) = stack.pop() {
            match predicate {
                Predicate::True | Predicate::False => {}
                Predicate::Simple { field, .. } | Predicate::SimpleSet { field, .. } => {
                    out.insert(field.clone());
                }
                Predicate::Compound { predicates, .. } => {
                    stack.extend(predicates.iter().rev())
                }
            }
        }
    }
}

// ──────────────────────────────────────────────
// Node content
// ──────────────────────────────────────────────

/// How a model uses a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Active,
    Target,
    Predicted,
    Supplementary,
    Group,
    Order,
    FrequencyWeight,
    AnalysisWeight,
}

impl Role {
    /// Target and predicted entries are sinks: they survive cleanup and
    /// sort ahead of input roles.
    pub fn is_sink(&self) -> bool {
        matches!(self, Role::Target | Role::Predicted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    PredictedValue,
    TransformedValue,
    Probability { value: Option<String> },
    Decision,
    Affinity,
    EntityId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputField {
    pub name: Name,
    pub kind: OutputKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<Expr>,
}

impl OutputField {
    pub fn predicted(name: impl Into<Name>) -> Self {
        OutputField {
            name: name.into(),
            kind: OutputKind::PredictedValue,
            expr: None,
        }
    }

    pub fn transformed(name: impl Into<Name>, expr: Expr) -> Self {
        OutputField {
            name: name.into(),
            kind: OutputKind::TransformedValue,
            expr: Some(expr),
        }
    }
}

/// A piece of encoded model content (regression term, tree split).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyTerm {
    Expr(Expr),
    Predicate(Predicate),
}

impl BodyTerm {
    pub fn collect_refs(&self, out: &mut IndexSet<Name>) {
        match self {
            BodyTerm::Expr(expr) => expr.collect_refs(out),
            BodyTerm::Predicate(predicate) => predicate.collect_refs(out),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationColumn {
    pub field: Name,
    pub values: Vec<Literal>,
}

/// Sample input/output records used to verify a deployed model, stored by column.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Verification {
    pub columns: Vec<VerificationColumn>,
}

// ──────────────────────────────────────────────
// Composite structure
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineMethod {
    Average,
    WeightedAverage,
    Median,
    Max,
    Sum,
    WeightedSum,
    MajorityVote,
    WeightedMajorityVote,
    SelectFirst,
    SelectAll,
    ModelChain,
    MultiModelChain,
}

impl CombineMethod {
    /// Chains expose earlier segments' outputs to later segments.
    pub fn is_chain(&self) -> bool {
        matches!(self, CombineMethod::ModelChain | CombineMethod::MultiModelChain)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub predicate: Predicate,
    pub node: NodeIndex,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeChildren {
    #[default]
    None,
    Segments {
        segments: Vec<Segment>,
        method: CombineMethod,
    },
    /// Unconditional multi-stage chain; behaves like `ModelChain` segments
    /// whose predicates are all `True`.
    Chain(Vec<NodeIndex>),
}

impl NodeChildren {
    pub fn nodes(&self) -> Vec<NodeIndex> {
        match self {
            NodeChildren::None => Vec::new(),
            NodeChildren::Segments { segments, .. } => segments.iter().map(|s| s.node).collect(),
            NodeChildren::Chain(nodes) => nodes.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            NodeChildren::None => 0,
            NodeChildren::Segments { segments, .. } => segments.len(),
            NodeChildren::Chain(nodes) => nodes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_composite(&self) -> bool {
        !matches!(self, NodeChildren::None)
    }

    pub fn is_chain(&self) -> bool {
        match self {
            NodeChildren::None => false,
            NodeChildren::Segments { method, .. } => method.is_chain(),
            NodeChildren::Chain(_) => true,
        }
    }

    /// The gating predicates, in segment order. `Chain` children have none.
    pub fn predicates(&self) -> impl Iterator<Item = (usize, &Predicate)> {
        let segments: &[Segment] = match self {
            NodeChildren::Segments { segments, .. } => segments,
            _ => &[],
        };
        segments.iter().enumerate().map(|(k, s)| (k, &s.predicate))
    }
}

// ──────────────────────────────────────────────
// Nodes and the document
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Node {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub schema: IndexMap<Name, Role>,
    #[serde(default)]
    pub local_dict: IndexMap<Name, Expr>,
    #[serde(default)]
    pub body: Vec<BodyTerm>,
    #[serde(default)]
    pub outputs: Vec<OutputField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
    #[serde(default)]
    pub children: NodeChildren,
}

impl Node {
    pub fn label(&self, index: NodeIndex) -> String {
        match &self.name {
            Some(name) => format!("{} ('{}')", index, name),
            None => index.to_string(),
        }
    }

    pub fn output_position(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|o| o.name.as_str() == name)
    }
}

/// A top-level dictionary entry: a primitive input or a global derived field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDef {
    Input,
    Derived(Expr),
}

impl FieldDef {
    pub fn expr(&self) -> Option<&Expr> {
        match self {
            FieldDef::Input => None,
            FieldDef::Derived(expr) => Some(expr),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub global: IndexMap<Name, FieldDef>,
    pub nodes: Vec<Node>,
    pub root: NodeIndex,
}

impl Document {
    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.index()]
    }

    pub fn node_mut(&mut self, index: NodeIndex) -> &mut Node {
        &mut self.nodes[index.index()]
    }

    pub fn indices(&self) -> impl Iterator<Item = NodeIndex> {
        (0..self.nodes.len()).map(NodeIndex::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expr_refs_in_first_occurrence_order() {
        let expr = Expr::binary(
            "+",
            Expr::binary("*", Expr::field("b"), Expr::field("a")),
            Expr::apply("max", [Expr::field("a"), Expr::field("c"), Expr::number("1")]),
        );
        let refs: Vec<String> = expr.refs().iter().map(|n| n.to_string()).collect();
        assert_eq!(refs, vec!["b", "a", "c"]);
    }

    #[test]
    fn compound_predicate_refs() {
        let predicate = Predicate::Compound {
            op: BoolOp::And,
            predicates: vec![
                Predicate::simple("p", CompareOp::GreaterThan, Literal::Number("0.5".into())),
                Predicate::SimpleSet {
                    field: "color".into(),
                    op: SetOp::IsIn,
                    values: vec![Literal::Str("red".into())],
                },
                Predicate::True,
            ],
        };
        let mut refs = IndexSet::new();
        predicate.collect_refs(&mut refs);
        assert_eq!(refs.len(), 2);
        assert!(refs.contains("p"));
        assert!(refs.contains("color"));
    }

    #[test]
    fn chain_detection() {
        let chain = NodeChildren::Segments {
            segments: vec![],
            method: CombineMethod::MultiModelChain,
        };
        assert!(chain.is_chain());
        let sum = NodeChildren::Segments {
            segments: vec![],
            method: CombineMethod::Sum,
        };
        assert!(!sum.is_chain());
        assert!(NodeChildren::Chain(vec![]).is_chain());
        assert!(!NodeChildren::None.is_composite());
    }

    #[test]
    fn name_borrows_as_str() {
        let mut dict: IndexMap<Name, Expr> = IndexMap::new();
        dict.insert(Name::new("x"), Expr::number("1"));
        assert!(dict.contains_key("x"));
    }

    #[test]
    fn document_json_shape() {
        let doc = Document {
            global: IndexMap::from([(Name::new("a"), FieldDef::Input)]),
            nodes: vec![Node::default()],
            root: NodeIndex(0),
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["global"]["a"], "input");
        assert_eq!(json["root"], 0);
        let back: Document = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }
}
