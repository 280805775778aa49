//! Pass 2: liveness aggregation.
//!
//! Nodes are visited children first. Every name a node needs is classified
//! by where it resolves:
//!
//! - the node's own local dictionary: seeds the local expansion;
//! - an output of the node itself or of one of its chain segments: satisfied
//!   internally and dropped;
//! - anything further out: reported upward as the node's active set.
//!
//! A node's needs are its direct references plus the active sets of its
//! children. Once the root is aggregated, its active set (plus pinned fields)
//! is expanded through the global dictionary.

use crate::document::{Document, FieldDef, Name, NodeIndex};
use crate::error::{CleanError, Site};
use crate::expand::expand;
use crate::finder::find_references;
use crate::scope::{ancestor_frames, resolve, FieldKey, FieldLocation, Frame, Scope};
use crate::topology::Topology;
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};

/// Liveness of a single node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeLiveness {
    /// Names this node needs from an enclosing scope, in discovery order,
    /// with the location each resolves to.
    pub active: IndexMap<Name, FieldLocation>,
    /// Keys of the node's local dictionary that are live.
    pub live_local: IndexSet<Name>,
}

/// Liveness of a whole document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Liveness {
    /// Indexed by [`NodeIndex`].
    pub nodes: Vec<NodeLiveness>,
    /// Live global entries, inputs and derived fields alike.
    pub live_global: IndexSet<Name>,
    /// Nodes whose own content references each derived field, in discovery
    /// order. References made by other definitions are not included.
    pub referencers: IndexMap<FieldKey, IndexSet<NodeIndex>>,
}

impl Liveness {
    pub fn node(&self, node: NodeIndex) -> &NodeLiveness {
        &self.nodes[node.index()]
    }

    pub fn is_live(&self, key: &FieldKey) -> bool {
        match key.location {
            FieldLocation::Global => self.live_global.contains(&key.name),
            FieldLocation::Local(node) => self.node(node).live_local.contains(&key.name),
            FieldLocation::Output { .. } => true,
        }
    }

    /// Every dictionary entry that is not live: local dictionaries in
    /// post-order, then the global dictionary.
    pub fn dead_fields(&self, doc: &Document, topo: &Topology) -> Vec<FieldKey> {
        let mut dead = Vec::new();
        for &node in topo.post_order() {
            for name in doc.node(node).local_dict.keys() {
                if !self.node(node).live_local.contains(name) {
                    dead.push(FieldKey::new(FieldLocation::Local(node), name.clone()));
                }
            }
        }
        for name in doc.global.keys() {
            if !self.live_global.contains(name) {
                dead.push(FieldKey::new(FieldLocation::Global, name.clone()));
            }
        }
        dead
    }
}

/// Compute liveness for every node and the global dictionary. `pinned`
/// names are treated as extra references made by the root.
pub fn compute_liveness(
    doc: &Document,
    topo: &Topology,
    pinned: &[Name],
) -> Result<Liveness, CleanError> {
    let mut liveness = Liveness {
        nodes: vec![NodeLiveness::default(); doc.nodes.len()],
        ..Liveness::default()
    };

    for &node in topo.post_order() {
        let frames = ancestor_frames(doc, topo, node);
        let node_liveness = aggregate(doc, topo, node, &frames, pinned, &mut liveness)?;
        trace!(
            node = %node,
            active = node_liveness.active.len(),
            live_local = node_liveness.live_local.len(),
            "node aggregated"
        );
        liveness.nodes[node.index()] = node_liveness;
    }

    let root_needs = liveness
        .node(doc.root)
        .active
        .iter()
        .filter(|(_, location)| **location == FieldLocation::Global)
        .map(|(name, _)| name.clone())
        .collect::<Vec<_>>();
    liveness.live_global = expand(root_needs, &doc.global);

    debug!(
        live_global = liveness.live_global.len(),
        live_local = liveness.nodes.iter().map(|n| n.live_local.len()).sum::<usize>(),
        derived_referenced = liveness.referencers.len(),
        "liveness computed"
    );
    Ok(liveness)
}

/// Sorts needs into local seeds and externally required names.
struct Needs<'t> {
    topo: &'t Topology,
    node: NodeIndex,
    local_seed: IndexSet<Name>,
    external: IndexMap<Name, FieldLocation>,
}

impl Needs<'_> {
    fn classify(&mut self, name: Name, location: FieldLocation) {
        match location {
            FieldLocation::Local(owner) if owner == self.node => {
                self.local_seed.insert(name);
            }
            FieldLocation::Output { node: producer, .. }
                if producer == self.node || self.topo.parent(producer) == Some(self.node) => {}
            _ => {
                self.external.entry(name).or_insert(location);
            }
        }
    }
}

fn aggregate(
    doc: &Document,
    topo: &Topology,
    node: NodeIndex,
    frames: &[Frame],
    pinned: &[Name],
    liveness: &mut Liveness,
) -> Result<NodeLiveness, CleanError> {
    let model = doc.node(node);
    let mut needs = Needs {
        topo,
        node,
        local_seed: IndexSet::new(),
        external: IndexMap::new(),
    };

    let mut direct: Vec<(Name, Frame, Site)> = find_references(model)
        .into_iter()
        .map(|r| {
            let frame = r.frame(doc, node);
            (r.name, frame, r.site)
        })
        .collect();
    if node == doc.root {
        let content = Frame::content(doc, node);
        direct.extend(pinned.iter().map(|name| (name.clone(), content, Site::Pinned)));
    }

    for (name, frame, site) in direct {
        let scope = Scope::new(frames, frame);
        let location = resolve(doc, name.as_str(), &scope)
            .ok_or_else(|| CleanError::UnresolvableReference {
                name: name.clone(),
                node,
                site,
            })?;
        if is_derived(doc, name.as_str(), location) {
            liveness
                .referencers
                .entry(FieldKey::new(location, name.clone()))
                .or_default()
                .insert(node);
        }
        needs.classify(name, location);
    }

    for child in model.children.nodes() {
        for (name, location) in &liveness.node(child).active {
            needs.classify(name.clone(), *location);
        }
    }

    let seed = std::mem::take(&mut needs.local_seed);
    let live = expand(seed, &model.local_dict);

    let content = Scope::new(frames, Frame::content(doc, node));
    let mut live_local = IndexSet::new();
    for name in live {
        if model.local_dict.contains_key(&name) {
            live_local.insert(name);
            continue;
        }
        let location = match resolve(doc, name.as_str(), &content) {
            Some(location) => location,
            None => {
                let site = model
                    .local_dict
                    .iter()
                    .find(|(_, expr)| expr.refs().contains(&name))
                    .map(|(key, _)| Site::LocalDefinition(key.clone()))
                    .unwrap_or(Site::Body);
                return Err(CleanError::UnresolvableReference { name, node, site });
            }
        };
        needs.classify(name, location);
    }

    Ok(NodeLiveness {
        active: needs.external,
        live_local,
    })
}

fn is_derived(doc: &Document, name: &str, location: FieldLocation) -> bool {
    match location {
        FieldLocation::Local(_) => true,
        FieldLocation::Global => matches!(doc.global.get(name), Some(FieldDef::Derived(_))),
        FieldLocation::Output { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DocumentBuilder;
    use crate::document::{CombineMethod, CompareOp, Expr, Literal, OutputField, Predicate};

    fn strs<'a>(names: impl IntoIterator<Item = &'a Name>) -> Vec<&'a str> {
        names.into_iter().map(|n| n.as_str()).collect()
    }

    fn run(doc: &Document, pinned: &[Name]) -> Liveness {
        let topo = Topology::build(doc).unwrap();
        compute_liveness(doc, &topo, pinned).unwrap()
    }

    #[test]
    fn leaf_keeps_used_local_and_reports_inputs() {
        let mut b = DocumentBuilder::new();
        b.input("a").input("b").input("unused");
        let leaf = b
            .node()
            .active("a")
            .active("b")
            .local("x", Expr::binary("+", Expr::field("a"), Expr::field("b")))
            .local("dead", Expr::field("unused"))
            .output(OutputField::transformed(
                "y",
                Expr::binary("*", Expr::field("x"), Expr::number("2")),
            ))
            .finish();
        let doc = b.build(leaf);
        let liveness = run(&doc, &[]);

        assert_eq!(strs(&liveness.node(leaf).live_local), vec!["x"]);
        assert_eq!(strs(liveness.node(leaf).active.keys()), vec!["a", "b"]);
        assert_eq!(strs(&liveness.live_global), vec!["a", "b"]);
    }

    #[test]
    fn chain_outputs_are_satisfied_internally() {
        let mut b = DocumentBuilder::new();
        b.input("a").input("z");
        let first = b
            .node()
            .active("a")
            .body_expr(Expr::field("a"))
            .output(OutputField::predicted("p"))
            .finish();
        let gate = Predicate::simple("p", CompareOp::GreaterThan, Literal::Number("0.5".into()));
        let second = b.node().body_expr(Expr::field("z")).finish();
        let chain = b
            .node()
            .segments(
                CombineMethod::ModelChain,
                [(Predicate::True, first), (gate, second)],
            )
            .finish();
        let doc = b.build(chain);
        let liveness = run(&doc, &[]);

        assert_eq!(strs(liveness.node(chain).active.keys()), vec!["a", "z"]);
        assert!(!liveness.node(chain).active.contains_key("p"));
    }

    #[test]
    fn later_segment_reports_earlier_output_upward_to_chain() {
        let mut b = DocumentBuilder::new();
        b.input("a");
        let first = b.node().active("a").output(OutputField::predicted("p")).finish();
        let second = b.node().body_expr(Expr::field("p")).finish();
        let chain = b.node().chain([first, second]).finish();
        let doc = b.build(chain);
        let liveness = run(&doc, &[]);

        assert_eq!(
            liveness.node(second).active.get("p"),
            Some(&FieldLocation::Output {
                node: first,
                position: 0
            })
        );
        assert!(liveness.node(chain).active.is_empty());
    }

    #[test]
    fn peers_do_not_see_each_other() {
        let mut b = DocumentBuilder::new();
        b.input("a").input("p");
        let left = b.node().output(OutputField::transformed("p2", Expr::field("a"))).finish();
        let right = b.node().body_expr(Expr::field("p")).finish();
        let root = b
            .node()
            .segments(CombineMethod::Average, [(Predicate::True, left), (Predicate::True, right)])
            .finish();
        let doc = b.build(root);
        let liveness = run(&doc, &[]);
        assert_eq!(strs(liveness.node(root).active.keys()), vec!["a", "p"]);
    }

    #[test]
    fn ancestor_local_definitions_pull_their_dependencies() {
        let mut b = DocumentBuilder::new();
        b.input("c").input("d");
        let left = b.node().body_expr(Expr::field("h")).finish();
        let right = b.node().body_expr(Expr::field("h")).finish();
        let root = b
            .node()
            .local("h", Expr::binary("*", Expr::field("c"), Expr::field("d")))
            .segments(CombineMethod::Sum, [(Predicate::True, left), (Predicate::True, right)])
            .finish();
        let doc = b.build(root);
        let liveness = run(&doc, &[]);

        assert_eq!(strs(&liveness.node(root).live_local), vec!["h"]);
        assert_eq!(strs(&liveness.live_global), vec!["c", "d"]);
        let key = FieldKey::new(FieldLocation::Local(root), Name::new("h"));
        let referencers: Vec<NodeIndex> = liveness.referencers[&key].iter().copied().collect();
        assert_eq!(referencers, vec![left, right]);
    }

    #[test]
    fn pinned_fields_are_live_at_root() {
        let mut b = DocumentBuilder::new();
        b.input("a");
        b.derived("g", Expr::field("a"));
        let root = b.node().finish();
        let doc = b.build(root);

        assert!(run(&doc, &[]).live_global.is_empty());
        let liveness = run(&doc, &[Name::new("g")]);
        assert_eq!(strs(&liveness.live_global), vec!["g", "a"]);
        let dead = liveness.dead_fields(&doc, &Topology::build(&doc).unwrap());
        assert!(dead.is_empty());
    }

    #[test]
    fn referencers_track_derived_globals_not_inputs() {
        let mut b = DocumentBuilder::new();
        b.input("a");
        b.derived("g", Expr::field("a"));
        let leaf = b
            .node()
            .body_expr(Expr::binary("+", Expr::field("g"), Expr::field("a")))
            .finish();
        let doc = b.build(leaf);
        let liveness = run(&doc, &[]);

        let g = FieldKey::new(FieldLocation::Global, Name::new("g"));
        let a = FieldKey::new(FieldLocation::Global, Name::new("a"));
        let referencers: Vec<NodeIndex> = liveness.referencers[&g].iter().copied().collect();
        assert_eq!(referencers, vec![leaf]);
        assert!(!liveness.referencers.contains_key(&a));
    }
}
