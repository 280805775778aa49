//! Pass 3: relocation of live derived fields to their minimal scope.
//!
//! A field's referencers are the nodes whose own content uses it plus the
//! final placement of every live definition that uses it. Fields are placed
//! consumers first, so a producer sees where its consumers ended up. The
//! target is the lowest common ancestor of the referencers, where the root
//! stands for the global dictionary when the field started out there. A
//! root-local definition whose users meet only at the root moves to the
//! global dictionary too, as long as everything it reads is visible there.
//!
//! Placement never changes what a moved definition refers to: if a name in
//! the definition would resolve differently at the target, the target climbs
//! toward the field's home until every reference matches again.

use crate::document::{Document, Expr, FieldDef, Name, NodeIndex};
use crate::error::{CleanError, Site};
use crate::pass2_liveness::Liveness;
use crate::scope::{ancestor_frames, resolve, FieldKey, FieldLocation, Frame, Placement, Scope};
use crate::topology::Topology;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// A planned or applied move of one derived-field definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relocation {
    pub name: Name,
    pub from: Placement,
    pub to: Placement,
}

struct Candidate {
    key: FieldKey,
    home: Placement,
    /// Each name the definition uses, with where it resolves at home.
    uses: Vec<(Name, FieldLocation)>,
}

/// Compute where every live derived field belongs. Only fields whose
/// placement changes are returned, in discovery order (local dictionaries in
/// post-order, then the global dictionary).
pub fn plan_relocations(
    doc: &Document,
    topo: &Topology,
    liveness: &Liveness,
) -> Result<Vec<Relocation>, CleanError> {
    let candidates = collect_candidates(doc, topo, liveness)?;
    let index: IndexMap<&FieldKey, usize> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (&c.key, i))
        .collect();

    // producers[i]: candidates that i's definition uses
    // consumers[j]: candidates whose definitions use j
    let mut producers: Vec<IndexSet<usize>> = vec![IndexSet::new(); candidates.len()];
    let mut consumers: Vec<IndexSet<usize>> = vec![IndexSet::new(); candidates.len()];
    for (i, candidate) in candidates.iter().enumerate() {
        for (name, location) in &candidate.uses {
            let key = FieldKey::new(*location, name.clone());
            if let Some(&j) = index.get(&key) {
                producers[i].insert(j);
                consumers[j].insert(i);
            }
        }
    }

    let order = consumers_first(&candidates, &producers, &consumers)?;
    let liftable = liftable_root_locals(topo, &candidates, &producers);

    let mut placements: Vec<Option<Placement>> = vec![None; candidates.len()];
    for i in order {
        let candidate = &candidates[i];
        let mut global_consumer = false;
        let mut sites: IndexSet<NodeIndex> = liveness
            .referencers
            .get(&candidate.key)
            .cloned()
            .unwrap_or_default();
        for &c in &consumers[i] {
            match placements[c] {
                Some(Placement::Node(node)) => {
                    sites.insert(node);
                }
                Some(Placement::Global) => global_consumer = true,
                None => {}
            }
        }
        let placement = place(doc, topo, candidate, &sites, global_consumer, liftable[i]);
        placements[i] = Some(placement);
    }

    let mut moves = Vec::new();
    for (candidate, placement) in candidates.iter().zip(placements) {
        let to = placement.unwrap_or(candidate.home);
        if to != candidate.home {
            trace!(
                field = %candidate.key.name,
                from = %candidate.home,
                to = %to,
                "relocation planned"
            );
            moves.push(Relocation {
                name: candidate.key.name.clone(),
                from: candidate.home,
                to,
            });
        }
    }
    debug!(candidates = candidates.len(), moves = moves.len(), "relocations planned");
    Ok(moves)
}

/// Move definitions between dictionaries. Removal keeps the relative order of
/// the remaining entries; moved entries are appended to their destination.
pub fn apply_relocations(doc: &mut Document, moves: &[Relocation]) {
    for relocation in moves {
        let expr = match relocation.from {
            Placement::Global => match doc.global.shift_remove(&relocation.name) {
                Some(FieldDef::Derived(expr)) => Some(expr),
                Some(input) => {
                    // Inputs never move; put it back where it was.
                    doc.global.insert(relocation.name.clone(), input);
                    None
                }
                None => None,
            },
            Placement::Node(node) => doc.node_mut(node).local_dict.shift_remove(&relocation.name),
        };
        let Some(expr) = expr else {
            continue;
        };
        match relocation.to {
            Placement::Global => {
                doc.global.insert(relocation.name.clone(), FieldDef::Derived(expr));
            }
            Placement::Node(node) => {
                doc.node_mut(node)
                    .local_dict
                    .insert(relocation.name.clone(), expr);
            }
        }
    }
}

fn collect_candidates(
    doc: &Document,
    topo: &Topology,
    liveness: &Liveness,
) -> Result<Vec<Candidate>, CleanError> {
    let mut candidates = Vec::new();

    for &node in topo.post_order() {
        let frames = ancestor_frames(doc, topo, node);
        let scope = Scope::new(&frames, Frame::content(doc, node));
        for (name, expr) in &doc.node(node).local_dict {
            if !liveness.node(node).live_local.contains(name) {
                continue;
            }
            let site = Site::LocalDefinition(name.clone());
            let home = Placement::Node(node);
            candidates.push(Candidate {
                key: FieldKey::new(home.location(), name.clone()),
                home,
                uses: resolve_uses(doc, expr, &scope, node, site)?,
            });
        }
    }

    for (name, def) in &doc.global {
        let FieldDef::Derived(expr) = def else {
            continue;
        };
        if !liveness.live_global.contains(name) {
            continue;
        }
        let site = Site::GlobalDefinition(name.clone());
        candidates.push(Candidate {
            key: FieldKey::new(FieldLocation::Global, name.clone()),
            home: Placement::Global,
            uses: resolve_uses(doc, expr, &Scope::global(), doc.root, site)?,
        });
    }

    Ok(candidates)
}

fn resolve_uses(
    doc: &Document,
    expr: &Expr,
    scope: &Scope<'_>,
    node: NodeIndex,
    site: Site,
) -> Result<Vec<(Name, FieldLocation)>, CleanError> {
    expr.refs()
        .into_iter()
        .map(|name| match resolve(doc, name.as_str(), scope) {
            Some(location) => Ok((name, location)),
            None => Err(CleanError::UnresolvableReference {
                name,
                node,
                site: site.clone(),
            }),
        })
        .collect()
}

/// Kahn's algorithm over "consumer before producer". The initial queue and
/// every release follow discovery order. Anything left over sits on a cycle.
fn consumers_first(
    candidates: &[Candidate],
    producers: &[IndexSet<usize>],
    consumers: &[IndexSet<usize>],
) -> Result<Vec<usize>, CleanError> {
    let mut pending: Vec<usize> = consumers.iter().map(IndexSet::len).collect();
    let mut queue: VecDeque<usize> = (0..candidates.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(candidates.len());

    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &j in &producers[i] {
            pending[j] -= 1;
            if pending[j] == 0 {
                queue.push_back(j);
            }
        }
    }

    if order.len() < candidates.len() {
        if let Some(stuck) = (0..candidates.len()).find(|&i| pending[i] > 0) {
            return Err(CleanError::CyclicDefinition {
                name: candidates[stuck].key.name.clone(),
            });
        }
    }
    Ok(order)
}

/// Root-local definitions that could live in the global dictionary: every
/// name they use is global, or is another root-local definition that could
/// move along with them.
fn liftable_root_locals(
    topo: &Topology,
    candidates: &[Candidate],
    producers: &[IndexSet<usize>],
) -> Vec<bool> {
    let root_home = Placement::Node(topo.root());
    let mut liftable: Vec<bool> = candidates
        .iter()
        .map(|c| {
            c.home == root_home
                && c.uses.iter().all(|(_, location)| match location {
                    FieldLocation::Global => true,
                    FieldLocation::Local(node) => *node == topo.root(),
                    FieldLocation::Output { .. } => false,
                })
        })
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..candidates.len() {
            let blocked = producers[i]
                .iter()
                .any(|&j| candidates[j].home == root_home && !liftable[j]);
            if liftable[i] && blocked {
                liftable[i] = false;
                changed = true;
            }
        }
    }
    liftable
}

fn place(
    doc: &Document,
    topo: &Topology,
    candidate: &Candidate,
    sites: &IndexSet<NodeIndex>,
    global_consumer: bool,
    liftable: bool,
) -> Placement {
    let lca = topo.lca_all(sites.iter().copied());

    // Users spread over several nodes that only meet at the root share the
    // global dictionary.
    if liftable {
        let shared_at_root = lca == Some(topo.root()) && sites.len() > 1;
        if global_consumer || shared_at_root {
            return Placement::Global;
        }
    }

    let Some(lca) = lca else {
        return candidate.home;
    };

    match candidate.home {
        Placement::Global => {
            if global_consumer {
                return Placement::Global;
            }
            let mut target = lca;
            loop {
                if target == topo.root() {
                    return Placement::Global;
                }
                if sees_same_fields(doc, topo, candidate, target) {
                    return Placement::Node(target);
                }
                target = topo.parent(target).unwrap_or(topo.root());
            }
        }
        Placement::Node(home) => {
            if !topo.is_ancestor_or_self(home, lca) {
                return candidate.home;
            }
            let mut target = lca;
            while target != home && !sees_same_fields(doc, topo, candidate, target) {
                target = topo.parent(target).unwrap_or(home);
            }
            Placement::Node(target)
        }
    }
}

fn sees_same_fields(
    doc: &Document,
    topo: &Topology,
    candidate: &Candidate,
    target: NodeIndex,
) -> bool {
    let frames = ancestor_frames(doc, topo, target);
    let scope = Scope::new(&frames, Frame::content(doc, target));
    candidate
        .uses
        .iter()
        .all(|(name, location)| resolve(doc, name.as_str(), &scope) == Some(*location))
}
