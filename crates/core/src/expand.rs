//! Dependency expander: transitive closure of live names over a pool of
//! derived-field definitions.

use crate::document::{Expr, FieldDef, Name};
use indexmap::{IndexMap, IndexSet};

/// A set of named definitions that liveness can expand through.
pub trait DefinitionPool {
    /// The defining expression for `name`, if the pool holds a derived field
    /// under that name.
    fn definition(&self, name: &str) -> Option<&Expr>;
}

impl DefinitionPool for IndexMap<Name, Expr> {
    fn definition(&self, name: &str) -> Option<&Expr> {
        self.get(name)
    }
}

impl DefinitionPool for IndexMap<Name, FieldDef> {
    fn definition(&self, name: &str) -> Option<&Expr> {
        self.get(name).and_then(FieldDef::expr)
    }
}

/// Expand `seed` through `pool`.
///
/// The result holds the seed plus every name reachable through a pool
/// definition, in discovery order. Names without a definition in the pool are
/// kept but not expanded; the caller decides where they resolve. Each name is
/// expanded at most once, so cyclic definitions terminate.
pub fn expand<P>(seed: impl IntoIterator<Item = Name>, pool: &P) -> IndexSet<Name>
where
    P: DefinitionPool + ?Sized,
{
    let mut live: IndexSet<Name> = seed.into_iter().collect();
    // `live` doubles as the worklist: everything before `cursor` is expanded.
    let mut cursor = 0;
    while let Some(name) = live.get_index(cursor).cloned() {
        cursor += 1;
        if let Some(expr) = pool.definition(name.as_str()) {
            expr.collect_refs(&mut live);
        }
    }
    live
}
