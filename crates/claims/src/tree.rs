//! Walking claim hierarchies of arbitrary depth.
//!
//! One fork nests subdivisions inside subdivisions without limit, so walks use
//! an explicit stack. The external model is not expected to contain cycles;
//! with `cycle_guard` on, a claim reached twice is skipped and reported.
//! Claims are told apart by object identity, so the guard keeps every visited
//! handle alive until the walk ends; a freed address is never mistaken for a
//! claim already seen.

use std::collections::HashSet;

use bevy::log::{debug, warn};

use crate::capability::CapabilityResolver;
use crate::claim::ClaimHandle;
use crate::host::Value;

type DescendFilter<'a> = Box<dyn Fn(&ClaimHandle) -> bool + 'a>;

#[derive(Clone, Copy)]
pub struct ClaimTreeWalker<'a> {
    resolver: &'a CapabilityResolver,
}

impl<'a> ClaimTreeWalker<'a> {
    pub fn new(resolver: &'a CapabilityResolver) -> Self {
        Self { resolver }
    }

    /// Direct children of `claim`. Each children accessor the class exposes is
    /// tried in priority order (methods, then fields); the first non-null
    /// collection wins. Unknown shapes read as no children.
    pub fn children_of(&self, claim: &ClaimHandle) -> Vec<ClaimHandle> {
        for getter in &claim.accessors().children {
            match getter.read(claim.object()) {
                Ok(value) => {
                    if let Some(items) = value.into_sequence() {
                        return items
                            .into_iter()
                            .filter_map(Value::into_object)
                            .map(|o| claim.cache().handle(o))
                            .collect();
                    }
                }
                Err(e) => debug!("children via {} failed: {e}", getter.name()),
            }
        }
        Vec::new()
    }

    /// Top-level claims known to the data store.
    pub fn roots(&self) -> Vec<ClaimHandle> {
        self.resolver
            .top_level_claims()
            .into_iter()
            .map(|o| self.resolver.handle(o))
            .collect()
    }

    /// Depth-first, pre-order walk over every claim in the store.
    pub fn walk(&self) -> ClaimWalk<'a> {
        ClaimWalk::new(*self, self.roots(), None)
    }

    /// Like [`walk`](Self::walk), but only descends into claims accepted by
    /// `descend`. Rejected claims are still yielded.
    pub fn walk_pruned(&self, descend: impl Fn(&ClaimHandle) -> bool + 'a) -> ClaimWalk<'a> {
        ClaimWalk::new(*self, self.roots(), Some(Box::new(descend)))
    }

    /// Every claim below `claim`, excluding `claim` itself.
    pub fn descendants(&self, claim: &ClaimHandle) -> Vec<ClaimHandle> {
        ClaimWalk::new(*self, self.children_of(claim), None).collect()
    }

    /// Locate a claim anywhere in the hierarchy by exact id match.
    pub fn find_by_id(&self, id: &str) -> Option<ClaimHandle> {
        if !self.resolver.is_available() {
            return None;
        }
        self.walk().find(|claim| claim.id().as_deref() == Some(id))
    }
}

/// Claims seen so far in one walk.
#[derive(Default)]
struct Visited {
    keys: HashSet<usize>,
    held: Vec<ClaimHandle>,
}

impl Visited {
    fn first_visit(&mut self, claim: &ClaimHandle) -> bool {
        if !self.keys.insert(claim.key()) {
            return false;
        }
        self.held.push(claim.clone());
        true
    }
}

/// Iterator state for a depth-first claim walk.
pub struct ClaimWalk<'a> {
    walker: ClaimTreeWalker<'a>,
    stack: Vec<ClaimHandle>,
    visited: Option<Visited>,
    descend: Option<DescendFilter<'a>>,
    repeats: usize,
}

impl<'a> ClaimWalk<'a> {
    fn new(
        walker: ClaimTreeWalker<'a>,
        mut roots: Vec<ClaimHandle>,
        descend: Option<DescendFilter<'a>>,
    ) -> Self {
        roots.reverse();
        let visited = walker
            .resolver
            .config()
            .cycle_guard
            .then(Visited::default);
        Self {
            walker,
            stack: roots,
            visited,
            descend,
            repeats: 0,
        }
    }

    /// Claims reached more than once and skipped by the cycle guard.
    pub fn repeats(&self) -> usize {
        self.repeats
    }
}

impl Iterator for ClaimWalk<'_> {
    type Item = ClaimHandle;

    fn next(&mut self) -> Option<ClaimHandle> {
        while let Some(claim) = self.stack.pop() {
            if let Some(visited) = &mut self.visited {
                if !visited.first_visit(&claim) {
                    self.repeats += 1;
                    if self.repeats == 1 {
                        warn!("claim hierarchy revisits {claim:?}; skipping repeated claims");
                    }
                    continue;
                }
            }
            let descend = self.descend.as_ref().is_none_or(|keep| keep(&claim));
            if descend {
                let children = self.walker.children_of(&claim);
                self.stack.extend(children.into_iter().rev());
            }
            return Some(claim);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::ClaimWalk;
    use crate::config::BridgeConfig;
    use crate::host::{ClassRef, HostError, HostObject, ObjectRef, Value};
    use crate::test_harness::{ClaimSpec, ForkProfile, TestHost};

    /// 1 > {2 > {3 > {4}}, 5}, plus an unrelated 6.
    fn forest() -> Vec<ClaimSpec> {
        vec![
            ClaimSpec::column(1, 0, 0, 100, 100)
                .child(
                    ClaimSpec::column(2, 0, 0, 50, 50)
                        .child(ClaimSpec::column(3, 0, 0, 20, 20).child(ClaimSpec::column(4, 0, 0, 5, 5))),
                )
                .child(ClaimSpec::column(5, 60, 60, 90, 90)),
            ClaimSpec::column(6, 500, 500, 520, 520),
        ]
    }

    fn ids(claims: impl IntoIterator<Item = crate::claim::ClaimHandle>) -> Vec<String> {
        claims.into_iter().filter_map(|c| c.id()).collect()
    }

    #[test]
    fn test_walk_is_preorder_and_complete() {
        for fork in [ForkProfile::legacy(), ForkProfile::modern(), ForkProfile::three_d()] {
            let mut host = TestHost::new(fork.clone()).with_claims(forest());
            let bridge = host.bridge();
            assert_eq!(
                ids(bridge.tree().walk()),
                vec!["1", "2", "3", "4", "5", "6"],
                "{}",
                fork.claim_class
            );
        }
    }

    #[test]
    fn test_children_of_leaf_is_empty() {
        let mut host = TestHost::new(ForkProfile::modern()).with_claims(forest());
        let bridge = host.bridge();
        let leaf = bridge.find_by_id("4").expect("leaf");
        assert!(bridge.tree().children_of(&leaf).is_empty());

        let root = bridge.find_by_id("1").expect("root");
        assert_eq!(ids(bridge.tree().children_of(&root)), vec!["2", "5"]);
    }

    #[test]
    fn test_descendants_exclude_the_claim_itself() {
        let mut host = TestHost::new(ForkProfile::three_d()).with_claims(forest());
        let bridge = host.bridge();
        let plot = bridge.find_by_id("2").expect("plot");
        assert_eq!(ids(bridge.tree().descendants(&plot)), vec!["3", "4"]);
    }

    #[test]
    fn test_pruned_walk_yields_but_skips_subtree() {
        let mut host = TestHost::new(ForkProfile::legacy()).with_claims(forest());
        let bridge = host.bridge();
        let walk = bridge
            .tree()
            .walk_pruned(|claim| claim.id().as_deref() != Some("2"));
        assert_eq!(ids(walk), vec!["1", "2", "5", "6"]);
    }

    #[test]
    fn test_find_by_id_is_exact_match() {
        let mut host = TestHost::new(ForkProfile::legacy()).with_claims(forest());
        let bridge = host.bridge();
        assert!(bridge.find_by_id("4").is_some());
        assert!(bridge.find_by_id("04").is_none());
        assert!(bridge.find_by_id("4 ").is_none());
        assert!(bridge.find_by_id("7").is_none());
    }

    #[test]
    fn test_cycle_guard_visits_each_claim_once() {
        let mut host = TestHost::new(ForkProfile::legacy()).with_claims(forest());
        let top = host.claim(1);
        host.claim(4).adopt(&top);
        let bridge = host.bridge();

        let mut walk = bridge.tree().walk();
        let seen = ids(walk.by_ref());
        assert_eq!(seen, vec!["1", "2", "3", "4", "5", "6"]);
        assert_eq!(walk.repeats(), 1);
        assert!(bridge.find_by_id("missing").is_none(), "search terminates");
    }

    #[test]
    fn test_without_cycle_guard_repeats_are_yielded() {
        // A diamond is finite, so the unguarded walk still ends.
        let mut host = TestHost::new(ForkProfile::legacy())
            .with_config(BridgeConfig {
                cycle_guard: false,
                ..BridgeConfig::default()
            })
            .with_claims(forest());
        host.claim(5).adopt(&host.claim(3));
        let bridge = host.bridge();
        assert_eq!(ids(bridge.tree().walk()), vec!["1", "2", "3", "4", "5", "3", "4", "6"]);
    }

    #[test]
    fn test_unavailable_store_finds_nothing() {
        let mut host = TestHost::new(ForkProfile::legacy()).with_claims(forest());
        host.unload_store();
        let bridge = host.bridge();
        assert!(bridge.find_by_id("1").is_none());
    }

    /// Wraps every object it returns in a new allocation, as a host bridge
    /// that does not intern its objects would.
    struct Rewrapped(ObjectRef);

    impl Rewrapped {
        fn wrap(value: Value) -> Value {
            match value {
                Value::Object(o) => Value::Object(Arc::new(Rewrapped(o))),
                Value::List(items) => Value::List(items.into_iter().map(Self::wrap).collect()),
                other => other,
            }
        }
    }

    impl HostObject for Rewrapped {
        fn class(&self) -> ClassRef {
            self.0.class()
        }

        fn call(&self, method: &str, args: &[Value]) -> Result<Value, HostError> {
            self.0.call(method, args).map(Self::wrap)
        }

        fn get(&self, field: &str) -> Result<Value, HostError> {
            self.0.get(field).map(Self::wrap)
        }
    }

    #[test]
    fn test_cycle_guard_with_fresh_objects_per_read() {
        const DEPTH: i64 = 60;
        let chain = (1..DEPTH)
            .rev()
            .fold(ClaimSpec::column(DEPTH, 0, 0, 1, 1), |inner, id| {
                ClaimSpec::column(id, 0, 0, 1, 1).child(inner)
            });
        let mut host = TestHost::new(ForkProfile::legacy()).with_claim(chain);
        let bridge = host.bridge();
        let root: ObjectRef = Arc::new(Rewrapped(host.claim(1)));
        let root = bridge.resolver().handle(root);

        // Yielded handles are dropped at once, freeing each wrapper.
        let mut walk = ClaimWalk::new(bridge.tree(), vec![root], None);
        let mut count = 0;
        for claim in walk.by_ref() {
            assert!(claim.id().is_some());
            count += 1;
        }
        assert_eq!(count, DEPTH as usize);
        assert_eq!(walk.repeats(), 0);
    }
}
