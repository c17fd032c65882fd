//! Point-to-claim resolution.
//!
//! The data store's own lookup is preferred when a known arity exists. When it
//! is missing or finds nothing, every claim whose footprint holds the point is
//! collected (subdivisions included) and the most specific one is picked.

mod native;
pub mod tie_break;

pub use native::ClaimAtShape;

use bevy::log::debug;

use crate::capability::CapabilityResolver;
use crate::claim::ClaimHandle;
use crate::config::{WORLD_MAX_HEIGHT_METHOD, WORLD_MIN_HEIGHT_METHOD};
use crate::host::Location;
use crate::tree::ClaimTreeWalker;
use tie_break::Candidate;

pub struct ClaimLocator<'a> {
    resolver: &'a CapabilityResolver,
}

impl<'a> ClaimLocator<'a> {
    pub fn new(resolver: &'a CapabilityResolver) -> Self {
        Self { resolver }
    }

    pub fn locate(&self, world: &str, x: f64, y: f64, z: f64) -> Option<ClaimHandle> {
        self.locate_at(&Location::new(world, x, y, z))
    }

    /// The most specific claim containing `loc`, if any.
    pub fn locate_at(&self, loc: &Location) -> Option<ClaimHandle> {
        let binding = self.resolver.available_binding()?;
        if let Some(shape) = binding.claim_at {
            for ignore_height in [true, false] {
                match shape.lookup(&binding.data_store, loc, ignore_height) {
                    Ok(Some(found)) => return Some(self.resolver.handle(found)),
                    Ok(None) => {}
                    Err(e) => {
                        debug!("native claim lookup {shape:?} failed: {e}");
                        break;
                    }
                }
            }
        }
        self.scan(loc)
    }

    /// Brute-force scan over the whole hierarchy. Subtrees whose root does not
    /// hold the point's column are skipped.
    pub fn scan(&self, loc: &Location) -> Option<ClaimHandle> {
        let walker = ClaimTreeWalker::new(self.resolver);
        let holds_column = |claim: &ClaimHandle| claim.contains(loc, true).unwrap_or(false);
        let containing: Vec<ClaimHandle> = walker.walk_pruned(holds_column).filter(holds_column).collect();
        if containing.is_empty() {
            return None;
        }

        let supports_3d = self.resolver.detect_fork_variant().supports_3d;
        let threshold = self.world_height_span(&loc.world) - self.resolver.config().full_height_slack;
        let candidates: Vec<Candidate> = containing
            .iter()
            .map(|claim| Candidate {
                area: claim.area(),
                vertical: claim.vertical_range(),
                is_3d: claim.is_3d(supports_3d, threshold),
            })
            .collect();
        let winner = tie_break::pick(&candidates, loc.block_y())?;
        containing.into_iter().nth(winner)
    }

    /// Height of the world in blocks, from the host world when it reports its
    /// bounds, else from configuration.
    pub fn world_height_span(&self, world: &str) -> i64 {
        let config = self.resolver.config();
        let fallback = config.world_max_y - config.world_min_y;
        let Some(world) = self.resolver.runtime().world(world) else {
            return fallback;
        };
        let min = world.call(WORLD_MIN_HEIGHT_METHOD, &[]).ok().and_then(|v| v.as_int());
        let max = world.call(WORLD_MAX_HEIGHT_METHOD, &[]).ok().and_then(|v| v.as_int());
        match (min, max) {
            (Some(min), Some(max)) if max > min => max - min,
            _ => fallback,
        }
    }
}
