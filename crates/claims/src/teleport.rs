//! Teleporting an entity to a safe standing spot.
//!
//! The target column is read on the thread that owns the target location, and
//! the entity is moved on the thread that owns the entity. The two can differ.

use std::sync::{Arc, Mutex, PoisonError};

use bevy::log::{debug, warn};

use crate::claim::ClaimHandle;
use crate::config::{HIGHEST_BLOCK_METHOD, TELEPORT_METHODS};
use crate::context::BridgeContext;
use crate::error::BridgeError;
use crate::host::{HostError, Location, ObjectRef, Value};
use crate::scheduler::TaskHandle;

#[derive(Debug, Clone, PartialEq)]
pub enum TeleportOutcome {
    Teleported(Location),
    Failed(String),
}

/// One block above the highest solid block of the target's column, centred
/// on the block.
pub fn standing_location(world: &ObjectRef, target: &Location) -> Result<Location, HostError> {
    let highest = world
        .call(
            HIGHEST_BLOCK_METHOD,
            &[Value::Int(target.block_x()), Value::Int(target.block_z())],
        )?
        .as_int()
        .ok_or_else(|| HostError::IllegalArgument(format!("{HIGHEST_BLOCK_METHOD} returned no height")))?;
    Ok(Location::new(
        target.world.clone(),
        target.block_x() as f64 + 0.5,
        (highest + 1) as f64,
        target.block_z() as f64 + 0.5,
    ))
}

fn teleport_entity(entity: &ObjectRef, dest: &Location) -> Result<(), HostError> {
    let mut last = HostError::no_such_method(entity.class().name(), TELEPORT_METHODS[0]);
    for method in TELEPORT_METHODS {
        match entity.call(method, &[Value::Location(dest.clone())]) {
            Ok(_) => return Ok(()),
            Err(e) => {
                debug!("{method} unavailable: {e}");
                last = e;
            }
        }
    }
    Err(last)
}

type Completion = Arc<Mutex<Option<Box<dyn FnOnce(TeleportOutcome) + Send>>>>;

fn finish(done: &Completion, outcome: TeleportOutcome) {
    let callback = done.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(callback) = callback {
        callback(outcome);
    }
}

/// Move `entity` onto the surface at `target`'s column.
///
/// Fails only if the location-affine hop cannot be scheduled. Anything that
/// goes wrong after that is reported through `on_complete`.
pub fn safe_teleport(
    ctx: &Arc<BridgeContext>,
    entity: &ObjectRef,
    target: &Location,
    on_complete: impl FnOnce(TeleportOutcome) + Send + 'static,
) -> Result<TaskHandle, BridgeError> {
    let callback: Box<dyn FnOnce(TeleportOutcome) + Send> = Box::new(on_complete);
    let done: Completion = Arc::new(Mutex::new(Some(callback)));
    let hop_ctx = Arc::clone(ctx);
    let entity = entity.clone();
    let target_loc = target.clone();
    let handle = ctx.scheduler().run_at_location(target, move || {
        let dest = hop_ctx
            .resolver()
            .runtime()
            .world(&target_loc.world)
            .ok_or_else(|| HostError::IllegalArgument(format!("world {} not loaded", target_loc.world)))
            .and_then(|world| standing_location(&world, &target_loc));
        let dest = match dest {
            Ok(dest) => dest,
            Err(e) => {
                warn!("No safe spot at {target_loc}: {e}");
                finish(&done, TeleportOutcome::Failed(e.to_string()));
                return;
            }
        };
        let mover = entity.clone();
        let moved = Arc::clone(&done);
        let scheduled = hop_ctx.scheduler().run_at_entity(&entity, move || {
            let outcome = match teleport_entity(&mover, &dest) {
                Ok(()) => TeleportOutcome::Teleported(dest),
                Err(e) => TeleportOutcome::Failed(e.to_string()),
            };
            finish(&moved, outcome);
        });
        match scheduled {
            Ok(handle) if handle.is_scheduled() => {}
            Ok(_) => finish(&done, TeleportOutcome::Failed("entity is gone".to_string())),
            Err(e) => {
                warn!("Teleport to {target_loc} abandoned: {e}");
                finish(&done, TeleportOutcome::Failed(e.to_string()));
            }
        }
    })?;
    Ok(handle)
}

/// Teleport to the horizontal centre of a claim.
pub fn teleport_to_claim(
    ctx: &Arc<BridgeContext>,
    entity: &ObjectRef,
    claim: &ClaimHandle,
    on_complete: impl FnOnce(TeleportOutcome) + Send + 'static,
) -> Result<TaskHandle, BridgeError> {
    let describe = || claim.id().unwrap_or_else(|| "<unknown>".to_string());
    let corners = claim
        .corners()
        .ok_or_else(|| BridgeError::ClaimGeometry(describe()))?;
    let world = claim
        .world()
        .ok_or_else(|| BridgeError::ClaimGeometry(describe()))?;
    let (x, z) = corners.center();
    let target = Location::new(world, x, corners.max_y as f64, z);
    safe_teleport(ctx, entity, &target, on_complete)
}
