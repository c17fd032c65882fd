//! Free-text input through a temporary sign.
//!
//! A sign is placed out of sight below the player and its editor opened. The
//! first non-empty submitted line answers the prompt. If nothing arrives
//! within the timeout the prompt counts as cancelled. Either way the original
//! block comes back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bevy::log::{debug, warn};
use bevy::prelude::{Event, Resource};

use crate::config::{
    ENTITY_LOCATION_METHOD, ENTITY_UNIQUE_ID_METHOD, GET_BLOCK_METHOD, OPEN_SIGN_METHOD,
    PROMPT_SIGN_DEPTH, SET_BLOCK_METHOD, SET_SIGN_LINES_METHOD, SIGN_BLOCK,
};
use crate::context::BridgeContext;
use crate::error::BridgeError;
use crate::host::{HostError, Location, ObjectRef, Value};
use crate::scheduler::TaskHandle;

/// Lines a player submitted from a sign editor.
#[derive(Event, Debug, Clone)]
pub struct SignSubmitted {
    pub player_id: String,
    pub lines: Vec<String>,
}

type PromptCallback = Box<dyn FnOnce(Option<String>) + Send>;
type BlockSlot = Arc<Mutex<Option<Value>>>;

struct PendingPrompt {
    generation: u64,
    sign_at: Location,
    original: BlockSlot,
    timeout: Option<TaskHandle>,
    on_complete: PromptCallback,
}

/// Prompts waiting for an answer, one per player.
#[derive(Default)]
pub struct PromptRegistry {
    pending: Mutex<HashMap<String, PendingPrompt>>,
    next_generation: AtomicU64,
}

#[derive(Resource, Clone, Default)]
pub struct SignPrompts(pub Arc<PromptRegistry>);

fn player_identity(player: &ObjectRef) -> Result<(String, Location), HostError> {
    let id = player
        .call(ENTITY_UNIQUE_ID_METHOD, &[])?
        .to_identity_string()
        .ok_or_else(|| HostError::IllegalArgument("player has no unique id".to_string()))?;
    let at = player.call(ENTITY_LOCATION_METHOD, &[])?;
    let at = at
        .as_location()
        .ok_or_else(|| HostError::IllegalArgument("player has no location".to_string()))?;
    Ok((id, at.clone()))
}

/// The first line with visible text, trimmed.
pub fn first_answer(lines: &[String]) -> Option<String> {
    lines
        .iter()
        .map(|line| line.trim())
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

fn restore_block(ctx: &BridgeContext, sign_at: &Location, original: &BlockSlot) {
    let saved = original.lock().unwrap_or_else(PoisonError::into_inner).take();
    let Some(saved) = saved else {
        return;
    };
    let Some(world) = ctx.resolver().runtime().world(&sign_at.world) else {
        warn!("Cannot restore block at {sign_at}: world not loaded");
        return;
    };
    if let Err(e) = world.call(SET_BLOCK_METHOD, &[Value::Location(sign_at.clone()), saved]) {
        warn!("Cannot restore block at {sign_at}: {e}");
    }
}

fn place_sign(world: &ObjectRef, at: &Location, lines: Vec<Value>, original: &BlockSlot) -> Result<(), HostError> {
    let here = Value::Location(at.clone());
    let previous = world.call(GET_BLOCK_METHOD, &[here.clone()])?;
    *original.lock().unwrap_or_else(PoisonError::into_inner) = Some(previous);
    world.call(SET_BLOCK_METHOD, &[here.clone(), Value::str(SIGN_BLOCK)])?;
    world.call(SET_SIGN_LINES_METHOD, &[here, Value::List(lines)])?;
    Ok(())
}

/// Everything the placement task needs to show one prompt.
struct SignRequest {
    player_id: String,
    generation: u64,
    at: Location,
    text: Vec<Value>,
    original: BlockSlot,
}

/// Place the sign, then hand off to the player's thread to open its editor.
/// Runs on the thread owning the sign's region.
fn show_sign(
    ctx: &Arc<BridgeContext>,
    registry: &Arc<PromptRegistry>,
    viewer: &ObjectRef,
    request: SignRequest,
) -> Result<(), BridgeError> {
    let SignRequest { player_id, generation, at, text, original } = request;
    let world = ctx
        .resolver()
        .runtime()
        .world(&at.world)
        .ok_or_else(|| HostError::Invocation(format!("world {} not loaded", at.world)))?;
    place_sign(&world, &at, text, &original)?;

    let (open_ctx, open_registry) = (Arc::clone(ctx), Arc::clone(registry));
    let opener = viewer.clone();
    let handle = ctx.scheduler().run_at_entity(viewer, move || {
        if let Err(e) = opener.call(OPEN_SIGN_METHOD, &[Value::Location(at.clone())]) {
            warn!("Sign editor at {at} not opened: {e}");
            open_registry.abandon(&open_ctx, &player_id, generation);
        }
    })?;
    if !handle.is_scheduled() {
        return Err(HostError::Invocation("player left before the sign editor opened".to_string()).into());
    }
    Ok(())
}

impl PromptRegistry {
    /// Ask `player` for a line of text. `on_complete` receives the answer, or
    /// `None` on timeout, when superseded by a newer prompt, or when the sign
    /// could not be shown. It may run on any thread.
    pub fn open(
        self: &Arc<Self>,
        ctx: &Arc<BridgeContext>,
        player: &ObjectRef,
        lines: &[String],
        on_complete: impl FnOnce(Option<String>) + Send + 'static,
    ) -> Result<(), BridgeError> {
        let (player_id, standing) = player_identity(player)?;
        let sign_at = Location::new(
            standing.world.clone(),
            standing.block_x() as f64,
            (standing.block_y() as f64 - PROMPT_SIGN_DEPTH).floor(),
            standing.block_z() as f64,
        );

        self.cancel(ctx, &player_id);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let original: BlockSlot = Arc::default();
        self.lock().insert(
            player_id.clone(),
            PendingPrompt {
                generation,
                sign_at: sign_at.clone(),
                original: Arc::clone(&original),
                timeout: None,
                on_complete: Box::new(on_complete),
            },
        );

        let place_ctx = Arc::clone(ctx);
        let place_registry = Arc::clone(self);
        let viewer = player.clone();
        let request = SignRequest {
            player_id: player_id.clone(),
            generation,
            at: sign_at.clone(),
            text: lines.iter().map(|l| Value::str(l.as_str())).collect(),
            original,
        };
        let placed = ctx.scheduler().run_at_location(&sign_at, move || {
            let (player_id, at) = (request.player_id.clone(), request.at.clone());
            if let Err(e) = show_sign(&place_ctx, &place_registry, &viewer, request) {
                warn!("Sign prompt at {at} abandoned: {e}");
                place_registry.abandon(&place_ctx, &player_id, generation);
            }
        });
        if let Err(e) = placed {
            self.lock().remove(&player_id);
            return Err(e.into());
        }

        let registry = Arc::clone(self);
        let expire_ctx = Arc::clone(ctx);
        let expire_id = player_id.clone();
        let timeout = ctx.scheduler().run_at_location_later(
            &sign_at,
            ctx.config().prompt_timeout_ticks,
            move || registry.expire(&expire_ctx, &expire_id, generation),
        );
        match timeout {
            Ok(handle) => {
                if let Some(entry) = self.lock().get_mut(&player_id) {
                    if entry.generation == generation {
                        entry.timeout = Some(handle);
                    }
                }
                Ok(())
            }
            Err(e) => {
                self.cancel(ctx, &player_id);
                Err(e.into())
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingPrompt>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve a pending prompt with submitted lines. False if the player had
    /// no prompt open.
    pub fn submit(&self, ctx: &Arc<BridgeContext>, player_id: &str, lines: &[String]) -> bool {
        let Some(entry) = self.lock().remove(player_id) else {
            debug!("sign submission from {player_id} without an open prompt");
            return false;
        };
        if let Some(timeout) = &entry.timeout {
            timeout.cancel();
        }
        let restore_ctx = Arc::clone(ctx);
        let sign_at = entry.sign_at.clone();
        let original = Arc::clone(&entry.original);
        let restore_at = sign_at.clone();
        if let Err(e) = ctx.scheduler().run_at_location(&sign_at, move || {
            restore_block(&restore_ctx, &restore_at, &original)
        }) {
            warn!("Sign at {sign_at} left in place: {e}");
        }
        (entry.on_complete)(first_answer(lines));
        true
    }

    /// Drop a prompt without an answer once its timeout fires. Runs the
    /// restore inline, so call it from the thread owning the sign's region.
    fn expire(&self, ctx: &BridgeContext, player_id: &str, generation: u64) {
        if let Some(entry) = self.take(player_id, Some(generation)) {
            debug!("sign prompt for {player_id} timed out");
            restore_block(ctx, &entry.sign_at, &entry.original);
            (entry.on_complete)(None);
        }
    }

    /// Drop a prompt whose sign could not be shown. Ignored when a newer
    /// prompt has replaced it.
    fn abandon(&self, ctx: &Arc<BridgeContext>, player_id: &str, generation: u64) {
        if let Some(entry) = self.take(player_id, Some(generation)) {
            Self::finish_unanswered(ctx, entry);
        }
    }

    /// Cancel the player's open prompt, if any.
    pub fn cancel(&self, ctx: &Arc<BridgeContext>, player_id: &str) {
        if let Some(entry) = self.take(player_id, None) {
            Self::finish_unanswered(ctx, entry);
        }
    }

    /// Remove the player's entry, only if it is `generation` when given.
    fn take(&self, player_id: &str, generation: Option<u64>) -> Option<PendingPrompt> {
        let mut pending = self.lock();
        match pending.get(player_id) {
            Some(entry) if generation.is_none_or(|g| g == entry.generation) => {
                pending.remove(player_id)
            }
            _ => None,
        }
    }

    fn finish_unanswered(ctx: &Arc<BridgeContext>, entry: PendingPrompt) {
        if let Some(timeout) = &entry.timeout {
            timeout.cancel();
        }
        let restore_ctx = Arc::clone(ctx);
        let restore_at = entry.sign_at.clone();
        let original = Arc::clone(&entry.original);
        if let Err(e) = ctx.scheduler().run_at_location(&entry.sign_at, move || {
            restore_block(&restore_ctx, &restore_at, &original)
        }) {
            warn!("Sign at {} left in place: {e}", entry.sign_at);
        }
        (entry.on_complete)(None);
    }

    pub fn is_pending(&self, player_id: &str) -> bool {
        self.lock().contains_key(player_id)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_answer_skips_blank_lines() {
        let lines = vec![
            String::new(),
            "   ".to_string(),
            "  Mailbox ".to_string(),
            "ignored".to_string(),
        ];
        assert_eq!(first_answer(&lines).as_deref(), Some("Mailbox"));
    }

    #[test]
    fn test_all_blank_is_no_answer() {
        assert_eq!(first_answer(&[String::new(), " ".to_string()]), None);
        assert_eq!(first_answer(&[]), None);
    }
}
