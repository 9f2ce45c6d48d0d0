//! Client registry and focus ring (§4.4): the ordered set of endpoints, the
//! focus cursor, and the atomic focus transition protocol.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use vmswitch_event::FocusDirection;
use vmswitch_protocol::Command;

use crate::adapters::{ConsoleBackend, ConsoleFrontend};
use crate::endpoint::Endpoint;

/// A cheap, lock-free snapshot of which slot currently has focus. Endpoints
/// read this (via [`EndpointContext`](crate::endpoint::EndpointContext)) to
/// decide whether an incoming LED update should be pushed to the physical
/// console, without contending the registry mutex.
#[derive(Clone)]
pub struct FocusCell(Arc<AtomicI64>);

impl FocusCell {
    fn new(slot_id: i64) -> Self {
        Self(Arc::new(AtomicI64::new(slot_id)))
    }

    pub fn is_focused(&self, slot_id: i64) -> bool {
        self.0.load(Ordering::SeqCst) == slot_id
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self, slot_id: i64) {
        self.0.store(slot_id, Ordering::SeqCst);
    }
}

struct RegistryInner {
    /// Sorted ascending by `slot_id` (R1), except for the brief window
    /// between a collision insert and the stale entry's eager detach (§9).
    clients: Vec<Endpoint>,
    /// Index into `clients` of the currently focused member (R2).
    focused_idx: usize,
    next_instance_id: u64,
}

/// Ordered set of guest endpoints plus the focus cursor (§4.4). Cheap to
/// clone; every clone shares the same underlying state.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Mutex<RegistryInner>>,
    focus: FocusCell,
    backend: Arc<dyn ConsoleBackend>,
    frontend: Arc<dyn ConsoleFrontend>,
}

impl Registry {
    /// Build a registry seeded with the immortal host client at slot 0 (E2).
    pub fn new(backend: Arc<dyn ConsoleBackend>, frontend: Arc<dyn ConsoleFrontend>) -> Self {
        let host = Endpoint::host();
        let focus = FocusCell::new(host.slot_id);
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                clients: vec![host],
                focused_idx: 0,
                next_instance_id: 1,
            })),
            focus,
            backend,
            frontend,
        }
    }

    /// The [`FocusCell`] to hand to newly attached endpoints' shared context.
    pub fn focus_cell(&self) -> FocusCell {
        self.focus.clone()
    }

    pub async fn focused_slot(&self) -> i64 {
        self.focus.get()
    }

    /// A cloneable handle to the currently focused endpoint, for forwarding
    /// input commands without holding the registry lock for the round trip.
    pub async fn focused_handle(&self) -> crate::endpoint::EndpointHandle {
        let inner = self.inner.lock().await;
        inner.clients[inner.focused_idx].handle()
    }

    /// Insertion (§4.4): walk the ordered sequence, insert before the first
    /// member whose `slot_id` is greater. On a `slot_id` collision, log a
    /// warning, insert after the existing member, and eagerly schedule the
    /// stale (pre-existing) entry for detach (§9 open question resolution)
    /// rather than leaving its fate to a future read error.
    pub async fn insert(&self, mut endpoint: Endpoint) -> u64 {
        let mut inner = self.inner.lock().await;
        let instance_id = inner.next_instance_id;
        inner.next_instance_id += 1;
        endpoint.instance_id = instance_id;
        let slot_id = endpoint.slot_id;

        let stale_idx = inner.clients.iter().position(|c| c.slot_id == slot_id);
        let insert_at = inner
            .clients
            .iter()
            .position(|c| c.slot_id > slot_id)
            .unwrap_or(inner.clients.len());
        inner.clients.insert(insert_at, endpoint);
        if insert_at <= inner.focused_idx {
            inner.focused_idx += 1;
        }

        if let Some(stale_idx) = stale_idx {
            // `stale_idx` was computed against the pre-insertion Vec and a
            // slot_id match necessarily sits before `insert_at` (the first
            // *greater* slot_id), so it is unaffected by the insert above
            // and still names the pre-existing, stale member.
            let stale = &inner.clients[stale_idx];
            tracing::warn!(
                slot_id,
                stale_instance = stale.instance_id,
                new_instance = instance_id,
                "slot id collision on insert; eagerly detaching stale endpoint"
            );
            stale.mark_inactive();
        }

        instance_id
    }

    /// Remove a specific (slot_id, instance_id) member, e.g. from a reader
    /// or regulator task that observed fatal I/O. A no-op if that exact
    /// instance is no longer present (already removed by a racing detach).
    /// The host (slot 0) is never removed (E2).
    pub async fn remove_instance(&self, slot_id: i64, instance_id: u64) {
        if slot_id == 0 {
            return;
        }
        let mut inner = self.inner.lock().await;
        let Some(idx) = inner
            .clients
            .iter()
            .position(|c| c.slot_id == slot_id && c.instance_id == instance_id)
        else {
            return;
        };

        // R3/property 5: removal of the focused member is preceded by a
        // focus transition to the host, before the unlink.
        if inner.focused_idx == idx {
            self.switch_locked(&mut inner, 0, true).await;
        }

        inner.clients.remove(idx);
        let focused_idx = inner.focused_idx;
        if idx < focused_idx {
            inner.focused_idx = focused_idx - 1;
        }

        tracing::info!(slot_id, instance_id, "endpoint removed from registry");
    }

    /// Advance focus to the successor (`Next`) or predecessor (`Previous`)
    /// in the ordered sequence, wrapping at either end (§4.4).
    pub async fn focus_advance(&self, direction: FocusDirection) {
        let mut inner = self.inner.lock().await;
        let len = inner.clients.len();
        let new_idx = match direction {
            FocusDirection::Next => (inner.focused_idx + 1) % len,
            FocusDirection::Previous => (inner.focused_idx + len - 1) % len,
        };
        self.switch_locked(&mut inner, new_idx, false).await;
    }

    /// The seven-step focus transition protocol (§4.4). Runs with the
    /// registry lock held for its entire duration, serializing focus
    /// transitions against each other and against insert/remove (§5).
    async fn switch_locked(&self, inner: &mut RegistryInner, new_idx: usize, teardown: bool) {
        let old_idx = inner.focused_idx;
        if old_idx >= inner.clients.len() || new_idx >= inner.clients.len() {
            tracing::warn!("focus transition target is out of range, aborting");
            return;
        }

        // Step 2: release any still-held keys on the departing guest, unless
        // this is a teardown transition (the departing endpoint may already
        // be gone).
        if !teardown {
            let old = &inner.clients[old_idx];
            if let Err(e) = old.send_command(Command::SendKbdReset).await {
                tracing::warn!(slot_id = old.slot_id, error = %e, "kbd-reset on focus-out failed");
            }
        }

        // Step 3: leaving the host grabs the console before the frontend
        // switch; leaving a guest only preps the frontend.
        let old_domain = inner.clients[old_idx].domain_id().await;
        if old_domain == 0 {
            self.frontend.prep_switch(true).await;
            self.backend.lock().await;
        } else {
            self.frontend.prep_switch(false).await;
        }

        // Step 4: atomically swap the focus pointer.
        inner.focused_idx = new_idx;
        let new_slot_id = inner.clients[new_idx].slot_id;
        self.focus.set(new_slot_id);

        // Step 5: bring the new target's display forward.
        let new_domain = inner.clients[new_idx].domain_id().await;
        let new_pid = inner.clients[new_idx].process_id().await;
        self.frontend.domain_switch(new_domain, new_pid, new_slot_id).await;

        // Step 6: arriving at the host releases the console, mirroring step 3.
        if new_domain == 0 {
            self.backend.release().await;
        }

        // Step 7: apply the new focus target's cached LED state.
        let leds = inner.clients[new_idx].led_state().await;
        self.backend.set_leds(leds).await;

        tracing::info!(
            from_slot = inner.clients.get(old_idx).map(|c| c.slot_id).unwrap_or(-1),
            to_slot = new_slot_id,
            teardown,
            "focus transition complete"
        );
    }

    /// Process-wide teardown (§5): release the console and mark every
    /// non-host endpoint inactive so their reader/regulator tasks wind down.
    pub async fn close_all(&self) {
        let inner = self.inner.lock().await;
        for client in inner.clients.iter().skip(1) {
            client.mark_inactive();
        }
    }

    /// The current registry order, by `slot_id` (R1). Exposed for tests and
    /// any future status/introspection surface.
    pub async fn slot_ids(&self) -> Vec<i64> {
        self.inner.lock().await.clients.iter().map(|c| c.slot_id).collect()
    }

    /// A copy of `slot_id`'s cached state, if it is currently a member.
    pub async fn cache_for(&self, slot_id: i64) -> Option<crate::endpoint::EndpointCache> {
        let inner = self.inner.lock().await;
        let endpoint = inner.clients.iter().find(|c| c.slot_id == slot_id)?;
        Some(*endpoint.cache.read().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{NullConsoleBackend, NullConsoleFrontend};

    fn new_registry() -> Registry {
        Registry::new(Arc::new(NullConsoleBackend), Arc::new(NullConsoleFrontend))
    }

    #[tokio::test]
    async fn starts_with_only_the_immortal_host() {
        let registry = new_registry();
        assert_eq!(registry.slot_ids().await, vec![0]);
        assert_eq!(registry.focused_slot().await, 0);
    }

    #[tokio::test]
    async fn focus_advance_on_single_member_registry_is_a_noop() {
        let registry = new_registry();
        registry.focus_advance(FocusDirection::Next).await;
        assert_eq!(registry.focused_slot().await, 0);
    }
}
