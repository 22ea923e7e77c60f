//! SessionRegistry - at most one stream session per device
//!
//! ## Locking
//!
//! - The map lock is held only to look up / insert / detach a slot, never
//!   across a spawn.
//! - Each device has its own slot mutex. A start holds it while spawning, so
//!   concurrent starts for the same device queue behind the winner and see
//!   its session; starts for other devices are unaffected.
//! - A removed slot is marked `retired` before it leaves the map. A start
//!   that grabbed the slot just before removal sees the flag and retries with
//!   a fresh slot, so nothing is ever spawned into a slot nobody can reach.
//!
//! Lock order is always slot -> map.

use super::session::StreamSession;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Default)]
struct Slot {
    session: Option<Arc<StreamSession>>,
    retired: bool,
}

type SlotRef = Arc<Mutex<Slot>>;

/// Result of [`SessionRegistry::insert_if_absent`]
pub enum Insertion {
    /// A session was already registered; the factory did not run
    Existing(Arc<StreamSession>),
    /// The factory ran and its session is now registered
    Created(Arc<StreamSession>),
}

impl Insertion {
    pub fn session(&self) -> &Arc<StreamSession> {
        match self {
            Insertion::Existing(s) | Insertion::Created(s) => s,
        }
    }
}

/// Concurrent device id -> session map
#[derive(Default)]
pub struct SessionRegistry {
    slots: RwLock<HashMap<String, SlotRef>>,
    closed: AtomicBool,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered session for a device
    ///
    /// Waits out a spawn in flight for the same device, so a viewer arriving
    /// mid-start sees the new session instead of a spurious miss.
    pub async fn get(&self, device_id: &str) -> Option<Arc<StreamSession>> {
        let slot = self.slots.read().await.get(device_id).cloned()?;
        let guard = slot.lock().await;
        if guard.retired {
            return None;
        }
        guard.session.clone()
    }

    /// Register a session unless one exists
    ///
    /// `factory` runs at most once per call and only while this caller owns
    /// the device slot; concurrent callers for the same device wait and get
    /// `Existing` with the winner's session. On factory error the device
    /// stays unregistered.
    pub async fn insert_if_absent<F, Fut>(&self, device_id: &str, factory: F) -> Result<Insertion>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<StreamSession>>,
    {
        let (slot, mut guard) = loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::InvalidState("stream manager is shutting down".to_string()));
            }
            let slot = self.slot_for(device_id).await;
            let guard = slot.clone().lock_owned().await;
            if !guard.retired {
                break (slot, guard);
            }
        };

        if let Some(existing) = &guard.session {
            return Ok(Insertion::Existing(existing.clone()));
        }

        // A drain may have run while this start waited for the map; a slot
        // created after it is unreachable by shutdown
        if self.closed.load(Ordering::Acquire) {
            guard.retired = true;
            self.detach(device_id, &slot).await;
            return Err(Error::InvalidState("stream manager is shutting down".to_string()));
        }

        match factory().await {
            Ok(session) => {
                let session = Arc::new(session);
                guard.session = Some(session.clone());
                Ok(Insertion::Created(session))
            }
            Err(e) => {
                guard.retired = true;
                self.detach(device_id, &slot).await;
                Err(e)
            }
        }
    }

    /// Remove and return a device's session
    ///
    /// Waits for an in-flight start on the same device, then removes what it
    /// registered. Absent key is a no-op.
    pub async fn remove(&self, device_id: &str) -> Option<Arc<StreamSession>> {
        let slot = self.slots.read().await.get(device_id).cloned()?;
        let mut guard = slot.lock().await;
        if guard.retired {
            return None;
        }

        let session = guard.session.take();
        guard.retired = true;
        self.detach(device_id, &slot).await;
        drop(guard);

        if let Some(session) = &session {
            session.cancel();
        }
        session
    }

    /// Remove a device's session only if it is still `expected`
    pub async fn remove_if_same(&self, device_id: &str, expected: &Arc<StreamSession>) -> bool {
        let Some(slot) = self.slots.read().await.get(device_id).cloned() else {
            return false;
        };
        let mut guard = slot.lock().await;
        let same = !guard.retired
            && guard
                .session
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, expected));
        if !same {
            return false;
        }

        guard.session = None;
        guard.retired = true;
        self.detach(device_id, &slot).await;
        drop(guard);

        expected.cancel();
        true
    }

    /// Point-in-time copy of registered sessions, sorted by device id
    ///
    /// Slots busy with a start or stop are skipped, never waited on.
    pub async fn snapshot_all(&self) -> Vec<(String, Arc<StreamSession>)> {
        let slots: Vec<(String, SlotRef)> = self
            .slots
            .read()
            .await
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect();

        let mut sessions: Vec<(String, Arc<StreamSession>)> = slots
            .into_iter()
            .filter_map(|(id, slot)| {
                let guard = slot.try_lock().ok()?;
                if guard.retired {
                    return None;
                }
                guard.session.clone().map(|s| (id, s))
            })
            .collect();
        sessions.sort_by(|a, b| a.0.cmp(&b.0));
        sessions
    }

    /// Close the registry and remove every session
    ///
    /// Later starts fail with `InvalidState`. In-flight starts are waited
    /// for so their sessions are returned too.
    pub async fn drain(&self) -> Vec<Arc<StreamSession>> {
        self.closed.store(true, Ordering::Release);

        let slots: Vec<SlotRef> = {
            let mut map = self.slots.write().await;
            map.drain().map(|(_, slot)| slot).collect()
        };

        let mut sessions = Vec::with_capacity(slots.len());
        for slot in slots {
            let mut guard = slot.lock().await;
            guard.retired = true;
            if let Some(session) = guard.session.take() {
                session.cancel();
                sessions.push(session);
            }
        }
        sessions
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of registered sessions
    pub async fn len(&self) -> usize {
        self.snapshot_all().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn slot_for(&self, device_id: &str) -> SlotRef {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(device_id) {
                return slot.clone();
            }
        }

        let mut slots = self.slots.write().await;
        slots
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Slot::default())))
            .clone()
    }

    /// Drop `slot` from the map if it is still the current one for the key
    async fn detach(&self, device_id: &str, slot: &SlotRef) {
        let mut slots = self.slots.write().await;
        if slots
            .get(device_id)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            slots.remove(device_id);
        }
    }
}
