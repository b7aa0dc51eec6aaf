// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 csp-chan contributors
//
// Per-channel set of wake-handles belonging to outstanding selectors.
// Generalizes the teacher's `BroadcastConnHead` (a 32-bit connection
// bitmask with its own spin lock, kept deliberately separate from the
// channel's data lock) into an unordered collection of `Arc<WakeHandle>`.
// A fixed bitmask only supports 32 members and is a hand-optimization for
// the teacher's shared-memory layout constraint; an in-process registry has
// no such ceiling, so a `Vec` under its own `Mutex` is the idiomatic match.
//
// The registry's lock is intentionally distinct from the channel's data
// lock: a selector always acquires its own private lock first, then (at
// most) one channel's data lock during a scan, and the observer lock is
// only ever touched while no selector-private lock is held. Keeping it
// separate preserves that order and avoids inverting it.

use std::sync::{Arc, Mutex};

use log::{trace, warn};

use crate::wake::WakeHandle;

#[derive(Default)]
pub struct ObserverRegistry {
    handles: Mutex<Vec<Arc<WakeHandle>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` as an observer. Handles may be added more than
    /// once (two selectors watching the same channel); each registration is
    /// a distinct entry.
    pub fn add(&self, handle: Arc<WakeHandle>) {
        self.handles
            .lock()
            .unwrap_or_else(|e| {
                warn!("observer registry mutex poisoned by a panicking holder; recovering");
                e.into_inner()
            })
            .push(handle);
    }

    /// Removes one occurrence of `handle`, matched by pointer identity.
    pub fn remove(&self, handle: &Arc<WakeHandle>) {
        let mut handles = self.handles.lock().unwrap_or_else(|e| {
            warn!("observer registry mutex poisoned by a panicking holder; recovering");
            e.into_inner()
        });
        if let Some(pos) = handles.iter().position(|h| Arc::ptr_eq(h, handle)) {
            handles.remove(pos);
        }
    }

    /// Wakes every currently registered observer.
    pub fn broadcast(&self) {
        let handles = self.handles.lock().unwrap_or_else(|e| {
            warn!("observer registry mutex poisoned by a panicking holder; recovering");
            e.into_inner()
        });
        trace!("broadcasting to {} observer(s)", handles.len());
        for h in handles.iter() {
            h.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn add_remove_balanced() {
        let reg = ObserverRegistry::new();
        let h1 = Arc::new(WakeHandle::new());
        let h2 = Arc::new(WakeHandle::new());
        reg.add(h1.clone());
        reg.add(h2.clone());
        reg.add(h1.clone());
        assert_eq!(reg.handles.lock().unwrap().len(), 3);

        reg.remove(&h1);
        assert_eq!(reg.handles.lock().unwrap().len(), 2);
    }

    #[test]
    fn broadcast_wakes_registered_waiters() {
        let reg = Arc::new(ObserverRegistry::new());
        let woke = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        let mut joins = Vec::new();
        for _ in 0..3 {
            let wh = Arc::new(WakeHandle::new());
            reg.add(wh.clone());
            handles.push(wh.clone());
            let woke2 = woke.clone();
            joins.push(thread::spawn(move || {
                wh.wait_while(|| woke2.load(Ordering::SeqCst) == 0);
            }));
        }

        thread::sleep(Duration::from_millis(30));
        woke.store(1, Ordering::SeqCst);
        reg.broadcast();
        for j in joins {
            j.join().unwrap();
        }
    }
}
