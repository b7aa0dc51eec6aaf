// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 csp-chan contributors
//
// Generalizes the teacher's `Waiter` (a named, shared-memory condition
// variable + mutex + quit flag used to block/wake IPC channel peers) into an
// in-process primitive: a `Mutex<bool>` + `Condvar` pair where the bool
// records whether a wake has happened since the waiter last checked. Every
// blocking wait in this crate — a channel's `not_full`/`not_empty`/`handoff`/
// `chain` condition variables and a selector's private wake-handle — is an
// instance of this same small building block.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use log::warn;

fn recover_poison<T>(e: std::sync::PoisonError<T>) -> T {
    warn!("wake-handle mutex poisoned by a panicking holder; recovering");
    e.into_inner()
}

/// A mutex-guarded condition variable with a sticky "woken" flag.
///
/// `wait_while` loops on `pred` exactly like a bare `Condvar::wait_while`;
/// the flag exists so that [`WakeHandle::notify_one`]/[`WakeHandle::notify_all`]
/// calls that race ahead of a waiter entering `wait` are not lost (the
/// waiter observes the flag is already set and skips the wait).
pub struct WakeHandle {
    woken: Mutex<bool>,
    cond: Condvar,
}

impl WakeHandle {
    pub fn new() -> Self {
        Self {
            woken: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Blocks until `pred()` returns `false`, consuming one pending wake per
    /// loop iteration. Spurious wakeups are harmless: the predicate is
    /// re-checked on every return from `wait`.
    pub fn wait_while<F>(&self, mut pred: F)
    where
        F: FnMut() -> bool,
    {
        let guard = self.woken.lock().unwrap_or_else(recover_poison);
        let _guard = self
            .cond
            .wait_while(guard, |woken| {
                if !pred() {
                    return false;
                }
                if *woken {
                    *woken = false;
                    false
                } else {
                    true
                }
            })
            .unwrap_or_else(recover_poison);
    }

    /// Blocks until `pred()` returns `false` or `timeout` elapses. Returns
    /// `true` if woken before the timeout, `false` on timeout.
    pub fn wait_while_timeout<F>(&self, mut pred: F, timeout: Duration) -> bool
    where
        F: FnMut() -> bool,
    {
        let guard = self.woken.lock().unwrap_or_else(recover_poison);
        let (_guard, result) = self
            .cond
            .wait_timeout_while(guard, timeout, |woken| {
                if !pred() {
                    return false;
                }
                if *woken {
                    *woken = false;
                    false
                } else {
                    true
                }
            })
            .unwrap_or_else(recover_poison);
        !result.timed_out()
    }

    /// Wakes exactly one waiter (or primes the flag for the next one to
    /// arrive, if none is currently waiting).
    pub fn notify_one(&self) {
        let mut woken = self.woken.lock().unwrap_or_else(recover_poison);
        *woken = true;
        self.cond.notify_one();
    }

    /// Wakes every current and (once, sticky) future waiter.
    pub fn notify_all(&self) {
        let mut woken = self.woken.lock().unwrap_or_else(recover_poison);
        *woken = true;
        self.cond.notify_all();
    }
}

impl Default for WakeHandle {
    fn default() -> Self {
        Self::new()
    }
}
