// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 csp-chan contributors
//
// The channel object: composes a ring buffer (buffered mode) or a single
// in-flight rendezvous slot (unbuffered mode) with a mutex, two condition
// variables, a closed flag, and an observer registry.
//
// Generalizes the teacher's `ChanInner` (shared-memory ring + named
// waiters, one per role: write/read/connection) into an in-process
// `Mutex<State<N>>` guarding either a `RingBuffer<N>` or the rendezvous
// barrier fields, plus two `Condvar`s whose role is named per mode (see
// `cond_a`/`cond_b` below) exactly as the distilled spec's data model
// describes.

mod rendezvous;

pub(crate) use rendezvous::{Phase, RendezvousState, SlotPtr};

use std::sync::{Condvar, Mutex, MutexGuard};

use log::{debug, trace, warn};

use crate::observer::ObserverRegistry;
use crate::ring::RingBuffer;

/// Which side of a communication a ready/commit check is being asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Candidate {
    Recv,
    Send,
}

pub(crate) enum Mode<const N: usize> {
    Buffered { ring: RingBuffer<N> },
    Rendezvous(RendezvousState<N>),
}

pub(crate) struct State<const N: usize> {
    pub(crate) closed: bool,
    pub(crate) mode: Mode<N>,
}

/// A CSP-style channel carrying fixed-width `N`-byte messages.
///
/// `Channel::<N>::new(0)` creates an unbuffered (rendezvous) channel;
/// `Channel::<N>::new(capacity)` with `capacity > 0` creates a bounded FIFO
/// of that depth. Both modes share the same `send`/`recv`/`close` surface.
pub struct Channel<const N: usize> {
    capacity: usize,
    state: Mutex<State<N>>,
    /// Buffered mode: `not_full`, signaled after a receive or close.
    /// Rendezvous mode: `handoff`, signaled when the second peer completes
    /// the copy, waking the first peer back up.
    cond_a: Condvar,
    /// Buffered mode: `not_empty`, signaled after a send or close.
    /// Rendezvous mode: `chain`, signaled when the barrier returns to Idle,
    /// waking any wrong-polarity or third-arrived peer.
    cond_b: Condvar,
    observers: ObserverRegistry,
}

impl<const N: usize> Channel<N> {
    /// Creates a new channel. `capacity == 0` is unbuffered (rendezvous);
    /// `capacity > 0` is a buffered FIFO of that depth.
    pub fn new(capacity: usize) -> Self {
        let mode = if capacity == 0 {
            Mode::Rendezvous(RendezvousState::new())
        } else {
            Mode::Buffered {
                ring: RingBuffer::new(capacity),
            }
        };
        Self {
            capacity,
            state: Mutex::new(State {
                closed: false,
                mode,
            }),
            cond_a: Condvar::new(),
            cond_b: Condvar::new(),
            observers: ObserverRegistry::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_unbuffered(&self) -> bool {
        self.capacity == 0
    }

    fn lock(&self) -> MutexGuard<'_, State<N>> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("channel data mutex poisoned by a panicking holder; recovering");
            e.into_inner()
        })
    }

    /// Monotonic closed query. Idempotent to call more than once.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Closes the channel. Idempotent: the second and later calls are no-ops.
    /// Wakes every waiter on the channel and every registered observer.
    pub fn close(&self) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        debug!("channel closed, waking all waiters and observers");
        self.observers.broadcast();
        self.cond_a.notify_all();
        self.cond_b.notify_all();
    }

    /// Sends `msg`. A silent no-op if the channel is already closed.
    pub fn send(&self, msg: &[u8; N]) {
        if self.is_unbuffered() {
            self.rendezvous_send(msg);
        } else {
            self.buffered_send(msg);
        }
    }

    /// Receives into `out`. Zero-fills `out` once the channel is closed and
    /// (for buffered channels) drained.
    pub fn recv(&self, out: &mut [u8; N]) {
        self.recv_checked(out);
    }

    /// Same as [`Channel::recv`], but also reports whether `out` holds a
    /// real message (`true`) or was only zero-filled because the channel is
    /// closed and (for buffered channels) drained (`false`).
    pub(crate) fn recv_checked(&self, out: &mut [u8; N]) -> bool {
        if self.is_unbuffered() {
            self.rendezvous_recv_checked(out)
        } else {
            self.buffered_recv_checked(out)
        }
    }

    // -- Buffered mode (§4.3) ------------------------------------------

    fn buffered_send(&self, msg: &[u8; N]) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        while !state.closed && !Self::is_ready_locked(&state, Candidate::Send) {
            state = self.cond_a.wait(state).unwrap_or_else(|e| {
                warn!("not_full condvar wait poisoned; recovering");
                e.into_inner()
            });
        }
        if state.closed {
            return;
        }
        Self::commit_locked(&mut state, Candidate::Send, None, Some(msg));
        drop(state);
        self.observers.broadcast();
        self.cond_b.notify_one();
    }

    fn buffered_recv_checked(&self, out: &mut [u8; N]) -> bool {
        let mut state = self.lock();
        if state.closed && !Self::is_ready_locked(&state, Candidate::Recv) {
            *out = [0u8; N];
            return false;
        }
        while !state.closed && !Self::is_ready_locked(&state, Candidate::Recv) {
            state = self.cond_b.wait(state).unwrap_or_else(|e| {
                warn!("not_empty condvar wait poisoned; recovering");
                e.into_inner()
            });
        }
        if state.closed && !Self::is_ready_locked(&state, Candidate::Recv) {
            *out = [0u8; N];
            return false;
        }
        Self::commit_locked(&mut state, Candidate::Recv, Some(out), None);
        drop(state);
        self.observers.broadcast();
        self.cond_a.notify_one();
        true
    }

    // -- Shared readiness/commit, reused by direct send/recv, the
    //    rendezvous submodule, and the select engine. ----------------

    pub(crate) fn is_ready_locked(state: &State<N>, candidate: Candidate) -> bool {
        match &state.mode {
            Mode::Buffered { ring } => match candidate {
                Candidate::Recv => !ring.is_empty(),
                Candidate::Send => !ring.is_full(),
            },
            Mode::Rendezvous(r) => match candidate {
                // A receive can commit iff a sender already arrived first.
                Candidate::Recv => r.phase == Phase::OneWaiting && !r.expecting_sender,
                // A send can commit iff a receiver already arrived first.
                Candidate::Send => r.phase == Phase::OneWaiting && r.expecting_sender,
            },
        }
    }

    pub(crate) fn commit_locked(
        state: &mut State<N>,
        candidate: Candidate,
        recv_out: Option<&mut [u8; N]>,
        send_msg: Option<&[u8; N]>,
    ) {
        match &mut state.mode {
            Mode::Buffered { ring } => {
                match candidate {
                    Candidate::Recv => ring.pop(recv_out.expect("recv commit needs an out buffer")),
                    Candidate::Send => ring.push(send_msg.expect("send commit needs a message")),
                }
                trace!("buffered {candidate:?} committed, {} now queued", ring.len());
            }
            Mode::Rendezvous(r) => {
                match candidate {
                    Candidate::Send => {
                        let Some(SlotPtr::Recv(ptr)) = &r.slot else {
                            unreachable!(
                                "commit on Send candidate without a parked receiver slot"
                            );
                        };
                        let dest = ptr.as_ptr();
                        let msg = send_msg.expect("send commit needs a message");
                        // SAFETY: `dest` was stashed by the first-arrived
                        // receiver and remains valid: that thread is
                        // blocked inside `recv` on `cond_a`, its stack
                        // frame (and `out` buffer) is still alive.
                        unsafe { *dest = *msg };
                    }
                    Candidate::Recv => {
                        let Some(SlotPtr::Send(ptr)) = &r.slot else {
                            unreachable!(
                                "commit on Recv candidate without a parked sender slot"
                            );
                        };
                        let src = *ptr;
                        let out = recv_out.expect("recv commit needs an out buffer");
                        // SAFETY: see above, mirrored for the sender side.
                        unsafe { *out = *src };
                    }
                }
                r.phase = Phase::HandoffDone;
                r.slot = None;
                trace!("rendezvous handoff committed via {candidate:?}, phase -> HandoffDone");
            }
        }
    }

    /// Wakes the right condition variable after a successful commit,
    /// whether it came from direct send/recv or from the select engine.
    pub(crate) fn wake_after_commit(&self, candidate: Candidate) {
        if self.is_unbuffered() {
            self.cond_a.notify_one(); // handoff
        } else {
            match candidate {
                Candidate::Recv => self.cond_a.notify_one(), // not_full
                Candidate::Send => self.cond_b.notify_one(), // not_empty
            }
        }
    }

    // -- Select engine hooks --------------------------------------------

    pub(crate) fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    pub(crate) fn try_lock(&self) -> Option<MutexGuard<'_, State<N>>> {
        match self.state.try_lock() {
            Ok(guard) => Some(guard),
            Err(std::sync::TryLockError::Poisoned(e)) => {
                warn!("channel data mutex poisoned by a panicking holder; recovering");
                Some(e.into_inner())
            }
            Err(std::sync::TryLockError::WouldBlock) => None,
        }
    }
}

impl<const N: usize> Drop for Channel<N> {
    fn drop(&mut self) {
        // Destroy is close-then-reclaim: close unwedges any straggling
        // waiter before the mutex, condvars, registry, and buffer are
        // dropped along with `self`. Destroying a channel while operations
        // are still in flight on *other* handles to it is undefined; this
        // crate only exposes shared channels via `Arc<Channel<N>>`, so
        // `Drop` only runs once every sender/receiver/selector holding a
        // reference has already gone away.
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn buffered_fifo() {
        let ch = Channel::<4>::new(4);
        for i in 0..4i32 {
            ch.send(&i.to_le_bytes());
        }
        for i in 0..4i32 {
            let mut out = [0u8; 4];
            ch.recv(&mut out);
            assert_eq!(i32::from_le_bytes(out), i);
        }
    }

    #[test]
    fn close_then_drain_then_zero() {
        let ch = Channel::<4>::new(4);
        ch.send(&7i32.to_le_bytes());
        ch.send(&8i32.to_le_bytes());
        ch.send(&9i32.to_le_bytes());
        ch.close();

        let mut out = [0u8; 4];
        ch.recv(&mut out);
        assert_eq!(i32::from_le_bytes(out), 7);
        ch.recv(&mut out);
        assert_eq!(i32::from_le_bytes(out), 8);
        ch.recv(&mut out);
        assert_eq!(i32::from_le_bytes(out), 9);
        ch.recv(&mut out);
        assert_eq!(out, [0u8; 4]);
    }

    #[test]
    fn send_on_closed_is_silent_noop() {
        let ch = Channel::<4>::new(4);
        ch.close();
        ch.send(&1i32.to_le_bytes()); // must not block or panic
        let mut out = [0u8; 4];
        ch.recv(&mut out);
        assert_eq!(out, [0u8; 4]);
    }

    #[test]
    fn close_is_idempotent_and_monotonic() {
        let ch = Channel::<4>::new(1);
        assert!(!ch.is_closed());
        ch.close();
        assert!(ch.is_closed());
        ch.close();
        assert!(ch.is_closed());
    }

    #[test]
    fn rendezvous_pairs_sender_and_receiver() {
        let ch = Arc::new(Channel::<4>::new(0));
        let ch2 = ch.clone();

        let start = Instant::now();
        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            ch2.send(&12345i32.to_le_bytes());
        });

        let mut out = [0u8; 4];
        ch.recv(&mut out);
        let waited = start.elapsed();

        sender.join().unwrap();
        assert_eq!(i32::from_le_bytes(out), 12345);
        assert!(waited >= Duration::from_millis(45));
    }

    #[test]
    fn buffered_fifth_send_blocks_until_a_receive() {
        let ch = Arc::new(Channel::<4>::new(4));
        for i in 0..4i32 {
            ch.send(&i.to_le_bytes());
        }

        let ch2 = ch.clone();
        let blocked = thread::spawn(move || {
            ch2.send(&4i32.to_le_bytes());
        });

        thread::sleep(Duration::from_millis(30));
        assert!(!blocked.is_finished());

        let mut out = [0u8; 4];
        ch.recv(&mut out);
        assert_eq!(i32::from_le_bytes(out), 0);

        blocked.join().unwrap();
    }

    #[test]
    fn no_wedge_after_close_unblocks_blocked_receiver() {
        let ch = Arc::new(Channel::<4>::new(0));
        let ch2 = ch.clone();
        let receiver = thread::spawn(move || {
            let mut out = [0u8; 4];
            ch2.recv(&mut out);
            out
        });

        thread::sleep(Duration::from_millis(30));
        ch.close();
        let out = receiver.join().unwrap();
        assert_eq!(out, [0u8; 4]);
    }
}
