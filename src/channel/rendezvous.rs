// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 csp-chan contributors
//
// The rendezvous barrier: pairs exactly one sender with exactly one
// receiver on an unbuffered channel and rejects would-be peers of the
// wrong polarity. Port of the distilled spec's §4.4 pseudocode, which
// itself generalizes the teacher's single-slot handoff idea (a waiter
// advertises what it's waiting for, so a wrong-polarity arrival defers
// instead of spinning on the wrong branch).

use log::{trace, warn};

use super::{Candidate, Channel, Mode, State};

/// Phase of the single in-flight handshake slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    OneWaiting,
    HandoffDone,
}

/// A pointer to a peer's message buffer, valid only while that peer is
/// blocked inside `send`/`recv` referencing it (see `Channel::commit_locked`
/// for the safety argument).
pub(crate) enum SlotPtr<const N: usize> {
    Send(*const [u8; N]),
    Recv(RecvPtr<N>),
}

/// Newtype so we can grant `Send` to the raw pointer: it is only ever
/// dereferenced while the channel's mutex is held, and only while the
/// thread that created it is parked inside a blocking `recv` call (so the
/// pointee — that thread's `out` buffer — is still alive).
pub(crate) struct RecvPtr<const N: usize>(*mut [u8; N]);

impl<const N: usize> RecvPtr<N> {
    pub(crate) fn as_ptr(&self) -> *mut [u8; N] {
        self.0
    }
}

// SAFETY: see `SlotPtr`/`RecvPtr` doc comments above.
unsafe impl<const N: usize> Send for SlotPtr<N> {}

pub(crate) struct RendezvousState<const N: usize> {
    pub(crate) phase: Phase,
    /// Polarity of the peer the barrier is currently waiting for: `true`
    /// means a sender is expected (a receiver arrived first), `false` means
    /// a receiver is expected (a sender arrived first).
    pub(crate) expecting_sender: bool,
    pub(crate) slot: Option<SlotPtr<N>>,
}

impl<const N: usize> RendezvousState<N> {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Idle,
            expecting_sender: false,
            slot: None,
        }
    }
}

impl<const N: usize> Channel<N> {
    pub(crate) fn rendezvous_send(&self, msg: &[u8; N]) {
        self.rendezvous_op(true, None, Some(msg));
    }

    pub(crate) fn rendezvous_recv(&self, out: &mut [u8; N]) {
        self.rendezvous_op(false, Some(out), None);
    }

    /// Same as [`Channel::rendezvous_recv`], but also reports whether a
    /// real handoff occurred (`true`) or `out` was only zero-filled because
    /// the channel closed with no peer ever arriving (`false`).
    pub(crate) fn rendezvous_recv_checked(&self, out: &mut [u8; N]) -> bool {
        self.rendezvous_op(false, Some(out), None)
    }

    /// Shared routine for both polarities, following the distilled spec's
    /// `loop { switch phase { ... } }` exactly. `out`/`msg` give the
    /// caller's own buffer: the one this thread contributes if it is the
    /// first to arrive, or the one it reads/writes if it is the second.
    /// Returns `true` iff an actual handoff committed.
    fn rendezvous_op(
        &self,
        is_sender: bool,
        mut out: Option<&mut [u8; N]>,
        msg: Option<&[u8; N]>,
    ) -> bool {
        loop {
            let mut state = self.lock();
            if state.closed {
                if let Some(out) = out.as_deref_mut() {
                    *out = [0u8; N];
                }
                return false;
            }

            let phase = Self::rendezvous_state(&state).phase;
            match phase {
                Phase::Idle => {
                    let r = Self::rendezvous_state_mut(&mut state);
                    r.phase = Phase::OneWaiting;
                    r.expecting_sender = !is_sender;
                    r.slot = Some(if is_sender {
                        SlotPtr::Send(msg.expect("sender must supply a message") as *const _)
                    } else {
                        SlotPtr::Recv(RecvPtr(
                            out.as_deref_mut()
                                .expect("receiver must supply an out buffer") as *mut _,
                        ))
                    });

                    trace!("rendezvous phase Idle -> OneWaiting, expecting_sender={}", !is_sender);

                    // Still holding the lock, as the distilled spec's
                    // pseudocode orders it: advertise readiness before
                    // parking on `handoff`.
                    self.observers().broadcast();

                    while !state.closed && Self::rendezvous_state(&state).phase != Phase::HandoffDone
                    {
                        state = self.cond_a.wait(state).unwrap_or_else(|e| {
                            warn!("handoff condvar wait poisoned; recovering");
                            e.into_inner()
                        });
                    }

                    let completed = Self::rendezvous_state(&state).phase == Phase::HandoffDone;
                    let r = Self::rendezvous_state_mut(&mut state);
                    r.phase = Phase::Idle;
                    r.slot = None;
                    trace!("rendezvous phase -> Idle, handoff completed={completed}");
                    if !completed {
                        // Closed without a peer ever showing up: a blocked
                        // receive zero-fills, a blocked send is a no-op.
                        if let Some(out) = out.as_deref_mut() {
                            *out = [0u8; N];
                        }
                    }
                    drop(state);
                    self.cond_b.notify_one();
                    return completed;
                }
                Phase::OneWaiting => {
                    let expecting_sender = Self::rendezvous_state(&state).expecting_sender;
                    if expecting_sender != is_sender {
                        state = self.cond_b.wait(state).unwrap_or_else(|e| {
                            warn!("chain condvar wait poisoned; recovering");
                            e.into_inner()
                        });
                        drop(state);
                        continue;
                    }
                    let candidate = if is_sender {
                        Candidate::Send
                    } else {
                        Candidate::Recv
                    };
                    Self::commit_locked(&mut state, candidate, out.as_deref_mut(), msg);
                    drop(state);
                    self.observers().broadcast();
                    self.cond_a.notify_one();
                    return true;
                }
                Phase::HandoffDone => {
                    state = self.cond_b.wait(state).unwrap_or_else(|e| {
                        warn!("chain condvar wait poisoned; recovering");
                        e.into_inner()
                    });
                    drop(state);
                    continue;
                }
            }
        }
    }

    fn rendezvous_state(state: &State<N>) -> &RendezvousState<N> {
        match &state.mode {
            Mode::Rendezvous(r) => r,
            Mode::Buffered { .. } => unreachable!("rendezvous_op called on a buffered channel"),
        }
    }

    fn rendezvous_state_mut(state: &mut State<N>) -> &mut RendezvousState<N> {
        match &mut state.mode {
            Mode::Rendezvous(r) => r,
            Mode::Buffered { .. } => unreachable!("rendezvous_op called on a buffered channel"),
        }
    }
}
