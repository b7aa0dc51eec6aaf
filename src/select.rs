// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 csp-chan contributors
//
// The select engine: a multi-way guarded choice over a set of receive and
// send candidates, blocking or non-blocking, committing at most one
// operation atomically. Generalizes the teacher's single-channel
// `recv`/`send` wait loop into a scan over many channels, guarded by
// try-lock so that a slow channel can never stall the scan and so that no
// global lock order across channels is ever required (mirrors the
// teacher's own "never hold two `IpcMutex`es at once" discipline, just
// enforced here with `try_lock` instead of by construction).

use std::sync::{Arc, MutexGuard};

use log::trace;
use rand::Rng;

use crate::channel::{Candidate, Channel, State};
use crate::error::SelectError;
use crate::wake::WakeHandle;

/// Blocks until some candidate is ready, commits it, and returns its
/// combined index: receive candidates are numbered `0..recv_chans.len()`,
/// send candidates continue on from there. Returns `Ok(None)` only once
/// every candidate channel has been closed; a blocked call unblocks as
/// soon as any *one* candidate becomes ready or closes.
///
/// `recv_bufs[i]` receives the message committed for `recv_chans[i]`;
/// `send_bufs[i]` supplies the message offered for `send_chans[i]`. Both
/// pairs of slices must have equal length, or [`SelectError::BufferLengthMismatch`]
/// is returned before anything is touched.
pub fn select<const N: usize>(
    recv_chans: &[&Channel<N>],
    recv_bufs: &mut [&mut [u8; N]],
    send_chans: &[&Channel<N>],
    send_bufs: &[&[u8; N]],
) -> Result<Option<usize>, SelectError> {
    validate_lengths(
        recv_chans.len(),
        recv_bufs.len(),
        send_chans.len(),
        send_bufs.len(),
    )?;
    if recv_chans.is_empty() && send_chans.is_empty() {
        return Err(SelectError::NoCandidates);
    }

    let wake = Arc::new(WakeHandle::new());
    for chan in recv_chans.iter().chain(send_chans.iter()) {
        chan.observers().add(wake.clone());
    }

    let committed = loop {
        match scan_once(recv_chans, send_chans) {
            ScanOutcome::AllClosed => break None,
            ScanOutcome::Ready(ready) => {
                break Some(commit_one(ready, recv_chans, recv_bufs, send_chans, send_bufs));
            }
            ScanOutcome::NoneReady => {
                // `true` as the predicate: keep waiting until a wake is
                // actually delivered, then re-scan. Spurious wakeups just
                // cost an extra scan.
                wake.wait_while(|| true);
            }
        }
    };

    for chan in recv_chans.iter().chain(send_chans.iter()) {
        chan.observers().remove(&wake);
    }

    Ok(committed)
}

/// Returns immediately: commits one ready candidate and returns its index,
/// or `Ok(None)` if nothing was ready on this single scan. No observer is
/// registered — this is a point-in-time snapshot, not a subscribe-and-wait.
pub fn try_select<const N: usize>(
    recv_chans: &[&Channel<N>],
    recv_bufs: &mut [&mut [u8; N]],
    send_chans: &[&Channel<N>],
    send_bufs: &[&[u8; N]],
) -> Result<Option<usize>, SelectError> {
    validate_lengths(
        recv_chans.len(),
        recv_bufs.len(),
        send_chans.len(),
        send_bufs.len(),
    )?;
    if recv_chans.is_empty() && send_chans.is_empty() {
        return Err(SelectError::NoCandidates);
    }

    match scan_once(recv_chans, send_chans) {
        ScanOutcome::Ready(ready) => Ok(Some(commit_one(
            ready, recv_chans, recv_bufs, send_chans, send_bufs,
        ))),
        ScanOutcome::AllClosed | ScanOutcome::NoneReady => Ok(None),
    }
}

fn validate_lengths(
    recv_chans: usize,
    recv_bufs: usize,
    send_chans: usize,
    send_bufs: usize,
) -> Result<(), SelectError> {
    if recv_chans != recv_bufs {
        return Err(SelectError::BufferLengthMismatch {
            expected: recv_chans,
            got: recv_bufs,
        });
    }
    if send_chans != send_bufs {
        return Err(SelectError::BufferLengthMismatch {
            expected: send_chans,
            got: send_bufs,
        });
    }
    Ok(())
}

enum ScanOutcome<'a, const N: usize> {
    Ready(Vec<(usize, MutexGuard<'a, State<N>>)>),
    AllClosed,
    NoneReady,
}

/// One pass over every candidate in combined order: try-lock each channel
/// (never a blocking lock — a blocking closed-check here, ordered
/// differently by two concurrent `select` calls over the same channels,
/// would reintroduce exactly the lock-order deadlock try-lock exists to
/// avoid), tally the closed ones, and record the ready ones still holding
/// their lock so the caller can commit without a second round of
/// acquisition racing a peer.
fn scan_once<'a, const N: usize>(
    recv_chans: &[&'a Channel<N>],
    send_chans: &[&'a Channel<N>],
) -> ScanOutcome<'a, N> {
    let r = recv_chans.len();
    let total = r + send_chans.len();
    let mut ready = Vec::new();
    let mut closed_count = 0usize;

    for i in 0..total {
        let (chan, candidate) = if i < r {
            (recv_chans[i], Candidate::Recv)
        } else {
            (send_chans[i - r], Candidate::Send)
        };

        let Some(guard) = chan.try_lock() else {
            continue;
        };
        if guard.closed {
            closed_count += 1;
            continue;
        }
        if Channel::<N>::is_ready_locked(&guard, candidate) {
            ready.push((i, guard));
        }
    }

    if !ready.is_empty() {
        ScanOutcome::Ready(ready)
    } else if closed_count == total {
        ScanOutcome::AllClosed
    } else {
        ScanOutcome::NoneReady
    }
}

/// Picks a uniform-random ready candidate, drops the locks on every other
/// one, and commits the chosen operation. Returns the committed candidate's
/// combined index.
fn commit_one<const N: usize>(
    mut ready: Vec<(usize, MutexGuard<'_, State<N>>)>,
    recv_chans: &[&Channel<N>],
    recv_bufs: &mut [&mut [u8; N]],
    send_chans: &[&Channel<N>],
    send_bufs: &[&[u8; N]],
) -> usize {
    let r = recv_chans.len();
    let n_ready = ready.len();
    let k = rand::thread_rng().gen_range(0..n_ready);
    let (idx, mut guard) = ready.swap_remove(k);
    // Every other ready candidate's guard drops here, releasing its lock.
    ready.clear();
    trace!("select committing index {idx} of {n_ready} ready candidate(s)");

    let candidate = if idx < r {
        Candidate::Recv
    } else {
        Candidate::Send
    };
    match candidate {
        Candidate::Recv => {
            Channel::<N>::commit_locked(&mut guard, Candidate::Recv, Some(&mut *recv_bufs[idx]), None);
        }
        Candidate::Send => {
            Channel::<N>::commit_locked(&mut guard, Candidate::Send, None, Some(send_bufs[idx - r]));
        }
    }
    drop(guard);

    let chan = if idx < r {
        recv_chans[idx]
    } else {
        send_chans[idx - r]
    };
    chan.observers().broadcast();
    chan.wake_after_commit(candidate);
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn try_select_picks_the_only_ready_recv() {
        let a = Channel::<4>::new(4);
        let b = Channel::<4>::new(4);
        b.send(&9i32.to_le_bytes());

        let mut out_a = [0u8; 4];
        let mut out_b = [0u8; 4];
        let recv_chans = [&a, &b];
        let mut recv_bufs: [&mut [u8; 4]; 2] = [&mut out_a, &mut out_b];
        let idx = try_select(&recv_chans, &mut recv_bufs, &[], &[]).unwrap();
        assert_eq!(idx, Some(1));
        assert_eq!(i32::from_le_bytes(out_b), 9);
    }

    #[test]
    fn try_select_returns_none_when_nothing_ready() {
        let a = Channel::<4>::new(4);
        let mut out = [0u8; 4];
        let recv_chans = [&a];
        let mut recv_bufs: [&mut [u8; 4]; 1] = [&mut out];
        let idx = try_select(&recv_chans, &mut recv_bufs, &[], &[]).unwrap();
        assert_eq!(idx, None);
    }

    #[test]
    fn select_blocks_until_a_send_arrives() {
        let ch = Arc::new(Channel::<4>::new(1));
        let ch2 = ch.clone();
        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            ch2.send(&42i32.to_le_bytes());
        });

        let mut out = [0u8; 4];
        let recv_chans = [ch.as_ref()];
        let mut recv_bufs: [&mut [u8; 4]; 1] = [&mut out];
        let idx = select(&recv_chans, &mut recv_bufs, &[], &[]).unwrap();
        assert_eq!(idx, Some(0));
        assert_eq!(i32::from_le_bytes(out), 42);
        sender.join().unwrap();
    }

    #[test]
    fn select_returns_none_once_all_candidates_are_closed() {
        let a = Channel::<4>::new(1);
        let b = Channel::<4>::new(1);
        a.close();
        b.close();

        let mut out_a = [0u8; 4];
        let mut out_b = [0u8; 4];
        let recv_chans = [&a, &b];
        let mut recv_bufs: [&mut [u8; 4]; 2] = [&mut out_a, &mut out_b];
        let idx = select(&recv_chans, &mut recv_bufs, &[], &[]).unwrap();
        assert_eq!(idx, None);
    }

    #[test]
    fn select_unblocks_when_one_of_several_candidates_closes() {
        let a = Arc::new(Channel::<4>::new(1));
        let a2 = a.clone();
        let closer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            a2.close();
        });

        let mut out = [0u8; 4];
        let recv_chans = [a.as_ref()];
        let mut recv_bufs: [&mut [u8; 4]; 1] = [&mut out];
        let idx = select(&recv_chans, &mut recv_bufs, &[], &[]).unwrap();
        assert_eq!(idx, None);
        closer.join().unwrap();
    }

    #[test]
    fn mismatched_buffer_counts_is_an_error() {
        let a = Channel::<4>::new(1);
        let b = Channel::<4>::new(1);
        let mut out = [0u8; 4];
        let recv_chans = [&a, &b];
        let mut recv_bufs: [&mut [u8; 4]; 1] = [&mut out];
        let err = try_select(&recv_chans, &mut recv_bufs, &[], &[]).unwrap_err();
        assert_eq!(
            err,
            SelectError::BufferLengthMismatch {
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn no_candidates_is_an_error() {
        let err: Result<Option<usize>, _> = try_select::<4>(&[], &mut [], &[], &[]);
        assert_eq!(err.unwrap_err(), SelectError::NoCandidates);
    }

    #[test]
    fn send_candidate_commits_into_a_waiting_receiver() {
        let ch = Arc::new(Channel::<4>::new(0));
        let ch2 = ch.clone();
        let receiver = thread::spawn(move || {
            let mut out = [0u8; 4];
            ch2.recv(&mut out);
            out
        });

        thread::sleep(Duration::from_millis(30));
        let msg = 7i32.to_le_bytes();
        let send_chans = [ch.as_ref()];
        let send_bufs = [&msg];
        let idx = select::<4>(&[], &mut [], &send_chans, &send_bufs).unwrap();
        assert_eq!(idx, Some(0));
        let out = receiver.join().unwrap();
        assert_eq!(i32::from_le_bytes(out), 7);
    }
}
