// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 csp-chan contributors
//
// A typed front end over the byte-blob `Channel<N>`, the way the original
// CSP library's callers wrote `chan int` rather than juggling byte
// pointers. Kept additive: the byte-blob core (`Channel<N>`) is still the
// only thing the select engine and the rendezvous barrier know about.
// Byte copies mirror the teacher's own `IpcBuffer`/`RingSlot` raw-copy
// style rather than pulling in a crate like `bytemuck` for a single
// `ptr::copy_nonoverlapping` call.

use std::marker::PhantomData;
use std::mem::size_of;
use std::ptr;

use crate::channel::Channel;

/// A channel carrying values of `T` instead of raw `[u8; N]` blobs.
///
/// `T` must be `Copy` (no destructors to run on the byte copy) and fit
/// within `N` bytes; [`TypedChannel::new`] panics otherwise, the same way
/// a fixed-width array type mismatch would be a construction-time bug,
/// not a runtime data condition.
pub struct TypedChannel<T, const N: usize> {
    inner: Channel<N>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Copy, const N: usize> TypedChannel<T, N> {
    /// Creates a typed channel. `capacity == 0` is unbuffered (rendezvous);
    /// `capacity > 0` is a buffered FIFO of that depth.
    pub fn new(capacity: usize) -> Self {
        assert!(
            size_of::<T>() <= N,
            "TypedChannel<T, {N}>: size_of::<T>() = {} exceeds message width {N}",
            size_of::<T>(),
        );
        Self {
            inner: Channel::new(capacity),
            _marker: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn is_unbuffered(&self) -> bool {
        self.inner.is_unbuffered()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn close(&self) {
        self.inner.close()
    }

    /// Byte-copies `v` into a fixed-width message and sends it. A silent
    /// no-op if the channel is already closed.
    pub fn send_value(&self, v: T) {
        let mut msg = [0u8; N];
        // SAFETY: `size_of::<T>() <= N` is checked in `new`; `v` and `msg`
        // do not overlap (`v` is a local).
        unsafe {
            ptr::copy_nonoverlapping(&v as *const T as *const u8, msg.as_mut_ptr(), size_of::<T>());
        }
        self.inner.send(&msg);
    }

    /// Receives a value, or `None` once the channel is closed and (for
    /// buffered channels) drained.
    pub fn recv_value(&self) -> Option<T> {
        let mut msg = [0u8; N];
        let delivered = self.inner.recv_checked(&mut msg);
        if !delivered {
            return None;
        }
        // SAFETY: `msg` holds exactly the bytes `send_value` wrote for some
        // `T`; `size_of::<T>() <= N` was checked in `new`, and `T: Copy` so
        // reading it out does not double-free or otherwise require `Drop`.
        let v = unsafe { ptr::read(msg.as_ptr() as *const T) };
        Some(v)
    }

    /// Exposes the underlying byte-blob channel, e.g. to pass it to
    /// `select`/`try_select` alongside other candidates.
    pub fn as_raw(&self) -> &Channel<N> {
        &self.inner
    }
}
