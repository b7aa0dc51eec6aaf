// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 csp-chan contributors
//
// Typed error surface, following the sibling ring-channel crate's
// `ChannelError` pattern (a small `thiserror::Error` enum of named
// variants) rather than the teacher's raw `io::Error`, since none of
// these failures originate from an OS syscall.

use thiserror::Error;

/// Errors that can occur when building a `select`/`try_select` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SelectError {
    /// A receive-candidate's output buffer slice had a different length
    /// than its corresponding channel slice.
    #[error("select: {got} receive buffers supplied for {expected} receive candidates")]
    BufferLengthMismatch { expected: usize, got: usize },

    /// `select`/`try_select` was called with no candidates at all.
    #[error("select: no candidates supplied")]
    NoCandidates,
}
