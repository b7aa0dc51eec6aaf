// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 csp-chan contributors
//
// CSP-style channels: rendezvous (unbuffered) and bounded-FIFO (buffered)
// message passing between OS threads, plus a randomized multi-way select
// over sets of send/receive candidates. See `channel::Channel` for the
// core type and `select` for the guarded-choice engine.

mod channel;
mod observer;
mod ring;
mod wake;

pub mod error;
pub mod select;
pub mod thread;
pub mod typed;

pub use channel::Channel;
pub use error::SelectError;
pub use select::{select, try_select};
pub use typed::TypedChannel;
