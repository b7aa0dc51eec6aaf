// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 csp-chan contributors
//
// Thread creation/join/sleep, consumed by the channel engine only through
// this narrow surface ("launch a function on a fresh task", "wait for it
// to finish") so that the synchronization core never depends on how tasks
// are actually scheduled. Thin wrappers over `std::thread`, the way the
// teacher never reimplements a mutex or a thread itself but wraps the
// platform primitive with its own naming and error convention.

use std::io;
use std::thread::JoinHandle as StdJoinHandle;
use std::time::Duration;

/// A joinable task. Dropping it without calling [`join`] detaches it,
/// matching `std::thread::JoinHandle`'s own behavior.
pub struct JoinHandle<T>(StdJoinHandle<T>);

/// Spawns `f` on a fresh OS thread. Returns `Err` only if the host could
/// not allocate the thread (mirrors the teacher's own `io::Result` return
/// for OS-resource-backed setup, e.g. `IpcMutex::open`/`ShmHandle::acquire`).
pub fn spawn<F, T>(f: F) -> io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    std::thread::Builder::new()
        .spawn(f)
        .map(JoinHandle)
}

/// Blocks until the task finishes, returning its result. Panics if the
/// task itself panicked, same as `std::thread::JoinHandle::join().unwrap()`.
pub fn join<T>(handle: JoinHandle<T>) -> T {
    handle.0.join().expect("spawned task panicked")
}

/// Sleeps the calling thread for `ms` milliseconds.
pub fn sleep_ms(ms: u64) {
    std::thread::sleep(Duration::from_millis(ms));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn spawn_and_join_returns_the_closures_value() {
        let handle = spawn(|| 1 + 1).unwrap();
        assert_eq!(join(handle), 2);
    }

    #[test]
    fn spawned_task_actually_runs_concurrently() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        let handle = spawn(move || {
            sleep_ms(10);
            ran2.store(true, Ordering::SeqCst);
        })
        .unwrap();
        assert!(!ran.load(Ordering::SeqCst));
        join(handle);
        assert!(ran.load(Ordering::SeqCst));
    }
}
