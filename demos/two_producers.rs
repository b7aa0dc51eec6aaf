// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 csp-chan contributors
//
// Two producers fan in to one buffered channel; the consumer can't tell
// which producer a given value came from, only that select's randomized
// tie-break means neither producer is starved out by the other.

use csp_chan::thread;
use csp_chan::typed::TypedChannel;
use std::sync::Arc;

fn produce(id: u64, out: Arc<TypedChannel<u64, 8>>) {
    for i in 0..5u64 {
        out.send_value(id * 100 + i);
    }
}

fn main() {
    env_logger::init();

    let ch = Arc::new(TypedChannel::<u64, 8>::new(4));
    let a = ch.clone();
    let b = ch.clone();
    let p1 = thread::spawn(move || produce(1, a)).expect("spawn producer 1");
    let p2 = thread::spawn(move || produce(2, b)).expect("spawn producer 2");

    for _ in 0..10 {
        let v = ch.recv_value().expect("producers never close the channel");
        println!("{v}");
    }

    thread::join(p1);
    thread::join(p2);
}
