// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 csp-chan contributors
//
// Fibonacci generator: one task pushes the sequence onto a rendezvous
// channel forever, the main task pulls the first ten and then closes it.

use csp_chan::thread;
use csp_chan::typed::TypedChannel;
use std::sync::Arc;

fn main() {
    env_logger::init();

    let ch = Arc::new(TypedChannel::<u64, 8>::new(0));
    let producer_ch = ch.clone();
    let producer = thread::spawn(move || {
        let (mut a, mut b) = (0u64, 1u64);
        loop {
            producer_ch.send_value(a);
            if producer_ch.is_closed() {
                return;
            }
            let next = a + b;
            a = b;
            b = next;
        }
    })
    .expect("spawn fibonacci producer");

    for _ in 0..10 {
        match ch.recv_value() {
            Some(v) => println!("{v}"),
            None => break,
        }
    }
    ch.close();
    thread::join(producer);
}
