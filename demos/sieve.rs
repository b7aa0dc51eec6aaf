// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 csp-chan contributors
//
// Sieve of Eratosthenes as a pipeline of rendezvous channels: a generator
// feeds 2, 3, 4, ... into the first stage; each stage reads its first
// value as a newly discovered prime, then forwards every later value not
// divisible by it into a freshly spawned next stage.

use csp_chan::thread;
use csp_chan::typed::TypedChannel;
use std::sync::Arc;

fn generate(out: Arc<TypedChannel<u64, 8>>) {
    let mut n = 2u64;
    loop {
        out.send_value(n);
        if out.is_closed() {
            return;
        }
        n += 1;
    }
}

fn filter(prime: u64, input: Arc<TypedChannel<u64, 8>>, output: Arc<TypedChannel<u64, 8>>) {
    loop {
        let Some(n) = input.recv_value() else {
            output.close();
            return;
        };
        if n % prime != 0 {
            output.send_value(n);
            if output.is_closed() {
                input.close();
                return;
            }
        }
    }
}

fn main() {
    env_logger::init();

    const COUNT: usize = 20;
    let mut stage = Arc::new(TypedChannel::<u64, 8>::new(0));
    let gen_ch = stage.clone();
    let mut handles = vec![thread::spawn(move || generate(gen_ch)).expect("spawn generator")];

    for _ in 0..COUNT {
        let prime = stage.recv_value().expect("generator never closes early");
        println!("{prime}");

        let next = Arc::new(TypedChannel::<u64, 8>::new(0));
        let input = stage.clone();
        let output = next.clone();
        handles.push(thread::spawn(move || filter(prime, input, output)).expect("spawn filter"));
        stage = next;
    }

    stage.close();
    for h in handles {
        thread::join(h);
    }
}
