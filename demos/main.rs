//! A small, manual demonstration of the unbounded MPMC Queue: a handful of
//! producer threads enqueue numbers while a handful of consumer threads
//! drain them, after which the totals are cross-checked.

use std::{
    sync::{atomic::{AtomicBool, Ordering}, Arc},
    thread,
};

use faaqueue::queues::{mpmc::unbounded::Queue, DequeueError};

const PRODUCERS: usize = 4;
const CONSUMERS: usize = 4;
const PER_PRODUCER: usize = 100_000;

fn main() {
    let queue = Arc::new(Queue::create(PRODUCERS + CONSUMERS).expect("non-zero thread count"));
    let producers_done = Arc::new(AtomicBool::new(false));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    queue.enqueue(p * PER_PRODUCER + i, p).expect("tid in range");
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|c| {
            let queue = queue.clone();
            let producers_done = producers_done.clone();
            thread::spawn(move || {
                let mut count = 0usize;
                let mut sum = 0u128;
                loop {
                    match queue.dequeue(PRODUCERS + c) {
                        Ok(item) => {
                            count += 1;
                            sum += item as u128;
                        }
                        Err(DequeueError::Empty) => {
                            if producers_done.load(Ordering::Acquire) {
                                // One more check after observing the done
                                // flag, to close the race against a producer
                                // that published its last item just before
                                // setting the flag.
                                if matches!(queue.dequeue(PRODUCERS + c), Err(DequeueError::Empty))
                                {
                                    break;
                                }
                            } else {
                                thread::yield_now();
                            }
                        }
                        Err(other) => panic!("unexpected dequeue error: {:?}", other),
                    }
                }
                (count, sum)
            })
        })
        .collect();

    for p in producers {
        p.join().expect("producer thread panicked");
    }
    producers_done.store(true, Ordering::Release);

    let mut total_count = 0usize;
    let mut total_sum = 0u128;
    for c in consumers {
        let (count, sum) = c.join().expect("consumer thread panicked");
        total_count += count;
        total_sum += sum;
    }

    let expected_count = PRODUCERS * PER_PRODUCER;
    let expected_sum: u128 = (0..expected_count).map(|v| v as u128).sum();

    println!("dequeued {total_count} items (expected {expected_count})");
    assert_eq!(expected_count, total_count);
    assert_eq!(expected_sum, total_sum);

    let queue = Arc::try_unwrap(queue).unwrap_or_else(|_| panic!("queue still shared"));
    queue.destroy();

    println!("ok");
}
