use criterion::{black_box, Criterion, Throughput};
use faaqueue::queues::mpmc::unbounded::Queue;

pub fn single_thread_enqueue_dequeue(ctx: &mut Criterion) {
    let mut group = ctx.benchmark_group("mpmc-unbounded");

    group.throughput(Throughput::Elements(2));

    group.bench_function("enqueue-dequeue", |b| {
        let queue = Queue::create(1).unwrap();

        b.iter(|| {
            queue.enqueue(black_box(13u64), 0).unwrap();
            assert_eq!(Ok(13), queue.dequeue(0));
        });

        queue.destroy();
    });
}

pub fn contended_enqueue_dequeue(ctx: &mut Criterion) {
    use std::{sync::Arc, thread};

    let mut group = ctx.benchmark_group("mpmc-unbounded-contended");
    group.throughput(Throughput::Elements(2));

    group.bench_function("4-producer-4-consumer", |b| {
        const THREADS: usize = 4;
        let queue = Arc::new(Queue::create(THREADS * 2).unwrap());

        b.iter(|| {
            let producers: Vec<_> = (0..THREADS)
                .map(|t| {
                    let queue = queue.clone();
                    thread::spawn(move || queue.enqueue(black_box(t), t).unwrap())
                })
                .collect();
            for p in producers {
                p.join().unwrap();
            }

            let consumers: Vec<_> = (0..THREADS)
                .map(|t| {
                    let queue = queue.clone();
                    thread::spawn(move || while queue.dequeue(THREADS + t).is_err() {})
                })
                .collect();
            for c in consumers {
                c.join().unwrap();
            }
        });

        let queue = Arc::try_unwrap(queue).unwrap_or_else(|_| panic!("queue still shared"));
        queue.destroy();
    });
}

criterion::criterion_group!(benches, single_thread_enqueue_dequeue, contended_enqueue_dequeue);
criterion::criterion_main!(benches);
