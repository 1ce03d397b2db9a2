mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::*;
use polydex::{Backend, InsertRequest, KvBackend, MemoryBackend, MemoryKvStore, Poly, QuerySpec};

const WRITERS: usize = 4;
const PER_WRITER: usize = 50;

fn hammer(backend: Arc<dyn Backend>) {
    backend.create("ds").unwrap();

    let mut handles = Vec::new();
    for w in 0..WRITERS {
        let backend = backend.clone();
        handles.push(thread::spawn(move || {
            for i in 0..PER_WRITER {
                let tag = if i % 2 == 0 { "even" } else { "odd" };
                let poly = Poly::new(format!("w{}-{}", w, i)).with("writer", w as u64);
                backend.insert("ds", vec![InsertRequest::new(poly).tag(tag)]).unwrap();
                if i % 5 == 4 {
                    backend.remove("ds", &[format!("w{}-{}", w, i - 1)]).unwrap();
                }
            }
        }));
    }
    for _ in 0..2 {
        let backend = backend.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                let page = backend.query("ds", &QuerySpec::pages()).unwrap();
                assert!(page.len() <= 10);
                backend.query("ds", &QuerySpec::random(3).tag("even")).unwrap();
                backend.count("ds", &QuerySpec::pages().tag("odd")).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn concurrent_writers_keep_counts_exact() {
    init_tracing();
    let memory = Arc::new(MemoryBackend::default());
    let kv = Arc::new(KvBackend::<MemoryKvStore>::default());
    hammer(memory.clone());
    hammer(kv.clone());

    // Each writer removes its documents 3, 8, 13, ..., 48.
    let removed: Vec<usize> = (0..PER_WRITER).filter(|i| i % 5 == 4).map(|i| i - 1).collect();
    let removed_even = removed.iter().filter(|i| *i % 2 == 0).count();
    let expected_total = (WRITERS * (PER_WRITER - removed.len())) as u64;
    let expected_even = (WRITERS * (PER_WRITER / 2 - removed_even)) as u64;
    let expected_odd = expected_total - expected_even;

    let backends: [&dyn Backend; 2] = [memory.as_ref(), kv.as_ref()];
    for backend in backends {
        assert_eq!(backend.count("ds", &QuerySpec::pages()).unwrap(), expected_total, "{}", backend.name());
        assert_eq!(backend.count("ds", &QuerySpec::pages().tag("even")).unwrap(), expected_even);
        assert_eq!(backend.count("ds", &QuerySpec::pages().tag("odd")).unwrap(), expected_odd);

        let everything = QuerySpec::pages().item_per_page(1000);
        assert_eq!(backend.query("ds", &everything).unwrap().len() as u64, expected_total);
    }
    assert_eq!(memory.index_inconsistencies("ds").unwrap(), 0);
    assert!(memory.recalculate("ds").unwrap().is_clean());
}

#[test]
fn racing_creates_can_all_write_immediately() {
    const THREADS: usize = 4;
    for round in 0..200 {
        let backend = Arc::new(MemoryBackend::default());
        let barrier = Arc::new(Barrier::new(THREADS));
        let dataset = format!("ds{}", round);

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let backend = backend.clone();
                let barrier = barrier.clone();
                let dataset = dataset.clone();
                thread::spawn(move || {
                    barrier.wait();
                    backend.create(&dataset).unwrap();
                    backend
                        .insert(&dataset, vec![InsertRequest::new(Poly::new(format!("t{}", t))).tag("racer")])
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(backend.count(&dataset, &QuerySpec::pages().tag("racer")).unwrap(), THREADS as u64);
    }
}
