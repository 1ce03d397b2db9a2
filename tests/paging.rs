mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use common::*;
use polydex::{Backend, InsertRequest, KvBackend, MemoryBackend, MemoryKvStore, Poly, QuerySpec};
use proptest::prelude::*;

fn fresh(kind: usize) -> Arc<dyn Backend> {
    init_tracing();
    match kind {
        0 => Arc::new(MemoryBackend::default()),
        _ => Arc::new(KvBackend::<MemoryKvStore>::default()),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn pages_cover_tag_exactly_once(
        kind in 0usize..2,
        total in 0usize..60,
        page_size in 1usize..15,
    ) {
        let backend = fresh(kind);
        backend.create("ds").unwrap();
        if total > 0 {
            backend.insert("ds", blog_requests(total)).unwrap();
        }

        let mut seen = Vec::new();
        let mut page = 0;
        loop {
            let spec = QuerySpec::pages().item_per_page(page_size).page(page);
            let result = backend.query("ds", &spec).unwrap();
            prop_assert!(result.len() <= page_size);
            if result.is_empty() {
                break;
            }
            seen.extend(ids(&result));
            page += 1;
        }

        let expected: Vec<String> = (1..=total).rev().map(|i| format!("post{}", i)).collect();
        prop_assert_eq!(seen, expected);
        prop_assert_eq!(backend.count("ds", &QuerySpec::pages()).unwrap(), total as u64);
    }

    #[test]
    fn random_draws_distinct_members(
        kind in 0usize..2,
        tagged in 0usize..30,
        untagged in 0usize..10,
        asked in 0usize..40,
    ) {
        let backend = fresh(kind);
        backend.create("ds").unwrap();
        let mut requests = Vec::new();
        for i in 0..tagged {
            requests.push(InsertRequest::new(Poly::new(format!("t{}", i))).tag("pick"));
        }
        for i in 0..untagged {
            requests.push(InsertRequest::new(Poly::new(format!("u{}", i))));
        }
        if !requests.is_empty() {
            backend.insert("ds", requests).unwrap();
        }

        let result = backend.query("ds", &QuerySpec::random(asked).tag("pick")).unwrap();
        let drawn = ids(&result);
        prop_assert_eq!(drawn.len(), asked.min(tagged));
        let distinct: BTreeSet<&String> = drawn.iter().collect();
        prop_assert_eq!(distinct.len(), drawn.len());
        prop_assert!(drawn.iter().all(|id| id.starts_with('t')));
    }
}
