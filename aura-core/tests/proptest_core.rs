//! Property-based tests for core components using proptest.

use proptest::prelude::*;

use aura_core::adapter::{format_reply, parse_reply};
use aura_core::modules::ContextAccumulator;
use aura_core::modules::reflector::select_attempt;
use aura_core::retrieval::{LocalKnowledgeBase, Retriever};
use aura_core::signature::GENERATE_SEARCH_QUERY;
use aura_core::types::Passage;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

// --- Retrieval properties ---

proptest! {
    #[test]
    fn local_retrieval_returns_min_k_len(query in ".{0,40}", k in 0usize..12) {
        let kb = LocalKnowledgeBase::new();
        let passages = runtime().block_on(kb.retrieve(&query, k)).unwrap();
        prop_assert_eq!(passages.len(), k.min(kb.len()));
    }

    #[test]
    fn local_retrieval_is_stable(a in ".{0,20}", b in ".{0,20}", k in 1usize..6) {
        let kb = LocalKnowledgeBase::new();
        let rt = runtime();
        let first = rt.block_on(kb.retrieve(&a, k)).unwrap();
        let second = rt.block_on(kb.retrieve(&b, k)).unwrap();
        prop_assert_eq!(first, second);
    }
}

// --- Context accumulation properties ---

fn passage_batches() -> impl Strategy<Value = Vec<Vec<(u8, u8)>>> {
    prop::collection::vec(prop::collection::vec((0u8..4, 0u8..6), 0..5), 1..5)
}

proptest! {
    #[test]
    fn accumulator_never_shrinks_and_never_duplicates(batches in passage_batches()) {
        let mut acc = ContextAccumulator::new();
        let mut previous: Vec<Passage> = Vec::new();
        for batch in batches {
            let passages = batch
                .into_iter()
                .map(|(t, body)| Passage::new(format!("title {t}"), format!("body {body}")));
            acc.extend(passages);
            prop_assert!(acc.passages().starts_with(&previous));
            previous = acc.passages().to_vec();
        }
        let mut texts: Vec<&str> = acc.passages().iter().map(|p| p.text.as_str()).collect();
        let total = texts.len();
        texts.sort_unstable();
        texts.dedup();
        prop_assert_eq!(texts.len(), total);
    }
}

// --- Adapter properties ---

proptest! {
    #[test]
    fn reply_fields_survive_parsing(query in "[a-zA-Z0-9 ,.?]{1,60}") {
        let query = query.trim().to_string();
        prop_assume!(!query.is_empty());
        let reply = format_reply(&[("search_query", &query)]);
        let parsed = parse_reply(&GENERATE_SEARCH_QUERY, GENERATE_SEARCH_QUERY.outputs, &reply).unwrap();
        prop_assert_eq!(parsed.get("search_query"), Some(&query));
    }

    #[test]
    fn selected_attempt_is_in_range(raw in ".{0,30}", count in 1usize..8) {
        prop_assert!(select_attempt(&raw, count) < count);
    }
}
