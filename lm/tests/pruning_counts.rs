// Trie statistics, control-word invariants and pruning.

use softboard_lm::{DynamicModel, LanguageModel, NUM_CONTROL_WORDS};

#[test]
fn cached_level_counts_match_traversal() {
    let mut m = DynamicModel::new(3);
    m.learn_tokens(&["a", "b", "c", "a", "b"], true);
    m.learn_tokens(&["b", "c", "a"], true);
    m.remove_context(&["b", "c"]);

    let (counts, totals) = m.get_counts();
    for level in 0..3 {
        assert_eq!(m.num_ngrams(level), counts[level], "level {}", level);
    }

    // totals are sums over the surviving n-grams
    let mut seen_totals = vec![0u64; 3];
    m.for_each_ngram(|ngram, count| {
        seen_totals[ngram.len() - 1] += count as u64;
    });
    assert_eq!(totals, seen_totals);
}

#[test]
fn control_words_keep_ids_and_counts() {
    let mut m = DynamicModel::new(3);
    m.learn_tokens(&["<s>", "hello", "world", "</s>"], true);
    m.count_ngram(&["<s>"], -100, true);
    m.remove_context(&["hello"]);
    m.remove_context(&["<s>"]);

    let d = m.dictionary();
    for (i, word) in ["<unk>", "<s>", "</s>", "<num>"].iter().enumerate() {
        assert_eq!(d.word_to_id(word), i as u32);
        assert!(!word.is_empty());
        assert!(m.get_ngram_count(&[word]) >= 1, "{} must keep count >= 1", word);
    }
    assert_eq!(NUM_CONTROL_WORDS, 4);
}

#[test]
fn prune_honors_per_level_thresholds() {
    let mut m = DynamicModel::new(3);
    for _ in 0..5 {
        m.learn_tokens(&["alpha", "beta", "gamma"], true);
    }
    for _ in 0..2 {
        m.learn_tokens(&["delta", "epsilon", "zeta"], true);
    }
    m.learn_tokens(&["eta", "theta", "iota"], true);

    let p = 2i64;
    let q = 1i64;
    let pruned = m.prune(&[-1, p, q]);

    // no 2-gram with count <= p, no 3-gram with count <= q
    pruned.for_each_ngram(|ngram, count| match ngram.len() {
        2 => assert!(count as i64 > p, "2-gram {:?} count {}", ngram, count),
        3 => assert!(count as i64 > q, "3-gram {:?} count {}", ngram, count),
        _ => {}
    });

    // 1-grams untouched
    let (orig_counts, _) = m.get_counts();
    let (pruned_counts, _) = pruned.get_counts();
    assert_eq!(pruned_counts[0], orig_counts[0]);
    assert_eq!(pruned.get_ngram_count(&["eta"]), 1);

    // surviving levels kept their qualifying entries
    assert_eq!(pruned.get_ngram_count(&["alpha", "beta"]), 5);
    assert_eq!(pruned.get_ngram_count(&["alpha", "beta", "gamma"]), 5);
    assert_eq!(pruned.get_ngram_count(&["delta", "epsilon"]), 0);
    assert_eq!(pruned.get_ngram_count(&["delta", "epsilon", "zeta"]), 2);
}

#[test]
fn pruned_model_is_usable() {
    let mut m = DynamicModel::new(3);
    for _ in 0..4 {
        m.learn_tokens(&["one", "two", "three"], true);
    }
    let pruned = m.prune(&[-1, 1, 1]);

    assert!(pruned.is_model_valid());
    let results = pruned.predict(
        &["one", ""],
        Some(3),
        softboard_lm::PredictOptions::empty(),
    );
    assert!(!results.is_empty());
    assert_eq!(results[0].word, "two");
}
