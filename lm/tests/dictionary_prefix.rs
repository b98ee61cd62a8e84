// Dictionary round-trip and prefix-search behavior.

use softboard_lm::{DynamicModel, LanguageModel, PredictOptions, NONE};

fn model_with_words(words: &[&str]) -> DynamicModel {
    let mut m = DynamicModel::new(3);
    for w in words {
        m.count_ngram(&[w], 1, true);
    }
    m
}

#[test]
fn roundtrip_after_bulk_and_incremental_adds() {
    let mut m = DynamicModel::new(3);

    // bulk load through learning, then incremental additions
    m.learn_tokens(&["walk", "walked", "walking", "übung", "zebra"], true);
    let added = ["apple", "Ápfel", "zurück", "walks"];
    for w in added {
        m.count_ngram(&[w], 1, true);
    }

    let d = m.dictionary();
    for w in [
        "walk", "walked", "walking", "übung", "zebra", "apple", "Ápfel", "zurück", "walks",
    ] {
        let wid = d.word_to_id(w);
        assert_ne!(wid, NONE, "{} must be present", w);
        assert_eq!(d.id_to_word(wid), Some(w));
    }

    assert_eq!(d.word_to_id("walkabout"), NONE);
    assert_eq!(d.word_to_id(""), NONE);
}

#[test]
fn prefix_search_smart_case_scenario() {
    let m = model_with_words(&["Apple", "apricot", "banana"]);

    let predict = |prefix: &str, options| {
        let results = m.predict(&[prefix], None, options);
        let mut words: Vec<String> = results.into_iter().map(|r| r.word).collect();
        words.sort();
        words
    };

    assert_eq!(
        predict("A", PredictOptions::CASE_INSENSITIVE_SMART),
        vec!["Apple"]
    );
    assert_eq!(
        predict("a", PredictOptions::CASE_INSENSITIVE_SMART),
        vec!["Apple", "apricot"]
    );
    assert_eq!(predict("A", PredictOptions::empty()), vec!["Apple"]);
}

#[test]
fn prefix_monotonicity() {
    let m = model_with_words(&[
        "pre", "prefix", "prefixes", "present", "pressure", "prime", "other",
    ]);

    for options in [
        PredictOptions::empty(),
        PredictOptions::CASE_INSENSITIVE,
        PredictOptions::CASE_INSENSITIVE_SMART,
    ] {
        let longer: Vec<String> = m
            .predict(&["pre"], None, options)
            .into_iter()
            .map(|r| r.word)
            .collect();
        let shorter: Vec<String> = m
            .predict(&["pr"], None, options)
            .into_iter()
            .map(|r| r.word)
            .collect();

        for w in &longer {
            assert!(
                shorter.contains(w),
                "prefix_search(p2) must be a subset of prefix_search(p1), missing {}",
                w
            );
        }
    }
}

#[test]
fn capitalization_filters_look_at_first_char_only() {
    let m = model_with_words(&["Berlin", "berlin", "bErlin"]);

    let words = |options| -> Vec<String> {
        m.predict(&["b"], None, PredictOptions::CASE_INSENSITIVE | options)
            .into_iter()
            .map(|r| r.word)
            .collect()
    };

    let caps = words(PredictOptions::IGNORE_NON_CAPITALIZED);
    assert_eq!(caps, vec!["Berlin".to_string()]);

    let mut non_caps = words(PredictOptions::IGNORE_CAPITALIZED);
    non_caps.sort();
    assert_eq!(non_caps, vec!["bErlin".to_string(), "berlin".to_string()]);
}
