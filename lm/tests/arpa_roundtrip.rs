// ARPA-like save/load round-trips and loader error handling.

use std::collections::HashMap;
use std::path::PathBuf;

use softboard_lm::{read_order, DynamicModel, LanguageModel, LmErrorKind, PredictOptions};

fn temp_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("softboard_lm_arpa_tests");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

fn seed_model() -> DynamicModel {
    let mut m = DynamicModel::new(3);
    m.learn_tokens(&["the", "quick", "brown", "fox"], true);
    m.learn_tokens(&["the", "quick", "red", "fox"], true);
    m.learn_tokens(&["the", "lazy", "dog"], true);
    m
}

fn probabilities_by_word(m: &DynamicModel, context: &[&str]) -> HashMap<String, f64> {
    m.predict(context, None, PredictOptions::empty())
        .into_iter()
        .map(|r| (r.word, r.p))
        .collect()
}

#[test]
fn save_load_preserves_counts_and_probabilities() {
    let path = temp_path("roundtrip.lm");
    let m = seed_model();
    m.save(&path).unwrap();

    let mut loaded = DynamicModel::new(3);
    loaded.load(&path).unwrap();

    assert_eq!(loaded.get_counts(), m.get_counts());
    assert_eq!(loaded.get_ngram_count(&["the"]), 3);
    assert_eq!(loaded.get_ngram_count(&["the", "quick", "brown"]), 1);

    // same n-gram set regardless of dictionary ordering
    let mut contents_a = m.get_contents();
    let mut contents_b = loaded.get_contents();
    contents_a.sort();
    contents_b.sort();
    assert_eq!(contents_a, contents_b);

    // identical probabilities over a fixed context set
    for context in [vec!["the", ""], vec!["the", "quick", ""], vec![""]] {
        let a = probabilities_by_word(&m, &context);
        let b = probabilities_by_word(&loaded, &context);
        assert_eq!(a.len(), b.len(), "context {:?}", context);
        for (word, pa) in &a {
            let pb = b.get(word).expect("word present in both");
            assert!((pa - pb).abs() < 1e-12, "{}: {} vs {}", word, pa, pb);
        }
    }

    let _ = std::fs::remove_file(path);
}

#[test]
fn second_roundtrip_is_byte_identical() {
    // Once the dictionary is self-sorted from a load, saving again
    // reproduces the file exactly.
    let path1 = temp_path("stable1.lm");
    let path2 = temp_path("stable2.lm");
    let path3 = temp_path("stable3.lm");

    seed_model().save(&path1).unwrap();

    let mut loaded = DynamicModel::new(3);
    loaded.load(&path1).unwrap();
    loaded.save(&path2).unwrap();

    let mut loaded2 = DynamicModel::new(3);
    loaded2.load(&path2).unwrap();
    loaded2.save(&path3).unwrap();

    let b = std::fs::read(&path2).unwrap();
    let c = std::fs::read(&path3).unwrap();
    assert_eq!(b, c);

    for p in [path1, path2, path3] {
        let _ = std::fs::remove_file(p);
    }
}

#[test]
fn unigram_timestamps_are_accepted() {
    let path = temp_path("times.lm");
    std::fs::write(
        &path,
        "\n\\data\\\n\
         ngram 1=2\n\
         \n\
         \\1-grams:\n\
         3 1699999999 hello\n\
         1 1699999999 world\n\
         \n\
         \\end\\\n",
    )
    .unwrap();

    let mut m = DynamicModel::new(3);
    m.load(&path).unwrap();
    assert_eq!(m.get_ngram_count(&["hello"]), 3);
    assert_eq!(m.get_ngram_count(&["world"]), 1);

    let _ = std::fs::remove_file(path);
}

#[test]
fn zero_count_rows_are_ignored() {
    let path = temp_path("zeros.lm");
    std::fs::write(
        &path,
        "\n\\data\\\n\
         ngram 1=3\n\
         \n\
         \\1-grams:\n\
         2 alpha\n\
         0 removed\n\
         4 beta\n\
         \n\
         \\end\\\n",
    )
    .unwrap();

    let mut m = DynamicModel::new(3);
    m.load(&path).unwrap();
    assert_eq!(m.get_ngram_count(&["alpha"]), 2);
    assert_eq!(m.get_ngram_count(&["removed"]), 0);

    let _ = std::fs::remove_file(path);
}

#[test]
fn truncated_file_reports_unexpected_eof() {
    let path = temp_path("truncated.lm");
    std::fs::write(&path, "\n\\data\\\nngram 1=1\n\n\\1-grams:\n1 word\n").unwrap();

    let mut m = DynamicModel::new(3);
    let err = m.load(&path).unwrap_err();
    assert_eq!(err.kind(), LmErrorKind::UnexpectedEof);
    assert_eq!(m.load_error(), Some(LmErrorKind::UnexpectedEof));
    assert!(!m.load_error_msg().is_empty());

    // the model is cleared but keeps valid control words
    assert!(m.is_model_valid());
    assert_eq!(m.get_ngram_count(&["<s>"]), 1);

    let _ = std::fs::remove_file(path);
}

#[test]
fn count_mismatch_is_detected() {
    let path = temp_path("mismatch.lm");
    std::fs::write(
        &path,
        "\n\\data\\\n\
         ngram 1=5\n\
         \n\
         \\1-grams:\n\
         1 only\n\
         \n\
         \\end\\\n",
    )
    .unwrap();

    let mut m = DynamicModel::new(3);
    let err = m.load(&path).unwrap_err();
    assert_eq!(err.kind(), LmErrorKind::Count);

    let _ = std::fs::remove_file(path);
}

#[test]
fn missing_file_reports_file_error() {
    let mut m = DynamicModel::new(3);
    let err = m.load("/nonexistent/softboard.lm").unwrap_err();
    assert_eq!(err.kind(), LmErrorKind::File);
}

#[test]
fn read_order_probes_the_header() {
    let path = temp_path("order.lm");
    let m = seed_model();
    m.save(&path).unwrap();
    assert_eq!(read_order(&path), Some(3));
    let _ = std::fs::remove_file(path);
}
