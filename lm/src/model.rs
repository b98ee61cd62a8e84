//! Language-model interface and the shared prediction pipeline.
//!
//! Every model answers `predict(context, limit, options)`; the last context
//! token is the completion prefix (possibly empty), everything before it is
//! the history. Candidate selection, probability calculation and the stable
//! sort live here so that dynamic, unigram and merged models all behave the
//! same way.

use bitflags::bitflags;
use tracing::warn;

use crate::dictionary::{Dictionary, WordId, NONE, NUM_CONTROL_WORDS, UNKNOWN_WORD_ID};

bitflags! {
    /// Options for prediction and prefix search.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PredictOptions: u32 {
        /// Candidate letters are lowercased when the prefix letter is
        /// lowercase.
        const CASE_INSENSITIVE_SMART = 1 << 0;
        /// Both sides are lowercased unconditionally.
        const CASE_INSENSITIVE = 1 << 1;
        /// Candidate letters lose their accent when the prefix letter is
        /// unaccented.
        const ACCENT_INSENSITIVE_SMART = 1 << 2;
        /// Accents are stripped on both sides.
        const ACCENT_INSENSITIVE = 1 << 3;
        /// Skip words whose first letter is uppercase.
        const IGNORE_CAPITALIZED = 1 << 4;
        /// Skip words whose first letter is not uppercase.
        const IGNORE_NON_CAPITALIZED = 1 << 5;
        /// Let control words (`<unk>`, `<s>`, ...) appear in results.
        const INCLUDE_CONTROL_WORDS = 1 << 6;
        /// Skip sorting of the results, e.g. for merged-model components.
        const NO_SORT = 1 << 7;
        /// Normalize the final probabilities.
        const NORMALIZE = 1 << 8;

        /// Options that filter the candidate set.
        const FILTER_OPTIONS = Self::CASE_INSENSITIVE_SMART.bits()
            | Self::CASE_INSENSITIVE.bits()
            | Self::ACCENT_INSENSITIVE_SMART.bits()
            | Self::ACCENT_INSENSITIVE.bits()
            | Self::IGNORE_CAPITALIZED.bits()
            | Self::IGNORE_NON_CAPITALIZED.bits();
    }
}

/// One prediction: a word and its probability.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictResult {
    pub word: String,
    pub p: f64,
}

/// Tolerance for the probability-sum check in [`LanguageModel::get_probability`].
const PROBABILITY_SUM_TOLERANCE: f64 = 1e-3;

/// Common interface of all language models.
pub trait LanguageModel {
    fn dictionary(&self) -> &Dictionary;

    /// Plausibility check before prediction; an invalid model (e.g. one
    /// filled through raw counting with missing unigrams) predicts nothing.
    fn is_model_valid(&self) -> bool;

    /// Predict completions/continuations of `context`.
    fn predict(
        &self,
        context: &[&str],
        limit: Option<usize>,
        options: PredictOptions,
    ) -> Vec<PredictResult>;

    /// Map a word to its id; unknown words map to the always-present
    /// `<unk>` entry.
    fn word_to_id(&self, word: &str) -> WordId {
        let wid = self.dictionary().word_to_id(word);
        if wid == NONE {
            UNKNOWN_WORD_ID
        } else {
            wid
        }
    }

    /// Probability of a single n-gram.
    ///
    /// Runs an unlimited normalized prediction so overlay and log-linear
    /// merges report sensible values; not a fast path.
    fn get_probability(&self, ngram: &[&str]) -> f64 {
        let Some((&word, history)) = ngram.split_last() else {
            return 0.0;
        };

        let mut context: Vec<&str> = history.to_vec();
        context.push(""); // empty prefix: predict everything

        let results = self.predict(&context, None, PredictOptions::NORMALIZE);

        let psum: f64 = results.iter().map(|r| r.p).sum();
        if (1.0 - psum).abs() > PROBABILITY_SUM_TOLERANCE {
            warn!(psum, "prediction probabilities do not sum to 1");
        }

        if let Some(r) = results.iter().find(|r| r.word == word) {
            return r.p;
        }
        results
            .iter()
            .find(|r| r.word == "<unk>")
            .map(|r| r.p)
            .unwrap_or(0.0)
    }
}

/// Split a context into history and completion prefix.
///
/// The last token is the prefix, everything before it the history.
pub(crate) fn split_context<'a>(context: &'a [&'a str]) -> (&'a [&'a str], &'a str) {
    let (prefix, history) = context.split_last().expect("context checked non-empty");
    (history, *prefix)
}

/// Sort an index array descending by values from `cmp`.
///
/// Stable, and adaptive on the already-sorted inputs that dominate when
/// the context changes only a little between calls; equal probabilities
/// keep their input order so visible result order stays put.
pub(crate) fn stable_argsort_desc(v: &mut [usize], cmp: &[f64]) {
    v.sort_by(|&a, &b| cmp[b].partial_cmp(&cmp[a]).unwrap_or(std::cmp::Ordering::Equal));
}

/// Hooks the shared pipeline needs from a concrete model.
pub(crate) trait PredictBackend {
    fn backend_dictionary(&self) -> &Dictionary;

    /// Word ids with observed predecessors for the given history,
    /// bigram level.
    fn words_with_predictions(&self, history: &[WordId], wids: &mut Vec<WordId>);

    /// Filter out words with removed unigrams.
    fn filter_candidates(&self, wids: Vec<WordId>) -> Vec<WordId>;

    /// Probability vector for sorted candidate `words` after `history`.
    fn probs(&self, history: &[WordId], words: &[WordId]) -> Vec<f64>;
}

/// Candidate word ids for the given history and prefix.
pub(crate) fn get_candidates<B: PredictBackend>(
    backend: &B,
    history: &[WordId],
    prefix: &str,
    options: PredictOptions,
) -> Vec<WordId> {
    let dictionary = backend.backend_dictionary();
    let has_prefix = !prefix.is_empty();
    let only_predictions = !has_prefix
        && !history.is_empty()
        && !options.contains(PredictOptions::INCLUDE_CONTROL_WORDS);

    let mut candidates;
    if has_prefix || only_predictions || options.intersects(PredictOptions::FILTER_OPTIONS) {
        if only_predictions {
            // Only words that have predecessors; reduces clutter predicted
            // between words and implicitly drops removed unigrams.
            let mut wids_in = Vec::new();
            backend.words_with_predictions(history, &mut wids_in);
            candidates = Vec::new();
            dictionary.prefix_search("", Some(&wids_in), &mut candidates, options);
        } else {
            let mut wids = Vec::new();
            dictionary.prefix_search(prefix, None, &mut wids, options);
            candidates = backend.filter_candidates(wids);
        }

        // the smoothing walk binary-searches into the candidates
        candidates.sort_unstable();
    } else {
        let min_wid = if options.contains(PredictOptions::INCLUDE_CONTROL_WORDS) {
            0
        } else {
            NUM_CONTROL_WORDS as WordId
        };
        let wids: Vec<WordId> = (min_wid..dictionary.num_word_types() as WordId).collect();
        candidates = backend.filter_candidates(wids);
    }
    candidates
}

/// The shared predict pipeline: candidates, probabilities, stable sort,
/// limit.
pub(crate) fn predict_with_backend<B: PredictBackend>(
    backend: &B,
    valid: bool,
    context: &[&str],
    limit: Option<usize>,
    options: PredictOptions,
) -> Vec<PredictResult> {
    if context.is_empty() || !valid {
        return Vec::new();
    }

    let dictionary = backend.backend_dictionary();
    let (history_words, prefix) = split_context(context);
    let history: Vec<WordId> = history_words
        .iter()
        .map(|w| {
            let wid = dictionary.word_to_id(w);
            if wid == NONE {
                UNKNOWN_WORD_ID
            } else {
                wid
            }
        })
        .collect();

    let wids = get_candidates(backend, &history, prefix, options);
    let probabilities = backend.probs(&history, &wids);

    let result_size = match limit {
        Some(limit) if limit < wids.len() => limit,
        _ => wids.len(),
    };
    let mut results = Vec::with_capacity(result_size);

    if !options.contains(PredictOptions::NO_SORT) {
        let mut argsort: Vec<usize> = (0..wids.len()).collect();
        stable_argsort_desc(&mut argsort, &probabilities);

        for &index in argsort.iter().take(result_size) {
            if let Some(word) = dictionary.id_to_word(wids[index]) {
                results.push(PredictResult {
                    word: word.to_string(),
                    p: probabilities[index],
                });
            }
        }
    } else {
        for i in 0..result_size {
            if let Some(word) = dictionary.id_to_word(wids[i]) {
                results.push(PredictResult {
                    word: word.to_string(),
                    p: probabilities[i],
                });
            }
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argsort_descends_and_preserves_ties() {
        let probs = vec![0.25, 0.25, 0.5, 0.25];
        let mut idx: Vec<usize> = (0..probs.len()).collect();
        stable_argsort_desc(&mut idx, &probs);
        assert_eq!(idx[0], 2);
        // equal probabilities keep their input order
        assert_eq!(&idx[1..], &[0, 1, 3]);
    }

    #[test]
    fn argsort_on_sorted_input_is_identity() {
        let probs = vec![0.5, 0.4, 0.3, 0.2, 0.1];
        let mut idx: Vec<usize> = (0..probs.len()).collect();
        stable_argsort_desc(&mut idx, &probs);
        assert_eq!(idx, vec![0, 1, 2, 3, 4]);
    }
}
