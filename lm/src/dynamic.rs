//! Dynamically updatable n-gram language model.
//!
//! Learns from token streams, counts n-grams directly, removes contexts,
//! prunes into smaller models and round-trips through the ARPA-like text
//! format. Binary snapshots serialize the full contents for fast
//! last-known-good recovery.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::arpa::{self, ArpaModel, LmError, Unigram};
use crate::dictionary::{Dictionary, WordId, CONTROL_WORDS, NONE};
use crate::model::{
    predict_with_backend, LanguageModel, PredictBackend, PredictOptions, PredictResult,
};
use crate::trie::{CountType, NGramTrie};

/// Smoothing scheme used for prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Smoothing {
    /// Witten–Bell, interpolated over all orders.
    WittenBellI,
    /// Absolute discounting, interpolated over all orders.
    AbsDiscI,
}

impl Default for Smoothing {
    fn default() -> Self {
        Smoothing::AbsDiscI
    }
}

/// Fallback discount when the count-of-count statistics degenerate.
const DEFAULT_DISCOUNT: f64 = 0.1;

/// Error kind of the most recent failed load, for recovery flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmErrorKind {
    File,
    Memory,
    NumTokens,
    OrderUnexpected,
    OrderUnsupported,
    Count,
    UnexpectedEof,
    Encode,
    Decode,
    NotImpl,
}

impl LmError {
    pub fn kind(&self) -> LmErrorKind {
        match self {
            LmError::File { .. } => LmErrorKind::File,
            LmError::Memory => LmErrorKind::Memory,
            LmError::NumTokens(_) => LmErrorKind::NumTokens,
            LmError::OrderUnexpected(_) => LmErrorKind::OrderUnexpected,
            LmError::OrderUnsupported(_) => LmErrorKind::OrderUnsupported,
            LmError::Count(_) => LmErrorKind::Count,
            LmError::UnexpectedEof(_) => LmErrorKind::UnexpectedEof,
            LmError::Encode(_) => LmErrorKind::Encode,
            LmError::Decode(_) => LmErrorKind::Decode,
            LmError::NotImpl => LmErrorKind::NotImpl,
        }
    }
}

/// Serialized form of the model contents.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    order: usize,
    smoothing: Smoothing,
    ngrams: Vec<(Vec<String>, CountType)>,
}

/// Dynamically updatable language model of a fixed maximum order.
#[derive(Debug)]
pub struct DynamicModel {
    dictionary: Dictionary,
    ngrams: NGramTrie,
    order: usize,
    smoothing: Smoothing,

    /// n-grams with exactly one occurrence, per level.
    n1s: Vec<usize>,
    /// n-grams with exactly two occurrences, per level.
    n2s: Vec<usize>,
    /// Discount overrides; computed from n1/n2 when absent.
    discounts: Option<Vec<f64>>,

    modified: bool,
    load_error: Option<LmErrorKind>,
    load_error_msg: String,
}

impl DynamicModel {
    pub fn new(order: usize) -> Self {
        let order = order.max(1);
        let mut model = Self {
            dictionary: Dictionary::new(),
            ngrams: NGramTrie::new(order),
            order,
            smoothing: Smoothing::default(),
            n1s: vec![0; order],
            n2s: vec![0; order],
            discounts: None,
            modified: false,
            load_error: None,
            load_error_msg: String::new(),
        };
        model.assure_valid_control_words();
        model
    }

    /// An empty model with the same order and smoothing.
    pub fn clone_empty(&self) -> DynamicModel {
        let mut model = DynamicModel::new(self.order);
        model.smoothing = self.smoothing;
        model
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Clear and re-dimension; control words survive.
    pub fn set_order(&mut self, order: usize) {
        let order = order.max(1);
        self.order = order;
        self.ngrams.set_order(order);
        self.n1s = vec![0; order];
        self.n2s = vec![0; order];
        self.dictionary.clear();
        self.assure_valid_control_words();
    }

    pub fn clear(&mut self) {
        self.set_order(self.order);
    }

    pub fn smoothing(&self) -> Smoothing {
        self.smoothing
    }

    pub fn set_smoothing(&mut self, smoothing: Smoothing) {
        self.smoothing = smoothing;
    }

    /// Override the per-level absolute discounts; `None` returns to the
    /// count-of-count estimate.
    pub fn set_discounts(&mut self, discounts: Option<Vec<f64>>) {
        self.discounts = discounts;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    /// Kind of the most recent failed load, `None` after success.
    pub fn load_error(&self) -> Option<LmErrorKind> {
        self.load_error
    }

    pub fn load_error_msg(&self) -> &str {
        &self.load_error_msg
    }

    /// Extract every n-gram of length 1..order from the token stream and
    /// count it.
    pub fn learn_tokens<S: AsRef<str>>(&mut self, tokens: &[S], allow_new_words: bool) {
        for i in 0..tokens.len() {
            let max_n = self.order.min(tokens.len() - i);
            for n in 1..=max_n {
                let ngram: Vec<&str> = tokens[i..i + n].iter().map(|t| t.as_ref()).collect();
                self.count_ngram(&ngram, 1, allow_new_words);
            }
        }
        self.modified = true;
    }

    /// Count one n-gram; new words are admitted subject to
    /// `allow_new_words` (unknown words map to `<unk>` otherwise).
    pub fn count_ngram<S: AsRef<str>>(
        &mut self,
        ngram: &[S],
        increment: i64,
        allow_new_words: bool,
    ) -> CountType {
        let wids: Vec<WordId> = ngram
            .iter()
            .map(|w| self.dictionary.query_add_word(w.as_ref(), allow_new_words))
            .collect();
        self.count_ngram_ids(&wids, increment)
    }

    /// Count an n-gram given directly as word ids.
    pub fn count_ngram_ids(&mut self, wids: &[WordId], increment: i64) -> CountType {
        if wids.is_empty() || wids.len() > self.order {
            return 0;
        }
        let (old, new) = self.ngrams.count_ngram(wids, increment);

        // count-of-count statistics feed the absolute discounts
        let level = wids.len() - 1;
        if old == 1 {
            self.n1s[level] -= 1;
        }
        if old == 2 {
            self.n2s[level] -= 1;
        }
        if new == 1 {
            self.n1s[level] += 1;
        }
        if new == 2 {
            self.n2s[level] += 1;
        }
        new
    }

    pub fn get_ngram_count<S: AsRef<str>>(&self, ngram: &[S]) -> CountType {
        let wids: Vec<WordId> = ngram
            .iter()
            .map(|w| self.dictionary.word_to_id(w.as_ref()))
            .collect();
        if wids.iter().any(|&w| w == NONE) {
            return 0;
        }
        self.ngrams.get_count(&wids)
    }

    /// Number of unique n-grams with count > 0 at `level` (0-based).
    pub fn num_ngrams(&self, level: usize) -> usize {
        self.ngrams.num_ngrams(level)
    }

    /// Unique n-gram types and total occurrences per level.
    pub fn get_counts(&self) -> (Vec<usize>, Vec<u64>) {
        let mut counts = vec![0usize; self.order];
        let mut totals = vec![0u64; self.order];
        self.ngrams.for_each_ngram(|ngram, count| {
            counts[ngram.len() - 1] += 1;
            totals[ngram.len() - 1] += count as u64;
        });
        (counts, totals)
    }

    /// Full model contents; meant for tests and tools, use
    /// [`Self::for_each_ngram`] elsewhere.
    pub fn get_contents(&self) -> Vec<(Vec<String>, CountType)> {
        let mut contents = Vec::new();
        self.for_each_ngram(|words, count| contents.push((words.to_vec(), count)));
        contents
    }

    /// Visit every stored n-gram as words plus its count.
    pub fn for_each_ngram<F: FnMut(&[String], CountType)>(&self, mut f: F) {
        let mut words: Vec<String> = Vec::with_capacity(self.order);
        self.ngrams.for_each_ngram(|wids, count| {
            words.clear();
            words.extend(wids.iter().map(|&wid| {
                self.dictionary
                    .id_to_word(wid)
                    .unwrap_or_default()
                    .to_string()
            }));
            f(&words, count);
        });
    }

    /// Remove the word `context[-1]` where it appears after the history
    /// `context[..-1]`. An empty history removes every n-gram containing
    /// the word.
    pub fn remove_context<S: AsRef<str>>(&mut self, context: &[S]) {
        let context: Vec<&str> = context.iter().map(|s| s.as_ref()).collect();
        let changes = self.get_remove_context_changes(&context);
        if !changes.is_empty() {
            // apply in a second pass, the traversal must not see the
            // changes it produced
            for (ngram, increment) in &changes {
                self.count_ngram(ngram, *increment, true);
            }
            self.modified = true;
        }
    }

    /// Simulate the removal of `context`: affected n-grams and their
    /// (negative) count changes.
    fn get_remove_context_changes(&self, context: &[&str]) -> BTreeMap<Vec<String>, i64> {
        let mut changes = BTreeMap::new();
        self.for_each_ngram(|ngram, count| {
            // find the intersection with the context
            for i in 0..ngram.len() {
                let k = context.len().min(i + 1);
                let mut j = 0;
                while j < k && ngram[i - j] == context[context.len() - j - 1] {
                    j += 1;
                }
                if j >= k && j == context.len() {
                    changes.insert(ngram.to_vec(), -(count as i64));
                    break;
                }
            }
        });
        changes
    }

    /// Return a copy with all n-grams dropped whose count falls at or
    /// below the per-level threshold.
    ///
    /// Trailing `-1` entries drop whole orders (the result keeps at least
    /// order 2); elsewhere `-1` keeps every entry of its level. The
    /// threshold for level l is `prune_counts[min(len, l) - 1]`.
    pub fn prune(&self, prune_counts: &[i64]) -> DynamicModel {
        let mut new_order = self.order;
        for &prune_count in prune_counts.iter().rev() {
            if prune_count != -1 {
                break;
            }
            new_order -= 1;
        }
        let new_order = new_order.max(2);

        let mut model = self.clone_empty();
        model.set_order(new_order);

        self.for_each_ngram(|ngram, count| {
            let level = ngram.len();
            if level > new_order || prune_counts.is_empty() {
                if level <= new_order {
                    model.count_ngram(ngram, count as i64, true);
                }
                return;
            }
            let k = prune_counts.len().min(level) - 1;
            let prune_count = prune_counts[k];

            if prune_count == -1 || count as i64 > prune_count {
                model.count_ngram(ngram, count as i64, true);
            }
        });

        model
    }

    /// Copy the contents of `model` into self; the order of self stays
    /// unchanged, n-grams beyond it are skipped.
    pub fn copy_contents(&mut self, model: &DynamicModel) {
        model.for_each_ngram(|ngram, count| {
            if ngram.len() <= self.order {
                self.count_ngram(ngram, count as i64, true);
            }
        });
    }

    /// Make sure the control words exist as unigrams with count >= 1 at
    /// their fixed ids. A count of 0 would mean removed and would also
    /// throw off the Witten–Bell normalization.
    pub fn assure_valid_control_words(&mut self) {
        for (i, word) in CONTROL_WORDS.iter().enumerate() {
            if self.get_ngram_count(&[word]) == 0 {
                self.count_ngram(&[word], 1, true);
            }
            debug_assert_eq!(self.dictionary.word_to_id(word), i as WordId);
        }
    }

    /// Load from an ARPA-like file, recording the error for recovery.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), LmError> {
        self.load_error = None;
        self.load_error_msg.clear();
        self.modified = false;
        match arpa::load_arpa(path.as_ref(), self) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.load_error = Some(e.kind());
                self.load_error_msg = e.to_string();
                debug!(error = %e, "model load failed");
                Err(e)
            }
        }
    }

    /// Save to an ARPA-like file.
    ///
    /// The modified flag is left alone; callers saving to a temporary
    /// file reset it only after the rename succeeded.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LmError> {
        arpa::save_arpa(path.as_ref(), self)
    }

    /// Write a binary snapshot of the model contents.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let snapshot = Snapshot {
            order: self.order,
            smoothing: self.smoothing,
            ngrams: self.get_contents(),
        };
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, &snapshot)?;
        writer.flush()?;
        Ok(())
    }

    /// Restore a model from a binary snapshot.
    pub fn load_snapshot(path: impl AsRef<Path>) -> anyhow::Result<DynamicModel> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let snapshot: Snapshot = bincode::deserialize_from(reader)?;

        let mut model = DynamicModel::new(snapshot.order);
        model.smoothing = snapshot.smoothing;
        for (ngram, count) in &snapshot.ngrams {
            model.count_ngram(ngram, *count as i64, true);
        }
        Ok(model)
    }

    /// Per-level absolute discounts, `n1 / (n1 + 2·n2)` unless overridden.
    fn current_discounts(&self) -> Vec<f64> {
        if let Some(ds) = &self.discounts {
            let mut ds = ds.clone();
            ds.resize(self.order, DEFAULT_DISCOUNT);
            return ds;
        }
        (0..self.order)
            .map(|level| {
                let n1 = self.n1s[level] as f64;
                let n2 = self.n2s[level] as f64;
                let denom = n1 + 2.0 * n2;
                if denom > 0.0 {
                    n1 / denom
                } else {
                    DEFAULT_DISCOUNT
                }
            })
            .collect()
    }
}

impl PredictBackend for DynamicModel {
    fn backend_dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    fn words_with_predictions(&self, history: &[WordId], wids: &mut Vec<WordId>) {
        // bigram history: the most recent word only
        let h = &history[history.len() - 1..];
        self.ngrams.child_word_ids(h, wids);
    }

    fn filter_candidates(&self, wids: Vec<WordId>) -> Vec<WordId> {
        // filter out removed unigrams; unigram children are dense, the
        // child index equals the word id on valid models
        let root = self.ngrams.root();
        wids.into_iter()
            .filter(|&wid| {
                root.child_at(wid as usize)
                    .map(|n| n.count() > 0)
                    .unwrap_or(false)
            })
            .collect()
    }

    fn probs(&self, history: &[WordId], words: &[WordId]) -> Vec<f64> {
        let num_word_types = self.ngrams.num_ngrams(0);
        match self.smoothing {
            Smoothing::WittenBellI => {
                self.ngrams
                    .probs_witten_bell_i(history, words, num_word_types)
            }
            Smoothing::AbsDiscI => {
                let ds = self.current_discounts();
                self.ngrams
                    .probs_abs_disc_i(history, words, num_word_types, &ds)
            }
        }
    }
}

impl LanguageModel for DynamicModel {
    fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    fn is_model_valid(&self) -> bool {
        // including removed unigrams with count == 0
        self.ngrams.num_unigram_nodes() == self.dictionary.num_word_types()
    }

    fn predict(
        &self,
        context: &[&str],
        limit: Option<usize>,
        options: PredictOptions,
    ) -> Vec<PredictResult> {
        predict_with_backend(self, self.is_model_valid(), context, limit, options)
    }
}

impl ArpaModel for DynamicModel {
    fn clear(&mut self) {
        DynamicModel::clear(self);
    }

    fn max_order(&self) -> Option<usize> {
        None // unlimited
    }

    fn set_order(&mut self, order: usize) {
        DynamicModel::set_order(self, order);
    }

    fn order(&self) -> usize {
        self.order
    }

    fn reserve_unigrams(&mut self, count: usize) {
        self.ngrams.reserve_unigrams(count);
        self.n1s = vec![0; self.order];
        self.n2s = vec![0; self.order];
    }

    fn set_unigrams(&mut self, unigrams: &[Unigram]) -> Result<(), LmError> {
        // Bulk-add the words so the dictionary stores them sorted and
        // never needs the permutation array.
        let words: Vec<&str> = unigrams.iter().map(|u| u.word.as_str()).collect();
        self.dictionary.set_words(&words);

        for unigram in unigrams {
            self.count_ngram(&[unigram.word.as_str()], unigram.count as i64, true);
        }
        Ok(())
    }

    fn count_arpa_ngram(&mut self, tokens: &[&str], count: CountType, _time: u32) {
        // unigram timestamps round-trip through the format but this model
        // does not store them
        self.count_ngram(tokens, count as i64, true);
    }

    fn num_ngrams(&self, level: usize) -> usize {
        self.ngrams.num_ngrams(level)
    }

    fn assure_valid_control_words(&mut self) {
        DynamicModel::assure_valid_control_words(self);
    }

    fn write_ngram_sections(&self, w: &mut dyn Write) -> std::io::Result<()> {
        for level in 1..=self.order {
            writeln!(w)?;
            writeln!(w, "\\{}-grams:", level)?;

            let mut result = Ok(());
            self.for_each_ngram(|ngram, count| {
                if result.is_err() || ngram.len() != level {
                    return;
                }
                result = (|| {
                    write!(w, "{}", count)?;
                    for word in ngram {
                        write!(w, " {}", word)?;
                    }
                    writeln!(w)
                })();
            });
            result?;
        }
        Ok(())
    }
}
