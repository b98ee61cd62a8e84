//! Memory-efficient model for plain word frequencies.
//!
//! No trie; one flat count per word id. Shares the dictionary and the
//! ARPA machinery with [`crate::DynamicModel`] but rejects files of order
//! greater than one.

use std::io::Write;
use std::path::Path;

use crate::arpa::{self, ArpaModel, LmError, Unigram};
use crate::dictionary::{Dictionary, WordId, CONTROL_WORDS, NONE};
use crate::model::{
    predict_with_backend, LanguageModel, PredictBackend, PredictOptions, PredictResult,
};
use crate::trie::CountType;

/// Word-frequency model, maximum order 1.
#[derive(Debug, Default)]
pub struct UnigramModel {
    dictionary: Dictionary,
    counts: Vec<CountType>,
    load_error_msg: String,
}

impl UnigramModel {
    pub fn new() -> Self {
        let mut model = Self::default();
        model.assure_valid_control_words();
        model
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.counts.shrink_to_fit();
        self.dictionary.clear();
        self.assure_valid_control_words();
    }

    /// Count one word; ids are dense, missing slots are zero-filled.
    pub fn count_word(&mut self, word: &str, increment: i64, allow_new_words: bool) -> CountType {
        let wid = self.dictionary.query_add_word(word, allow_new_words);
        self.count_word_id(wid, increment)
    }

    fn count_word_id(&mut self, wid: WordId, increment: i64) -> CountType {
        let index = wid as usize;
        if self.counts.len() <= index {
            self.counts.resize(index + 1, 0);
        }
        let new = (self.counts[index] as i64 + increment).max(0) as CountType;
        self.counts[index] = new;
        new
    }

    pub fn get_count(&self, word: &str) -> CountType {
        let wid = self.dictionary.word_to_id(word);
        if wid == NONE {
            return 0;
        }
        self.counts.get(wid as usize).copied().unwrap_or(0)
    }

    fn total_count(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    pub fn assure_valid_control_words(&mut self) {
        for (i, word) in CONTROL_WORDS.iter().enumerate() {
            if self.get_count(word) == 0 {
                self.count_word(word, 1, true);
            }
            debug_assert_eq!(self.dictionary.word_to_id(word), i as WordId);
        }
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), LmError> {
        self.load_error_msg.clear();
        arpa::load_arpa(path.as_ref(), self).map_err(|e| {
            self.load_error_msg = e.to_string();
            e
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LmError> {
        arpa::save_arpa(path.as_ref(), self)
    }

    pub fn load_error_msg(&self) -> &str {
        &self.load_error_msg
    }
}

impl PredictBackend for UnigramModel {
    fn backend_dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    fn words_with_predictions(&self, _history: &[WordId], _wids: &mut Vec<WordId>) {
        // no context in a unigram model
    }

    fn filter_candidates(&self, wids: Vec<WordId>) -> Vec<WordId> {
        wids.into_iter()
            .filter(|&wid| self.counts.get(wid as usize).copied().unwrap_or(0) > 0)
            .collect()
    }

    fn probs(&self, _history: &[WordId], words: &[WordId]) -> Vec<f64> {
        let total = self.total_count() as f64;
        words
            .iter()
            .map(|&wid| {
                if total > 0.0 {
                    self.counts.get(wid as usize).copied().unwrap_or(0) as f64 / total
                } else {
                    0.0
                }
            })
            .collect()
    }
}

impl LanguageModel for UnigramModel {
    fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    fn is_model_valid(&self) -> bool {
        self.counts.len() == self.dictionary.num_word_types()
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

impl ArpaModel for UnigramModel {
    fn clear(&mut self) {
        UnigramModel::clear(self);
    }

    fn max_order(&self) -> Option<usize> {
        Some(1)
    }

    fn set_order(&mut self, _order: usize) {
        UnigramModel::clear(self);
    }

    fn order(&self) -> usize {
        1
    }

    fn reserve_unigrams(&mut self, count: usize) {
        self.counts.clear();
        self.counts.resize(count, 0);
    }

    fn set_unigrams(&mut self, unigrams: &[Unigram]) -> Result<(), LmError> {
        let words: Vec<&str> = unigrams.iter().map(|u| u.word.as_str()).collect();
        self.dictionary.set_words(&words);
        for unigram in unigrams {
            let wid = self.dictionary.word_to_id(&unigram.word);
            if wid != NONE {
                self.count_word_id(wid, unigram.count as i64);
            }
        }
        Ok(())
    }

    fn count_arpa_ngram(&mut self, tokens: &[&str], count: CountType, _time: u32) {
        if let [word] = tokens {
            self.count_word(word, count as i64, true);
        }
    }

    fn num_ngrams(&self, level: usize) -> usize {
        if level == 0 {
            self.counts.len()
        } else {
            0
        }
    }

    fn assure_valid_control_words(&mut self) {
        UnigramModel::assure_valid_control_words(self);
    }

    fn write_ngram_sections(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w)?;
        writeln!(w, "\\1-grams:")?;
        for (wid, &count) in self.counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            if let Some(word) = self.dictionary.id_to_word(wid as WordId) {
                writeln!(w, "{} {}", count, word)?;
            }
        }
        Ok(())
    }
}
