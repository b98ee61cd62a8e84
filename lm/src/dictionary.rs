//! Vocabulary of a language model.
//!
//! The dictionary maps UTF-8 words to dense `WordId`s and back. Two sorted
//! representations exist:
//!
//! - *self-sorted*: after a bulk [`Dictionary::set_words`] the word array
//!   itself is sorted (apart from the control words at the front) and no
//!   extra memory is spent on an index. This is the state large, static
//!   system models stay in.
//! - *permuted*: the first [`Dictionary::add_word`] after a bulk load
//!   materialises a permutation array `sorted[i] -> WordId` so that single
//!   insertions keep a sorted view without moving existing ids.
//!
//! All comparisons are byte-wise so that the ordering used by the binary
//! searches is identical to the ordering used on insertion.

use once_cell::sync::Lazy;
use unicode_normalization::char::{decompose_canonical, is_combining_mark};

use crate::PredictOptions;

/// Index of a word in the dictionary.
pub type WordId = u32;

/// Sentinel for "no such word".
pub const NONE: WordId = WordId::MAX;

/// Reserved control-word ids, fixed at the start of every dictionary.
pub const UNKNOWN_WORD_ID: WordId = 0;
pub const BEGIN_OF_SENTENCE_ID: WordId = 1;
pub const END_OF_SENTENCE_ID: WordId = 2;
pub const NUMBER_ID: WordId = 3;
pub const NUM_CONTROL_WORDS: usize = 4;

/// Labels of the control words, in id order.
pub const CONTROL_WORDS: [&str; NUM_CONTROL_WORDS] = ["<unk>", "<s>", "</s>", "<num>"];

/// Bulk entries within this window of the start of `set_words` are checked
/// against pre-existing control words and deduplicated.
pub const CONTROL_DEDUP_WINDOW: usize = 100;

/// Accent transform: code point above U+007F -> unaccented base letter.
///
/// Generated from Unicode NFD decompositions once at first use; sorted by
/// code point for binary search.
static ACCENT_TRANSFORM: Lazy<Vec<(char, char)>> = Lazy::new(|| {
    let mut table = Vec::new();
    let mut decomposed = Vec::new();
    for cp in 0x80u32..0x3000 {
        let Some(c) = char::from_u32(cp) else {
            continue;
        };
        decomposed.clear();
        decompose_canonical(c, |d| decomposed.push(d));
        if decomposed.len() > 1
            && decomposed[0] != c
            && decomposed[1..].iter().all(|&m| is_combining_mark(m))
        {
            table.push((c, decomposed[0]));
        }
    }
    table.sort_unstable();
    table
});

fn remove_accent(c: char) -> char {
    if c as u32 > 0x7f {
        let table = &*ACCENT_TRANSFORM;
        if let Ok(i) = table.binary_search_by_key(&c, |e| e.0) {
            return table[i].1;
        }
    }
    c
}

fn has_accent(c: char) -> bool {
    remove_accent(c) != c
}

fn lowercase(c: char) -> char {
    // Single-char mapping; multi-char lowercasings keep the original to
    // stay aligned with the per-character prefix walk.
    let mut it = c.to_lowercase();
    let lower = it.next().unwrap_or(c);
    if it.next().is_some() {
        c
    } else {
        lower
    }
}

/// Prefix comparison with optional case- and accent-insensitivity.
///
/// The *smart* variants relax only those positions of the candidate whose
/// prefix character is itself lowercase/unaccented, so a capitalised or
/// accented prefix keeps matching strictly.
pub(crate) struct PrefixMatcher {
    prefix: Vec<char>,
    options: PredictOptions,
}

impl PrefixMatcher {
    pub(crate) fn new(prefix: &str, options: PredictOptions) -> Self {
        let mut prefix: Vec<char> = prefix.chars().collect();

        if !options.contains(PredictOptions::CASE_INSENSITIVE_SMART)
            && options.contains(PredictOptions::CASE_INSENSITIVE)
        {
            for c in &mut prefix {
                *c = lowercase(*c);
            }
        }
        if !options.contains(PredictOptions::ACCENT_INSENSITIVE_SMART)
            && options.contains(PredictOptions::ACCENT_INSENSITIVE)
        {
            for c in &mut prefix {
                *c = remove_accent(*c);
            }
        }

        Self { prefix, options }
    }

    pub(crate) fn matches(&self, word: &str) -> bool {
        let mut chars = word.chars();

        if let Some(first) = word.chars().next() {
            if self.options.contains(PredictOptions::IGNORE_CAPITALIZED) && first.is_uppercase() {
                return false;
            }
            if self.options.contains(PredictOptions::IGNORE_NON_CAPITALIZED)
                && !first.is_uppercase()
            {
                return false;
            }
        }

        for &p in &self.prefix {
            let Some(mut c) = chars.next() else {
                return false; // candidate shorter than the prefix
            };

            if self.options.contains(PredictOptions::CASE_INSENSITIVE_SMART) {
                if !p.is_uppercase() {
                    c = lowercase(c);
                }
            } else if self.options.contains(PredictOptions::CASE_INSENSITIVE) {
                c = lowercase(c);
            }

            if self.options.contains(PredictOptions::ACCENT_INSENSITIVE_SMART) {
                if !has_accent(p) {
                    c = remove_accent(c);
                }
            } else if self.options.contains(PredictOptions::ACCENT_INSENSITIVE) {
                c = remove_accent(c);
            }

            if c != p {
                return false;
            }
        }

        true
    }
}

/// The vocabulary of a language model.
#[derive(Debug, Default)]
pub struct Dictionary {
    words: Vec<String>,
    /// Permutation `sorted[i] -> WordId`, only present once words were
    /// added after a bulk load.
    sorted: Option<Vec<WordId>>,
    /// Number of unsorted (control) entries at the front of `words`.
    sorted_words_begin: usize,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.words.clear();
        self.words.shrink_to_fit();
        self.sorted = None;
        self.sorted_words_begin = 0;
    }

    /// Number of word types, including control words.
    pub fn num_word_types(&self) -> usize {
        self.words.len()
    }

    /// Set words in bulk.
    ///
    /// Preconditions: only control words may already exist; if `new_words`
    /// contains control words they appear within the first
    /// [`CONTROL_DEDUP_WINDOW`] entries. Afterwards the appended portion is
    /// sorted in place and the permutation array stays unallocated.
    pub fn set_words<S: AsRef<str>>(&mut self, new_words: &[S]) {
        self.sorted = None;

        let initial_size = self.words.len();
        for (i, word) in new_words.iter().enumerate() {
            let word = word.as_ref();

            // known control word?
            let exists = i < CONTROL_DEDUP_WINDOW
                && self.words[..initial_size].iter().any(|w| w == word);
            if !exists {
                self.words.push(word.to_string());
            }
        }

        // Same comparison as the binary searches below.
        self.words[initial_size..].sort_unstable_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
        self.sorted_words_begin = initial_size;
    }

    /// Append a single word, keeping the sorted view intact.
    ///
    /// O(N) per insertion; acceptable because learning adds far fewer
    /// words than bulk loads do.
    pub fn add_word(&mut self, word: &str) -> WordId {
        let wid = self.words.len() as WordId;
        self.update_sorting(word, wid);
        self.words.push(word.to_string());
        wid
    }

    /// Look up a word, `NONE` if absent.
    pub fn word_to_id(&self, word: &str) -> WordId {
        if let Some(index) = self.search_index(word) {
            if index < self.words.len() {
                let wid = match &self.sorted {
                    Some(sorted) => sorted[index],
                    None => index as WordId,
                };
                if self.words[wid as usize] == word {
                    return wid;
                }
            }
        }
        NONE
    }

    /// Word for a valid id, `None` past the end.
    pub fn id_to_word(&self, wid: WordId) -> Option<&str> {
        self.words.get(wid as usize).map(|w| w.as_str())
    }

    pub fn contains(&self, word: &str) -> bool {
        self.word_to_id(word) != NONE
    }

    /// Map the word, adding it when unknown and allowed; unknown words map
    /// to `UNKNOWN_WORD_ID` otherwise.
    pub fn query_add_word(&mut self, word: &str, allow_new_words: bool) -> WordId {
        let wid = self.word_to_id(word);
        if wid == NONE {
            if allow_new_words {
                self.add_word(word)
            } else {
                UNKNOWN_WORD_ID
            }
        } else {
            wid
        }
    }

    pub fn words_to_ids<S: AsRef<str>>(&self, words: &[S]) -> Vec<WordId> {
        words.iter().map(|w| self.word_to_id(w.as_ref())).collect()
    }

    /// Find all word ids whose word starts with `prefix`.
    ///
    /// With `wids_in` given, only that id list is filtered; otherwise the
    /// whole dictionary is scanned. Control words are excluded unless
    /// `INCLUDE_CONTROL_WORDS` is set.
    pub fn prefix_search(
        &self,
        prefix: &str,
        wids_in: Option<&[WordId]>,
        wids_out: &mut Vec<WordId>,
        options: PredictOptions,
    ) {
        let min_wid = if options.contains(PredictOptions::INCLUDE_CONTROL_WORDS) {
            0
        } else {
            NUM_CONTROL_WORDS as WordId
        };

        let cmp = PrefixMatcher::new(prefix, options);
        match wids_in {
            Some(wids) => {
                for &wid in wids {
                    if wid >= min_wid && cmp.matches(&self.words[wid as usize]) {
                        wids_out.push(wid);
                    }
                }
            }
            None => {
                for wid in min_wid..self.words.len() as WordId {
                    if cmp.matches(&self.words[wid as usize]) {
                        wids_out.push(wid);
                    }
                }
            }
        }
    }

    /// Look up a word and report how it matched:
    /// `1` exact match, `-n` for n partial (prefix) matches, `0` no match.
    pub fn lookup_word(&self, word: &str) -> i32 {
        let Some(index) = self.search_index(word) else {
            return 0;
        };

        if index < self.words.len() {
            let wid = match &self.sorted {
                Some(sorted) => sorted[index],
                None => index as WordId,
            };
            if self.words[wid as usize] == word {
                return 1;
            }
        }

        // count words continuing the prefix; they follow the insertion
        // point in sorted order
        let mut count = 0;
        for i in index..self.words.len() {
            let wid = match &self.sorted {
                Some(sorted) => sorted[i],
                None => i as WordId,
            };
            if !self.words[wid as usize].as_bytes().starts_with(word.as_bytes()) {
                break;
            }
            count += 1;
        }
        -count
    }

    /// Index of the insertion point for `word` in the active sorted view.
    ///
    /// In self-sorted mode the index is a position in `words` itself and
    /// control words at the front are probed linearly as a fallback; in
    /// permuted mode it is a position in the permutation.
    fn search_index(&self, word: &str) -> Option<usize> {
        match &self.sorted {
            Some(_) => Some(self.binsearch_sorted(word)),
            None => {
                let mut index = self.binsearch_words(word);

                if index >= self.words.len() || self.words[index] != word {
                    for i in 0..self.sorted_words_begin {
                        if self.words[i] == word {
                            index = i;
                            break;
                        }
                    }
                }
                Some(index)
            }
        }
    }

    /// Lower-bound search through the permutation array.
    fn binsearch_sorted(&self, word: &str) -> usize {
        let sorted = self.sorted.as_ref().expect("permuted mode");
        let mut lo = 0;
        let mut hi = sorted.len();
        while lo < hi {
            let mid = (lo + hi) >> 1;
            if self.words[sorted[mid] as usize].as_bytes() < word.as_bytes() {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Lower-bound search through the self-sorted portion of `words`.
    fn binsearch_words(&self, word: &str) -> usize {
        let mut lo = self.sorted_words_begin;
        let mut hi = self.words.len();
        while lo < hi {
            let mid = (lo + hi) >> 1;
            if self.words[mid].as_bytes() < word.as_bytes() {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// First `add_word` after a bulk load materialises the permutation.
    fn update_sorting(&mut self, word: &str, wid: WordId) {
        if self.sorted.is_none() {
            self.sorted = Some(
                (self.sorted_words_begin as WordId..self.words.len() as WordId).collect(),
            );

            // Control words weren't sorted before, insert them sorted.
            for i in 0..self.sorted_words_begin {
                let index = self.binsearch_sorted(&self.words[i]);
                self.sorted
                    .as_mut()
                    .expect("materialised above")
                    .insert(index, i as WordId);
            }
        }

        let index = self.binsearch_sorted(word);
        self.sorted
            .as_mut()
            .expect("materialised above")
            .insert(index, wid);
    }
}
