//! softboard-lm
//!
//! Language-model engine of the softboard on-screen keyboard: a
//! vocabulary-indexed n-gram trie with incremental learning, ARPA-style
//! persistence, case/accent-insensitive prefix lookup, two smoothing
//! schemes and composition of several models through merge policies.
//!
//! Public API:
//! - [`Dictionary`] - string <-> id vocabulary with sorted prefix search
//! - [`NGramTrie`] - count-storing trie shared by the dynamic models
//! - [`DynamicModel`] - learning n-gram model with ARPA load/save
//! - [`UnigramModel`] - flat word-frequency model
//! - [`MergedModel`] - overlay / linear / log-linear composition
//! - [`LanguageModel`] - the common prediction interface
//! - [`WordSuggestionsConfig`] - word-suggestion options

pub mod arpa;
pub use arpa::{read_order, LmError};

pub mod dictionary;
pub use dictionary::{Dictionary, WordId, CONTROL_WORDS, NONE, NUM_CONTROL_WORDS};

pub mod trie;
pub use trie::{CountType, NGramTrie};

pub mod model;
pub use model::{LanguageModel, PredictOptions, PredictResult};

pub mod dynamic;
pub use dynamic::{DynamicModel, LmErrorKind, Smoothing};

pub mod unigram;
pub use unigram::UnigramModel;

pub mod merged;
pub use merged::{MergePolicy, MergedModel};

pub mod config;
pub use config::WordSuggestionsConfig;
