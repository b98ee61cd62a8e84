//! ARPA-like model files.
//!
//! Counts instead of log probabilities, no back-off values, n-grams in any
//! order:
//!
//! ```text
//! \data\
//! ngram 1=N1
//! ngram 2=N2
//!
//! \1-grams:
//! <count> [<time>] <word>
//! \2-grams:
//! <count> <w1> <w2>
//! \end\
//! ```
//!
//! Loading is state-machine driven. Unigrams are collected first and
//! flushed in bulk so the dictionary can stay self-sorted. Zero-count rows
//! from legacy files are ignored and the expected level count adjusted.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::trie::CountType;

/// Model-layer errors for load and save.
#[derive(Debug, Error)]
pub enum LmError {
    #[error("IO Error for '{filename}': {source}")]
    File {
        filename: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Out of memory")]
    Memory,
    #[error("Bad file format, too few tokens in '{0}'")]
    NumTokens(String),
    #[error("Bad file format, unexpected ngram order in '{0}'")]
    OrderUnexpected(String),
    #[error("Bad file format, ngram order not supported by this model in '{0}'")]
    OrderUnsupported(String),
    #[error("Bad file format, ngram count mismatch in '{0}'")]
    Count(String),
    #[error("Bad file format, unexpected end of file in '{0}'")]
    UnexpectedEof(String),
    #[error("error encoding to UTF-8 in '{0}'")]
    Encode(String),
    #[error("error decoding to Unicode in '{0}'")]
    Decode(String),
    #[error("Not implemented")]
    NotImpl,
}

impl LmError {
    pub(crate) fn file(filename: &Path, source: std::io::Error) -> Self {
        LmError::File {
            filename: filename.display().to_string(),
            source,
        }
    }
}

/// Transient unigram, only alive between reading the 1-gram section and
/// the bulk flush into dictionary and trie.
#[derive(Debug, Clone)]
pub(crate) struct Unigram {
    pub word: String,
    pub count: CountType,
    pub time: u32,
}

/// What the loader and saver need from a concrete model.
pub(crate) trait ArpaModel {
    /// Reset to an empty model with valid control words.
    fn clear(&mut self);

    /// Highest order this model can store, `None` for unlimited.
    fn max_order(&self) -> Option<usize>;

    /// Clear and re-dimension for a new order.
    fn set_order(&mut self, order: usize);
    fn order(&self) -> usize;

    /// Pre-allocate the unigram level; drops control-word unigram counts,
    /// they are restored after loading.
    fn reserve_unigrams(&mut self, count: usize);

    /// Bulk-insert the collected unigrams.
    fn set_unigrams(&mut self, unigrams: &[Unigram]) -> Result<(), LmError>;

    /// Count one n-gram given as tokens, with an optional timestamp.
    fn count_arpa_ngram(&mut self, tokens: &[&str], count: CountType, time: u32);

    /// Unique n-grams with count > 0 at `level` (0-based).
    fn num_ngrams(&self, level: usize) -> usize;

    /// Guarantee the four control words exist with count >= 1.
    fn assure_valid_control_words(&mut self);

    /// Write all n-gram sections.
    fn write_ngram_sections(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

enum State {
    Begin,
    Counts,
    NgramsHead,
    Ngrams,
    Done,
}

/// Load an ARPA-like file into `model`.
pub(crate) fn load_arpa<M: ArpaModel>(path: &Path, model: &mut M) -> Result<(), LmError> {
    model.clear();

    let file = File::open(path).map_err(|e| LmError::file(path, e))?;
    let mut reader = BufReader::new(file);

    let mut new_order = 0usize;
    let mut current_level = 0usize;
    let mut counts: Vec<i64> = Vec::new();
    let mut unigrams: Vec<Unigram> = Vec::new();
    let mut state = State::Begin;
    let mut line = String::new();
    let mut first_line = true;

    let result = loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break Ok(()),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                break Err(LmError::Decode(path.display().to_string()))
            }
            Err(e) => break Err(LmError::file(path, e)),
        }
        if first_line {
            first_line = false;
            if let Some(stripped) = line.strip_prefix('\u{feff}') {
                line = stripped.to_string();
            }
        }

        let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }

        match state {
            // n-grams first, by far the most frequent case
            State::Ngrams => {
                if tokens[0].starts_with('\\') {
                    // end of section: flush unigrams, verify the count
                    if current_level == 1 {
                        if let Err(e) = model.set_unigrams(&unigrams) {
                            break Err(e);
                        }
                        unigrams = Vec::new();
                    }

                    let expected = counts[current_level - 1];
                    let read = model.num_ngrams(current_level - 1) as i64;
                    if read != expected {
                        warn!(
                            level = current_level,
                            expected, read, "unexpected n-gram count"
                        );
                        break Err(LmError::Count(path.display().to_string()));
                    }
                    state = State::NgramsHead;
                    // fall through to the section-header handling below
                } else {
                    if tokens.len() < current_level + 1 {
                        warn!(
                            level = current_level,
                            found = tokens.len(),
                            "too few tokens for n-gram level"
                        );
                        break Err(LmError::NumTokens(path.display().to_string()));
                    }

                    let mut itok = 0;
                    let count: i64 = tokens[itok].parse().unwrap_or(0);
                    itok += 1;

                    let mut time = 0u32;
                    if tokens.len() >= current_level + 2 {
                        time = tokens[itok].parse().unwrap_or(0);
                        itok += 1;
                    }

                    // Old files may contain zero counts; these n-grams
                    // count as removed and are skipped on load.
                    if count <= 0 {
                        counts[current_level - 1] -= 1;
                    } else if current_level == 1 {
                        // collect unigrams so they can be sorted in bulk
                        unigrams.push(Unigram {
                            word: tokens[itok].to_string(),
                            count: count as CountType,
                            time,
                        });
                    } else {
                        model.count_arpa_ngram(
                            &tokens[itok..itok + current_level],
                            count as CountType,
                            time,
                        );
                    }
                    continue;
                }
            }
            State::Begin => {
                if tokens[0].starts_with("\\data\\") {
                    state = State::Counts;
                }
                continue;
            }
            State::Counts => {
                if tokens[0] == "ngram" && tokens.len() >= 2 {
                    if let Some((level, count)) = parse_level_count(tokens[1]) {
                        new_order = new_order.max(level);
                        counts.resize(new_order, 0);
                        counts[level - 1] = count;
                    }
                    continue;
                }

                if let Some(max_order) = model.max_order() {
                    if max_order < new_order {
                        break Err(LmError::OrderUnsupported(path.display().to_string()));
                    }
                }

                // clear the model and set it up for the new order
                model.set_order(new_order);
                if new_order > 0 {
                    // Drops control words; they come back through
                    // assure_valid_control_words below.
                    model.reserve_unigrams(counts[0].max(0) as usize);
                }
                state = State::NgramsHead;
                // fall through to the section-header handling below
            }
            State::NgramsHead | State::Done => {}
        }

        // NGRAMS_HEAD: a section header or the end marker
        if let Some(level) = parse_grams_header(tokens[0]) {
            if level < 1 || level > new_order {
                break Err(LmError::OrderUnexpected(path.display().to_string()));
            }
            current_level = level;
            state = State::Ngrams;
        } else if tokens[0].starts_with("\\end\\") {
            state = State::Done;
            break Ok(());
        }
    };

    let result = match result {
        Ok(()) => {
            if matches!(state, State::Done) {
                Ok(())
            } else {
                model.clear();
                Err(LmError::UnexpectedEof(path.display().to_string()))
            }
        }
        Err(e) => {
            model.clear();
            Err(e)
        }
    };

    // Control words may have been loaded with zero counts; make sure they
    // exist with at least count 1.
    model.assure_valid_control_words();

    result
}

/// Save `model` in the ARPA-like format.
pub(crate) fn save_arpa<M: ArpaModel>(path: &Path, model: &M) -> Result<(), LmError> {
    let file = File::create(path).map_err(|e| LmError::file(path, e))?;
    let mut writer = BufWriter::new(file);

    let io = |e: std::io::Error| LmError::file(path, e);

    writeln!(writer).map_err(io)?;
    writeln!(writer, "\\data\\").map_err(io)?;
    for i in 0..model.order() {
        writeln!(writer, "ngram {}={}", i + 1, model.num_ngrams(i)).map_err(io)?;
    }

    model.write_ngram_sections(&mut writer).map_err(io)?;

    writeln!(writer).map_err(io)?;
    writeln!(writer, "\\end\\").map_err(io)?;
    writer.flush().map_err(io)?;
    Ok(())
}

/// Parse `L=C` from an `ngram L=C` counts line.
fn parse_level_count(token: &str) -> Option<(usize, i64)> {
    let (level, count) = token.split_once('=')?;
    Some((level.parse().ok()?, count.parse().ok()?))
}

/// Parse `\K-grams:` headers.
fn parse_grams_header(token: &str) -> Option<usize> {
    let rest = token.strip_prefix('\\')?;
    let rest = rest.strip_suffix(':').unwrap_or(rest);
    let level = rest.strip_suffix("-grams")?;
    level.parse().ok()
}

static NGRAM_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ngram (\d+)=\d+").expect("valid regex"));

/// Read the order from the header of an ARPA-like file.
///
/// Scans at most the first 20 lines; `None` when no counts section is
/// found or the file cannot be read.
pub fn read_order(path: &Path) -> Option<usize> {
    let file = File::open(path).ok()?;
    let reader = BufReader::new(file.take(1 << 20));

    let mut order: Option<usize> = None;
    let mut in_data = false;

    for line in reader.lines().take(20) {
        let line = line.ok()?;
        if line.starts_with("\\data\\") {
            in_data = true;
            continue;
        }
        if in_data {
            if let Some(cap) = NGRAM_HEADER_RE.captures(&line) {
                let level: usize = cap[1].parse().ok()?;
                order = Some(order.unwrap_or(0).max(level));
            }
            if line.starts_with('\\') {
                break;
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_headers() {
        assert_eq!(parse_level_count("3=1500"), Some((3, 1500)));
        assert_eq!(parse_level_count("x"), None);
        assert_eq!(parse_grams_header("\\2-grams:"), Some(2));
        assert_eq!(parse_grams_header("\\end\\"), None);
    }

    #[test]
    fn read_order_finds_max_level() {
        let dir = std::env::temp_dir().join("softboard_lm_read_order_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.lm");
        std::fs::write(&path, "\n\\data\\\nngram 1=10\nngram 2=20\nngram 3=5\n\\1-grams:\n").unwrap();
        assert_eq!(read_order(&path), Some(3));
        let _ = std::fs::remove_file(path);
    }
}
