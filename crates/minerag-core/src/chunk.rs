//! Boundary-preserving text chunker.
//!
//! Splits extracted document text into chunk strings bounded by a
//! script-dependent ceiling, measured in characters.
//!
//! # Algorithm
//!
//! 1. Trim the input and normalize `\r\n` to `\n`. Empty input yields no chunks.
//! 2. Pick the script: any CJK codepoint selects CJK mode (`max_len_cjk`),
//!    otherwise Latin mode (`max_len_latin`).
//! 3. Pick the unit:
//!    - **structured** input (lines like `Sheet1 - orders.xlsx - 记录 12`)
//!      is split into whole records, each running from one marker line to
//!      the next;
//!    - CJK text is split into sentences;
//!    - Latin text is split into whitespace-delimited words.
//! 4. Accumulate units into a buffer and flush when the next unit would
//!    exceed the ceiling. CJK units join with no separator, Latin units
//!    with a single space, records with a blank line.
//! 5. A record larger than the ceiling is emitted alone and verbatim.
//!    Any other unit larger than the ceiling is hard-split at character
//!    boundaries.
//! 6. With `overlap > 0` (non-structured only), every chunk after the
//!    first is prefixed with the last `overlap` units of the previous one.
//!
//! # Example
//!
//! ```rust
//! use minerag_core::chunk::{chunk_text, ChunkOptions};
//!
//! let opts = ChunkOptions { max_len_cjk: 2, ..ChunkOptions::default() };
//! assert_eq!(chunk_text("A。B。C。", &opts), vec!["A。", "B。", "C。"]);
//! ```

use crate::text::{char_len, contains_cjk, split_sentences};

/// Default ceiling for CJK text, in characters.
pub const DEFAULT_MAX_LEN_CJK: usize = 550;
/// Default ceiling for Latin text, in characters.
pub const DEFAULT_MAX_LEN_LATIN: usize = 1000;

const RECORD_SEPARATOR: &str = "\n\n";

/// Chunking limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    pub max_len_cjk: usize,
    pub max_len_latin: usize,
    /// Units of the previous chunk repeated at the start of the next.
    pub overlap: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_len_cjk: DEFAULT_MAX_LEN_CJK,
            max_len_latin: DEFAULT_MAX_LEN_LATIN,
            overlap: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Structured,
    Cjk,
    Latin,
}

impl Mode {
    fn separator(self) -> &'static str {
        match self {
            Mode::Structured => RECORD_SEPARATOR,
            Mode::Cjk => "",
            Mode::Latin => " ",
        }
    }

    fn split_units(self, text: &str) -> Vec<String> {
        match self {
            Mode::Structured => split_records(text),
            Mode::Cjk => split_sentences(text),
            Mode::Latin => text.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// Split `text` into chunks. Pure and deterministic.
pub fn chunk_text(text: &str, opts: &ChunkOptions) -> Vec<String> {
    let raw = text.trim().replace("\r\n", "\n");
    if raw.is_empty() {
        return Vec::new();
    }

    let max_len = if contains_cjk(&raw) {
        opts.max_len_cjk
    } else {
        opts.max_len_latin
    }
    .max(1);
    let mode = if is_structured(&raw) {
        Mode::Structured
    } else if contains_cjk(&raw) {
        Mode::Cjk
    } else {
        Mode::Latin
    };

    let chunks = accumulate(mode, mode.split_units(&raw), max_len);

    if opts.overlap > 0 && mode != Mode::Structured {
        return apply_overlap(mode, &chunks, opts.overlap);
    }
    chunks
}

/// Whether `text` contains at least one record marker line.
pub fn is_structured(text: &str) -> bool {
    text.lines().any(is_record_marker)
}

/// A line of the form `<label> - <label> - 记录 <n>` or `… - 行 <n>`.
pub fn is_record_marker(line: &str) -> bool {
    let line = line.trim_end();
    let without_number = line.trim_end_matches(|c: char| c.is_ascii_digit());
    if without_number.len() == line.len() {
        return false;
    }
    let labels = match without_number
        .strip_suffix(" - 记录 ")
        .or_else(|| without_number.strip_suffix(" - 行 "))
    {
        Some(labels) => labels,
        None => return false,
    };
    labels
        .match_indices(" - ")
        .any(|(i, sep)| i > 0 && i + sep.len() < labels.len())
}

/// Split structured text into records. Text before the first marker is
/// kept as a leading unit of its own.
fn split_records(text: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if is_record_marker(line) && !current.is_empty() {
            push_record(&mut records, &current);
            current.clear();
        }
        current.push(line);
    }
    push_record(&mut records, &current);
    records
}

fn push_record(records: &mut Vec<String>, lines: &[&str]) {
    let record = lines.join("\n");
    let trimmed = record.trim();
    if !trimmed.is_empty() {
        records.push(trimmed.to_string());
    }
}

fn accumulate(mode: Mode, units: Vec<String>, max_len: usize) -> Vec<String> {
    let sep = mode.separator();
    let sep_len = char_len(sep);
    let mut chunks = Vec::new();
    let mut buf: Vec<String> = Vec::new();
    let mut buf_len = 0usize;

    let flush = |buf: &mut Vec<String>, buf_len: &mut usize, chunks: &mut Vec<String>| {
        if !buf.is_empty() {
            chunks.push(buf.join(sep));
            buf.clear();
            *buf_len = 0;
        }
    };

    for unit in units {
        let unit_len = char_len(&unit);

        if unit_len > max_len {
            flush(&mut buf, &mut buf_len, &mut chunks);
            if mode == Mode::Structured {
                chunks.push(unit);
            } else {
                chunks.extend(hard_split(&unit, max_len));
            }
            continue;
        }

        let would_be = if buf.is_empty() {
            unit_len
        } else {
            buf_len + sep_len + unit_len
        };
        if would_be > max_len {
            flush(&mut buf, &mut buf_len, &mut chunks);
        }

        buf_len = if buf.is_empty() {
            unit_len
        } else {
            buf_len + sep_len + unit_len
        };
        buf.push(unit);
    }
    flush(&mut buf, &mut buf_len, &mut chunks);
    chunks
}

/// Split a single oversized unit into pieces of at most `max_len` characters.
fn hard_split(unit: &str, max_len: usize) -> Vec<String> {
    let chars: Vec<char> = unit.chars().collect();
    chars
        .chunks(max_len)
        .map(|piece| piece.iter().collect::<String>())
        .filter(|piece| !piece.trim().is_empty())
        .collect()
}

fn apply_overlap(mode: Mode, chunks: &[String], overlap: usize) -> Vec<String> {
    let sep = mode.separator();
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            if i == 0 {
                return chunk.clone();
            }
            let prev_units = mode.split_units(&chunks[i - 1]);
            let tail_start = prev_units.len().saturating_sub(overlap);
            let mut units = prev_units[tail_start..].to_vec();
            units.extend(mode.split_units(chunk));
            units.join(sep)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(cjk: usize, latin: usize) -> ChunkOptions {
        ChunkOptions {
            max_len_cjk: cjk,
            max_len_latin: latin,
            overlap: 0,
        }
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert!(chunk_text("", &ChunkOptions::default()).is_empty());
        assert!(chunk_text("  \n\t ", &ChunkOptions::default()).is_empty());
    }

    #[test]
    fn test_cjk_sentences_one_per_chunk() {
        let chunks = chunk_text("A。B。C。", &opts(2, 1000));
        assert_eq!(chunks, vec!["A。", "B。", "C。"]);
    }

    #[test]
    fn test_cjk_sentences_joined_without_separator() {
        let chunks = chunk_text("今天很好。明天下雨。后天晴。", &opts(10, 1000));
        assert_eq!(chunks, vec!["今天很好。明天下雨。", "后天晴。"]);
    }

    #[test]
    fn test_latin_words_joined_with_space() {
        let chunks = chunk_text("alpha beta\ngamma   delta", &opts(550, 11));
        assert_eq!(chunks, vec!["alpha beta", "gamma delta"]);
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", &ChunkOptions::default());
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn test_chunk_bound_non_structured() {
        let cjk: String = (0..200).map(|i| format!("第{}句话内容。", i)).collect();
        for c in chunk_text(&cjk, &opts(40, 1000)) {
            assert!(char_len(&c) <= 40, "chunk too long: {}", char_len(&c));
        }
        let latin = (0..500)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        for c in chunk_text(&latin, &opts(550, 37)) {
            assert!(char_len(&c) <= 37, "chunk too long: {}", char_len(&c));
        }
    }

    #[test]
    fn test_oversized_unit_is_hard_split() {
        let long_sentence = format!("{}。", "长".repeat(25));
        let chunks = chunk_text(&long_sentence, &opts(10, 1000));
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| char_len(c) <= 10));
        assert_eq!(chunks.concat(), long_sentence);
    }

    #[test]
    fn test_record_marker_detection() {
        assert!(is_record_marker("Sheet1 - orders.xlsx - 记录 12"));
        assert!(is_record_marker("a - b - 行 3"));
        assert!(!is_record_marker(" - b - 行 3"));
        assert!(!is_record_marker("a - b - 记录"));
        assert!(!is_record_marker("记录 12"));
        assert!(!is_record_marker("a - b - 记录 x"));
    }

    fn structured_input(n: usize, body: &str) -> String {
        (1..=n)
            .map(|i| format!("Sheet1 - data.xlsx - 记录 {}\n姓名: 张{}\n{}", i, i, body))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_structured_records_never_split() {
        let text = structured_input(6, "备注: 正常");
        let chunks = chunk_text(&text, &opts(60, 1000));
        assert!(chunks.len() > 1);
        for i in 1..=6 {
            let marker = format!("Sheet1 - data.xlsx - 记录 {}\n姓名: 张{}\n备注: 正常", i, i);
            let holders = chunks.iter().filter(|c| c.contains(&marker)).count();
            assert_eq!(holders, 1, "record {} must live wholly in one chunk", i);
        }
        assert!(chunks.iter().all(|c| c.starts_with("Sheet1 - data.xlsx - 记录")));
    }

    #[test]
    fn test_structured_records_joined_with_blank_line() {
        let text = structured_input(2, "x");
        let chunks = chunk_text(&text, &ChunkOptions::default());
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("x\n\nSheet1 - data.xlsx - 记录 2"));
    }

    #[test]
    fn test_oversized_record_emitted_verbatim() {
        let big = "很".repeat(80);
        let text = format!(
            "S - f.xlsx - 行 1\n短\nS - f.xlsx - 行 2\n{}\nS - f.xlsx - 行 3\n短",
            big
        );
        let chunks = chunk_text(&text, &opts(30, 1000));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], format!("S - f.xlsx - 行 2\n{}", big));
        assert!(char_len(&chunks[1]) > 30);
    }

    #[test]
    fn test_structured_preamble_kept() {
        let text = "汇总表\nS - f.xlsx - 行 1\n甲";
        let chunks = chunk_text(text, &opts(5, 1000));
        assert_eq!(chunks, vec!["汇总表", "S - f.xlsx - 行 1\n甲"]);
    }

    #[test]
    fn test_overlap_prefixes_previous_tail() {
        let options = ChunkOptions {
            max_len_cjk: 550,
            max_len_latin: 11,
            overlap: 1,
        };
        let chunks = chunk_text("alpha beta gamma delta", &options);
        assert_eq!(chunks, vec!["alpha beta", "beta gamma delta"]);
    }

    #[test]
    fn test_overlap_ignored_for_structured() {
        let text = structured_input(3, "备注");
        let with = chunk_text(
            &text,
            &ChunkOptions {
                max_len_cjk: 30,
                max_len_latin: 1000,
                overlap: 2,
            },
        );
        let without = chunk_text(&text, &opts(30, 1000));
        assert_eq!(with, without);
    }

    #[test]
    fn test_crlf_normalized() {
        let chunks = chunk_text("one\r\ntwo", &ChunkOptions::default());
        assert_eq!(chunks, vec!["one two"]);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta. Gamma delta. Epsilon zeta eta theta.";
        let c1 = chunk_text(text, &opts(550, 12));
        let c2 = chunk_text(text, &opts(550, 12));
        assert_eq!(c1, c2);
    }
}
