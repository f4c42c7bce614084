//! Character-class helpers shared by the chunker, keyword extractor,
//! and segmenter.
//!
//! Script detection is a bounded CJK/Latin heuristic: "CJK" covers the
//! unified ideograph blocks plus CJK punctuation and full-width forms,
//! "ideograph" covers only the unified ideograph blocks.

/// Punctuation removed from text before it is segmented.
const STRIP_PUNCTUATION: &str = "，、；：？！—…“”‘’《》〈〉【】（）［］(){}[]<>-·~`!@#$%^&*+=|\\:;\"',/?";

/// Punctuation a token may consist of entirely and still be discarded.
const TOKEN_PUNCTUATION: &str =
    "，。！？：；、（）【】《》“”‘’——…!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Characters that end a sentence for recency detection.
const SENTENCE_BREAKS: [char; 4] = ['。', '？', '！', '\n'];

/// Characters that end a sentence for chunking.
const SENTENCE_TERMINATORS: [char; 6] = ['。', '！', '？', '.', '!', '?'];

/// Unified CJK ideograph (including extension A and compatibility forms).
pub fn is_cjk_ideograph(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}')
}

/// Ideograph, CJK punctuation, or full-width form.
pub fn is_cjk(c: char) -> bool {
    is_cjk_ideograph(c) || matches!(c, '\u{3000}'..='\u{303F}' | '\u{FF00}'..='\u{FFEF}')
}

/// Whether any CJK codepoint appears in `text`.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// Latin-dominant text has more than twice as many ASCII letters as
/// CJK ideographs.
pub fn is_mostly_latin(text: &str) -> bool {
    let (mut latin, mut cjk) = (0usize, 0usize);
    for c in text.chars() {
        if c.is_ascii_alphabetic() {
            latin += 1;
        } else if is_cjk_ideograph(c) {
            cjk += 1;
        }
    }
    latin > cjk * 2
}

/// Remove punctuation, fold line breaks into spaces, and collapse runs
/// of whitespace.
pub fn strip_punctuation(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !STRIP_PUNCTUATION.contains(*c))
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A token made only of punctuation characters.
pub fn is_punctuation_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| TOKEN_PUNCTUATION.contains(c))
}

/// Byte offset just after the last sentence break in `text`, or 0.
pub fn last_sentence_start(text: &str) -> usize {
    text.char_indices()
        .filter(|(_, c)| SENTENCE_BREAKS.contains(c))
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0)
}

/// Split after every sentence terminator, trimming and dropping empties.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if SENTENCE_TERMINATORS.contains(&c) {
            push_trimmed(&mut out, &current);
            current.clear();
        }
    }
    push_trimmed(&mut out, &current);
    out
}

fn push_trimmed(out: &mut Vec<String>, s: &str) {
    let trimmed = s.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Length in characters, the unit all ceilings are expressed in.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}
