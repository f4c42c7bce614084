//! Keyword extraction for retrieval.
//!
//! Turns the (possibly multi-turn) query text into an ordered keyword
//! list: tokenize, keep a length-adaptive prefix of the tokens, deduplicate
//! preserving first-seen order, then move likely proper nouns from the
//! latest sentence to the front.
//!
//! When the latest sentence introduces a proper noun, proper nouns that
//! only occur earlier are purged from the session memory, so context tied
//! to a superseded entity stops steering later searches.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::memory::SessionMemory;
use crate::text::{is_cjk_ideograph, is_punctuation_token, last_sentence_start, strip_punctuation};

/// Splits text into space-separated tokens.
///
/// The app crate implements this over the segmentation worker pool.
#[async_trait]
pub trait Tokenizer: Send + Sync {
    /// Return `text` as space-joined tokens.
    async fn tokenize(&self, text: &str) -> Result<String>;
}

/// Tokenizer that only strips punctuation and splits on whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

#[async_trait]
impl Tokenizer for WhitespaceTokenizer {
    async fn tokenize(&self, text: &str) -> Result<String> {
        Ok(strip_punctuation(text))
    }
}

/// Decides whether a keyword is likely a named entity.
pub trait ProperNounPredicate: Send + Sync {
    fn is_proper_noun(&self, word: &str) -> bool;
}

impl<F> ProperNounPredicate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_proper_noun(&self, word: &str) -> bool {
        self(word)
    }
}

/// A run of 2–4 CJK ideographs and nothing else.
#[derive(Debug, Clone, Copy)]
pub struct CjkProperNoun {
    pub min_chars: usize,
    pub max_chars: usize,
}

impl Default for CjkProperNoun {
    fn default() -> Self {
        Self {
            min_chars: 2,
            max_chars: 4,
        }
    }
}

impl ProperNounPredicate for CjkProperNoun {
    fn is_proper_noun(&self, word: &str) -> bool {
        let mut count = 0;
        for c in word.chars() {
            if !is_cjk_ideograph(c) {
                return false;
            }
            count += 1;
        }
        (self.min_chars..=self.max_chars).contains(&count)
    }
}

/// Controls how many tokens become keywords.
///
/// `top_k = clamp(round(tokens × ratio), min, max)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeywordParams {
    pub ratio: f64,
    pub min: usize,
    pub max: usize,
}

impl Default for KeywordParams {
    fn default() -> Self {
        Self {
            ratio: 0.6,
            min: 3,
            max: 20,
        }
    }
}

impl KeywordParams {
    pub fn top_k(&self, token_count: usize) -> usize {
        let scaled = (token_count as f64 * self.ratio).round() as usize;
        scaled.clamp(self.min, self.max.max(self.min))
    }
}

/// Derives ranked keywords from query text.
#[derive(Clone)]
pub struct KeywordExtractor {
    tokenizer: Arc<dyn Tokenizer>,
    predicate: Arc<dyn ProperNounPredicate>,
    params: KeywordParams,
}

impl KeywordExtractor {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            tokenizer,
            predicate: Arc::new(CjkProperNoun::default()),
            params: KeywordParams::default(),
        }
    }

    pub fn with_params(mut self, params: KeywordParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_predicate(mut self, predicate: Arc<dyn ProperNounPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn params(&self) -> &KeywordParams {
        &self.params
    }

    /// Ordered keywords for `text`.
    ///
    /// A tokenizer failure is not fatal: the punctuation-stripped text is
    /// split on whitespace instead.
    pub async fn get_keywords(
        &self,
        text: &str,
        memory: Option<&mut SessionMemory>,
    ) -> Vec<String> {
        let tokens = self.tokens(text).await;
        if tokens.is_empty() {
            return Vec::new();
        }

        let top_k = self.params.top_k(tokens.len());
        let mut keywords = dedup_keep_order(tokens.into_iter().take(top_k));

        if keywords.len() > 1 {
            keywords = self.reorder_recent_proper_first(text, keywords, memory);
        }
        debug!(?keywords, "extracted keywords");
        keywords
    }

    /// Every distinct token of `text`, in first-seen order.
    pub async fn all_terms(&self, text: &str) -> Vec<String> {
        dedup_keep_order(self.tokens(text).await)
    }

    async fn tokens(&self, text: &str) -> Vec<String> {
        let segmented = match self.tokenizer.tokenize(text).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "tokenization failed, falling back to untokenized text");
                strip_punctuation(text)
            }
        };
        segmented
            .split(' ')
            .map(str::trim)
            .filter(|t| !t.is_empty() && !is_punctuation_token(t))
            .map(str::to_string)
            .collect()
    }

    fn reorder_recent_proper_first(
        &self,
        text: &str,
        keywords: Vec<String>,
        memory: Option<&mut SessionMemory>,
    ) -> Vec<String> {
        let recent_begin = last_sentence_start(text);

        let mut proper_recent = Vec::new();
        let mut proper_old = Vec::new();
        let mut others = Vec::new();

        for kw in keywords {
            if !self.predicate.is_proper_noun(&kw) {
                others.push(kw);
                continue;
            }
            // Normalized keywords may not occur verbatim; those count as old.
            match text.find(kw.as_str()) {
                Some(pos) if pos >= recent_begin => proper_recent.push(kw),
                _ => proper_old.push(kw),
            }
        }

        if !proper_recent.is_empty() && !proper_old.is_empty() {
            if let Some(mem) = memory {
                debug!(stale = ?proper_old, "purging superseded entities from memory");
                mem.remove_keywords(&proper_old);
            }
        }

        proper_recent
            .into_iter()
            .chain(proper_old)
            .chain(others)
            .collect()
    }
}

fn dedup_keep_order<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tokenizer returning a fixed segmentation, ignoring its input.
    struct Fixed(&'static str);

    #[async_trait]
    impl Tokenizer for Fixed {
        async fn tokenize(&self, _text: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    #[async_trait]
    impl Tokenizer for Failing {
        async fn tokenize(&self, _text: &str) -> Result<String> {
            anyhow::bail!("worker crashed")
        }
    }

    fn extractor(tokens: &'static str) -> KeywordExtractor {
        KeywordExtractor::new(Arc::new(Fixed(tokens)))
    }

    #[test]
    fn test_top_k_clamped() {
        let p = KeywordParams::default();
        assert_eq!(p.top_k(1), 3);
        assert_eq!(p.top_k(5), 3);
        assert_eq!(p.top_k(10), 6);
        assert_eq!(p.top_k(13), 8);
        assert_eq!(p.top_k(100), 20);
    }

    #[test]
    fn test_cjk_proper_noun() {
        let p = CjkProperNoun::default();
        assert!(p.is_proper_noun("上海"));
        assert!(p.is_proper_noun("哈尔滨市"));
        assert!(!p.is_proper_noun("上"));
        assert!(!p.is_proper_noun("乌鲁木齐市区"));
        assert!(!p.is_proper_noun("上海2"));
        assert!(!p.is_proper_noun("rust"));
    }

    #[tokio::test]
    async fn test_empty_tokens() {
        let kws = extractor("   ").get_keywords("", None).await;
        assert!(kws.is_empty());
    }

    #[tokio::test]
    async fn test_dedup_and_top_k() {
        let kws = extractor("a b a c d e f g h i")
            .get_keywords("a b a c d e f g h i", None)
            .await;
        // 10 tokens -> top_k 6 -> "a b a c d e" -> dedup
        assert_eq!(kws, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_recent_proper_nouns_first() {
        let text = "上海的天气。北京的景点";
        // 4 tokens -> top_k 3 -> 景点 is cut
        let kws = extractor("上海 天气 北京 景点")
            .get_keywords(text, None)
            .await;
        assert_eq!(kws, vec!["北京", "上海", "天气"]);
    }

    #[tokio::test]
    async fn test_recent_proper_noun_purges_old_from_memory() {
        let mut mem = SessionMemory::default();
        mem.add_query("上海天气");
        mem.add_keywords(&["上海", "天气"]);
        mem.add_query("北京呢");
        let text = mem.all_queries();
        let kws = extractor("上海 天气 北京")
            .get_keywords(&text, Some(&mut mem))
            .await;
        assert_eq!(kws[0], "北京");
        assert!(!mem.contains_keyword("上海"));
        assert_eq!(mem.all_queries(), "北京呢");
    }

    #[tokio::test]
    async fn test_no_recent_proper_noun_keeps_memory() {
        let mut mem = SessionMemory::default();
        mem.add_query("上海天气");
        mem.add_keywords(&["上海", "天气"]);
        mem.add_query("how about tomorrow");
        let text = mem.all_queries();
        let _ = extractor("上海 天气 tomorrow")
            .get_keywords(&text, Some(&mut mem))
            .await;
        assert!(mem.contains_keyword("上海"));
    }

    #[tokio::test]
    async fn test_normalized_keyword_missing_from_text_is_not_recent() {
        let mut mem = SessionMemory::default();
        mem.add_query("上海 天气");
        mem.add_keywords(&["上海", "天气"]);
        mem.add_query("京-津 交通");
        mem.add_keywords(&["京津", "交通"]);
        mem.add_query("how about it");
        let text = mem.all_queries();
        // 7 tokens -> top_k 4
        let kws = extractor("上海 天气 京津 交通 how about it")
            .get_keywords(&text, Some(&mut mem))
            .await;
        assert_eq!(kws, vec!["上海", "天气", "京津", "交通"]);
        assert!(mem.contains_keyword("上海"));
        assert!(mem.contains_keyword("京津"));
        assert_eq!(mem.all_queries(), "上海 天气\n京-津 交通\nhow about it");
    }

    #[tokio::test]
    async fn test_last_sentence_without_proper_noun_keeps_memory() {
        let mut mem = SessionMemory::default();
        mem.add_query("北京的景点");
        mem.add_keywords(&["北京", "景点"]);
        mem.add_query("ticket price");
        let text = mem.all_queries();
        // 4 tokens -> top_k 3 -> price is cut
        let kws = extractor("ticket 北京 景点 price")
            .get_keywords(&text, Some(&mut mem))
            .await;
        assert_eq!(kws, vec!["北京", "景点", "ticket"]);
        assert_eq!(mem.len(), 2);
        assert!(mem.contains_keyword("北京"));
    }

    #[tokio::test]
    async fn test_missing_keyword_is_purged_when_new_entity_arrives() {
        let mut mem = SessionMemory::default();
        mem.add_query("马克·吐温的书");
        mem.add_keywords(&["马克吐温", "书"]);
        mem.add_query("上海呢");
        let text = mem.all_queries();
        let kws = extractor("马克吐温 书 上海")
            .get_keywords(&text, Some(&mut mem))
            .await;
        assert_eq!(kws, vec!["上海", "马克吐温", "书"]);
        assert!(!mem.contains_keyword("马克吐温"));
        assert_eq!(mem.all_queries(), "上海呢");
    }

    #[tokio::test]
    async fn test_injected_predicate() {
        let text = "Rust and Tokio";
        let kws = extractor("and Rust Tokio")
            .with_predicate(Arc::new(|w: &str| w.chars().next().is_some_and(char::is_uppercase)))
            .get_keywords(text, None)
            .await;
        assert_eq!(kws, vec!["Rust", "Tokio", "and"]);
    }

    #[tokio::test]
    async fn test_tokenizer_failure_falls_back() {
        let ex = KeywordExtractor::new(Arc::new(Failing));
        let kws = ex.get_keywords("rust, async runtime!", None).await;
        assert_eq!(kws, vec!["rust", "async", "runtime"]);
    }

    #[tokio::test]
    async fn test_punctuation_tokens_dropped() {
        let kws = extractor("上海 ， 。 天气").get_keywords("上海，天气。", None).await;
        assert_eq!(kws, vec!["上海", "天气"]);
    }

    #[tokio::test]
    async fn test_all_terms() {
        let terms = extractor("a b a c").all_terms("ignored").await;
        assert_eq!(terms, vec!["a", "b", "c"]);
    }
}
