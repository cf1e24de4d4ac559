//! Text tokenizer: lowercase, split on non-alphanumeric boundaries, drop stop
//! words, optionally stem.

use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

pub struct Tokenizer {
    stop_words: HashSet<String>,
    stemmer: Stemmer,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("stop_words", &self.stop_words.len())
            .finish()
    }
}

impl Tokenizer {
    pub fn new<I, S>(stop_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            stop_words: stop_words
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .collect(),
            stemmer: Stemmer::create(Algorithm::English),
        }
    }

    pub fn is_stop_word(&self, token: &str) -> bool {
        self.stop_words.contains(token)
    }

    /// Tokenize a text value. Order and duplicates are preserved.
    pub fn tokenize(&self, text: &str, stem: bool) -> Vec<String> {
        self.tokens(text, stem).into_iter().map(|(_, term)| term).collect()
    }

    /// Like `tokenize`, pairing each indexed term with the lowercased word it came from.
    pub fn tokens(&self, text: &str, stem: bool) -> Vec<(String, String)> {
        let lowered = text.to_lowercase();
        let mut out = Vec::new();
        for word in lowered.unicode_words() {
            // unicode_words keeps apostrophes and similar joiners inside words.
            for piece in word.split(|c: char| !c.is_alphanumeric()) {
                if piece.is_empty() || self.stop_words.contains(piece) {
                    continue;
                }
                out.push((piece.to_string(), self.normalize(piece, stem)));
            }
        }
        out
    }

    /// Normalize a single query term the same way indexed tokens are.
    pub fn normalize(&self, term: &str, stem: bool) -> String {
        let lowered = term.to_lowercase();
        if stem {
            self.stemmer.stem(&lowered).into_owned()
        } else {
            lowered
        }
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_STOP_WORDS.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lowercases_and_splits() {
        let t = Tokenizer::new(Vec::<String>::new());
        assert_eq!(
            t.tokenize("Noise-Cancelling HEADPHONES, v2.0!", false),
            vec!["noise", "cancelling", "headphones", "v2", "0"]
        );
    }

    #[test]
    fn test_drops_stop_words() {
        let t = Tokenizer::default();
        let tokens = t.tokenize("The quick brown fox and the lazy dog", false);
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.contains(&"and".to_string()));
        assert!(tokens.contains(&"quick".to_string()));
    }

    #[test]
    fn test_stemming_is_optional() {
        let t = Tokenizer::default();
        assert_eq!(t.tokenize("running shoes", true), vec!["run", "shoe"]);
        assert_eq!(t.tokenize("running shoes", false), vec!["running", "shoes"]);
        assert_eq!(
            t.tokens("Running", true),
            vec![("running".to_string(), "run".to_string())]
        );
        assert_eq!(t.normalize("Shoes", true), "shoe");
    }

    #[test]
    fn test_apostrophes_split() {
        let t = Tokenizer::new(Vec::<String>::new());
        assert_eq!(t.tokenize("don't", false), vec!["don", "t"]);
    }

    proptest! {
        #[test]
        fn prop_tokens_are_nonempty_alphanumeric(text in "\\PC{0,64}") {
            let t = Tokenizer::default();
            for token in t.tokenize(&text, false) {
                prop_assert!(!token.is_empty());
                prop_assert!(token.chars().all(char::is_alphanumeric));
            }
        }
    }
}
