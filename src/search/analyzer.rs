//! Language-specific text analysis.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};

use crate::error::SearchError;

/// Splits queries into words; tags like `status/draft` become two words.
static WORD_SPLITTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}0-9]+").expect("valid regex"));

/// FTS5 tokenizer shared by all languages: Unicode aware, case and
/// diacritics folding, so `Diversität` matches `diversitat`. Stemming is
/// language specific and happens before text reaches the index, see
/// [`Language::stems`].
pub const TOKENIZER: &str = "unicode61 remove_diacritics 2";

const STOPWORDS_EN: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

const STOPWORDS_DE: &[&str] = &[
    "aber", "als", "am", "an", "auch", "auf", "aus", "bei", "bin", "bis", "das", "dass", "dem",
    "den", "der", "des", "die", "doch", "du", "ein", "eine", "einem", "einen", "einer", "eines",
    "er", "es", "für", "hat", "ich", "im", "in", "ist", "mit", "nach", "nicht", "noch", "oder",
    "sie", "sind", "so", "und", "vom", "von", "vor", "war", "wie", "wir", "zu", "zum", "zur",
];

/// A supported analysis language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    German,
}

impl FromStr for Language {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en" => Ok(Self::English),
            "de" => Ok(Self::German),
            other => Err(SearchError::Language(other.to_string())),
        }
    }
}

impl Language {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::German => "de",
        }
    }

    #[must_use]
    pub fn is_stopword(self, word: &str) -> bool {
        let list = match self {
            Self::English => STOPWORDS_EN,
            Self::German => STOPWORDS_DE,
        };
        list.contains(&word)
    }

    /// Lowercased words of a query, stopwords removed.
    #[must_use]
    pub fn terms(self, query: &str) -> Vec<String> {
        words(query)
            .into_iter()
            .filter(|w| !self.is_stopword(w))
            .collect()
    }

    fn stemmer(self) -> Stemmer {
        Stemmer::create(match self {
            Self::English => Algorithm::English,
            Self::German => Algorithm::German,
        })
    }

    /// Folded stem of a single lowercased word.
    #[must_use]
    pub fn stem(self, word: &str) -> String {
        fold(&self.stemmer().stem(word))
    }

    /// Stems of all non-stopword words in `text`, space separated, so
    /// `running` and `runs` both index as `run`.
    #[must_use]
    pub fn stems(self, text: &str) -> String {
        let stemmer = self.stemmer();
        self.terms(text)
            .iter()
            .map(|w| fold(&stemmer.stem(w)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Lowercased words of a query, split on anything that is neither a
/// letter nor a digit.
#[must_use]
pub fn words(query: &str) -> Vec<String> {
    WORD_SPLITTER
        .split(&query.to_lowercase())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fold a word the way the index tokenizer does, for comparing against
/// indexed terms.
#[must_use]
pub fn fold(word: &str) -> String {
    deunicode::deunicode(word).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_languages() {
        assert_eq!("en".parse::<Language>().unwrap(), Language::English);
        assert_eq!("de".parse::<Language>().unwrap(), Language::German);
        assert!(matches!("fr".parse::<Language>(), Err(SearchError::Language(l)) if l == "fr"));
    }

    #[test]
    fn test_words() {
        assert_eq!(words("status/draft"), vec!["status", "draft"]);
        assert_eq!(words("  Needs   Images "), vec!["needs", "images"]);
        assert_eq!(words("Diversität"), vec!["diversität"]);
        assert!(words(" / ").is_empty());
    }

    #[test]
    fn test_stopwords() {
        assert!(Language::English.terms("the").is_empty());
        assert_eq!(Language::English.terms("The Diversity"), vec!["diversity"]);
        assert_eq!(Language::German.terms("die Farben und Formen"), vec!["farben", "formen"]);
    }

    #[test]
    fn test_stems() {
        assert_eq!(Language::English.stem("running"), "run");
        assert_eq!(Language::English.stem("runs"), "run");
        assert_eq!(Language::English.stems("The spinner keeps running"), "spinner keep run");
        assert_eq!(Language::German.stem("häuser"), Language::German.stem("haus"));
        assert_eq!(Language::German.stems("die Farben"), Language::German.stem("farben"));
    }

    #[test]
    fn test_fold() {
        assert_eq!(fold("Diversität"), "diversitat");
    }
}
