//! Word frequencies over the cleaned corpus, the input of a word cloud.

use crate::types::CleanedDocument;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Common English function words
const STOP_WORDS_LIST: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and",
    "any", "are", "aren't", "as", "at", "be", "because", "been", "before", "being", "below",
    "between", "both", "but", "by", "can", "can't", "cannot", "com", "could", "couldn't",
    "did", "didn't", "do", "does", "doesn't", "doing", "don't", "down", "during", "each",
    "else", "ever", "few", "for", "from", "further", "get", "had", "hadn't", "has", "hasn't",
    "have", "haven't", "having", "he", "he'd", "he'll", "he's", "her", "here", "here's",
    "hers", "herself", "him", "himself", "his", "how", "how's", "however", "http", "i",
    "i'd", "i'll", "i'm", "i've", "if", "in", "into", "is", "isn't", "it", "it's", "its",
    "itself", "just", "k", "let's", "like", "me", "more", "most", "mustn't", "my", "myself",
    "no", "nor", "not", "of", "off", "on", "once", "only", "or", "other", "otherwise",
    "ought", "our", "ours", "ourselves", "out", "over", "own", "r", "same", "shall",
    "shan't", "she", "she'd", "she'll", "she's", "should", "shouldn't", "since", "so",
    "some", "such", "than", "that", "that's", "the", "their", "theirs", "them",
    "themselves", "then", "there", "there's", "therefore", "these", "they", "they'd",
    "they'll", "they're", "they've", "this", "those", "through", "to", "too", "under",
    "until", "up", "very", "was", "wasn't", "we", "we'd", "we'll", "we're", "we've", "were",
    "weren't", "what", "what's", "when", "when's", "where", "where's", "which", "while",
    "who", "who's", "whom", "why", "why's", "with", "won't", "would", "wouldn't", "www",
    "you", "you'd", "you'll", "you're", "you've", "your", "yours", "yourself", "yourselves",
];

/// Platform words that dominate every Reddit corpus
const PLATFORM_WORDS: &[&str] = &["subreddit", "reddit", "redditors"];

fn get_stop_words() -> &'static HashSet<String> {
    static STOP_WORDS: OnceLock<HashSet<String>> = OnceLock::new();
    STOP_WORDS.get_or_init(|| {
        STOP_WORDS_LIST
            .iter()
            .chain(PLATFORM_WORDS)
            .map(|s| s.to_string())
            .collect()
    })
}

fn word_regex() -> &'static Regex {
    static WORD_RE: OnceLock<Regex> = OnceLock::new();
    WORD_RE.get_or_init(|| Regex::new(r"\w[\w']+").expect("word pattern is valid"))
}

/// Lowercased words of two or more characters, stopwords removed
fn tokenize<'a>(text: &'a str, extra: &'a HashSet<String>) -> impl Iterator<Item = String> + 'a {
    let stop_words = get_stop_words();
    word_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(move |word| !stop_words.contains(word) && !extra.contains(word))
}

/// The `top` most frequent words across all documents.
///
/// Ties are broken alphabetically so the table is deterministic.
pub fn term_frequencies(
    documents: &[CleanedDocument],
    extra_stopwords: &[String],
    top: usize,
) -> Vec<(String, usize)> {
    let extra: HashSet<String> = extra_stopwords.iter().map(|w| w.to_lowercase()).collect();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for doc in documents {
        for word in tokenize(&doc.text, &extra) {
            *counts.entry(word).or_insert(0) += 1;
        }
    }

    let mut terms: Vec<(String, usize)> = counts.into_iter().collect();
    terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    terms.truncate(top);
    terms
}
