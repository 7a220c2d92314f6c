//! Turns the collector's raw rows into one URL-free document per post.

use crate::error::Result;
use crate::table;
use crate::types::{CleanedDocument, RawRow};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

/// Links, bare `www.` hosts and image file names
const URL_PATTERN: &str = r"http\S+|www\.\S+|https?://\S+|\S+\.(jpg|jpeg|png|gif|webp)";

fn url_regex() -> &'static Regex {
    static URL_RE: OnceLock<Regex> = OnceLock::new();
    URL_RE.get_or_init(|| Regex::new(URL_PATTERN).expect("URL pattern is valid"))
}

/// Remove URL-like substrings, leaving the surrounding text untouched
pub fn remove_urls(text: &str) -> String {
    url_regex().replace_all(text, "").into_owned()
}

/// Group rows by post id and join their stripped text with single spaces.
///
/// Rows keep their input order within a post. Documents come out in
/// ascending post id order. Empty texts still take part in the join.
pub fn clean(rows: &[RawRow]) -> Vec<CleanedDocument> {
    let mut groups: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for row in rows {
        groups
            .entry(row.post_id.as_str())
            .or_default()
            .push(remove_urls(&row.text));
    }

    groups
        .into_iter()
        .map(|(post_id, texts)| CleanedDocument::new(post_id, texts.join(" ")))
        .collect()
}

/// Read a raw table, clean it, and write the cleaned table
pub fn clean_table(input: &Path, output: &Path) -> Result<Vec<CleanedDocument>> {
    let rows = table::read_raw_rows(input)?;
    let documents = clean(&rows);
    table::write_cleaned(output, &documents)?;

    info!(
        rows = rows.len(),
        documents = documents.len(),
        output = %output.display(),
        "cleaned raw table"
    );
    Ok(documents)
}
