use tantivy::query::{BooleanQuery, FuzzyTermQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::Term;

/// Typos tolerated for a query word: none below 5 characters, one below 9,
/// two from 9 on.
pub fn allowed_typos(word: &str) -> u8 {
    match word.chars().count() {
        0..=4 => 0,
        5..=8 => 1,
        _ => 2,
    }
}

/// Exact term OR'd with a fuzzy term sized by the word's typo budget. The
/// last word of a query also matches as a prefix.
fn word_query(field: Field, word: &str, is_last: bool) -> Box<dyn Query> {
    let term = Term::from_field_text(field, word);
    let exact: Box<dyn Query> = Box::new(TermQuery::new(term.clone(), IndexRecordOption::WithFreqs));
    let mut parts = vec![(Occur::Should, exact)];
    let distance = allowed_typos(word);
    if distance > 0 {
        let fuzzy: Box<dyn Query> = Box::new(FuzzyTermQuery::new(term.clone(), distance, true));
        parts.push((Occur::Should, fuzzy));
    }
    if is_last {
        let prefix: Box<dyn Query> = Box::new(FuzzyTermQuery::new_prefix(term, 0, true));
        parts.push((Occur::Should, prefix));
    }
    Box::new(BooleanQuery::new(parts))
}

/// Documents matching at least one of `words`.
pub fn typo_tolerant_query(field: Field, words: &[String]) -> Box<dyn Query> {
    let last = words.len().saturating_sub(1);
    let clauses = words.iter().enumerate().map(|(i, w)| (Occur::Should, word_query(field, w, i == last))).collect();
    Box::new(BooleanQuery::new(clauses))
}
