// LanceDB vector database module
// Stores chunk vectors with their metadata columns and serves hybrid search


pub mod vector_store;

use itertools::Itertools;

pub use vector_store::VectorStore;

/// Build a filter matching rows whose content contains any of `terms`,
/// as written or lowercased. Returns `None` when no usable term remains.
pub(crate) fn contains_any_predicate(terms: &[String]) -> Option<String> {
    let clauses: Vec<String> = terms
        .iter()
        .flat_map(|term| {
            let term = sanitize_like_term(term);
            let lower = term.to_lowercase();
            [term, lower]
        })
        .filter(|term| !term.is_empty())
        .unique()
        .map(|term| format!("content LIKE '%{}%'", term))
        .collect();

    (!clauses.is_empty()).then(|| clauses.join(" OR "))
}

/// Quotes are doubled and wildcard characters dropped so the term only
/// matches literally
fn sanitize_like_term(term: &str) -> String {
    term.trim()
        .chars()
        .filter(|c| !matches!(c, '%' | '_' | '\\'))
        .collect::<String>()
        .replace('\'', "''")
}

/// Alphanumeric words of at least two characters in their original case
pub(crate) fn literal_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_string)
        .unique()
        .collect()
}
