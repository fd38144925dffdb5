use super::*;

#[test]
fn query_tokens_split_on_punctuation() {
    assert_eq!(
        query_tokens("ما هي شروط BS140؟"),
        vec!["ما".to_string(), "هي".to_string(), "شروط".to_string(), "bs140".to_string()]
    );
}

#[test]
fn query_tokens_drop_single_characters_and_duplicates() {
    assert_eq!(query_tokens("a طب و طب"), vec!["طب".to_string()]);
}

#[test]
fn token_overlap_counts_fraction_of_hits() {
    let tokens = query_tokens("شروط BS140 هندسة");

    let overlap = token_overlap("رمز البرنامج: BS140 هندسة معمارية", &tokens);

    assert!((overlap - 2.0 / 3.0).abs() < 1e-6);
    assert_eq!(token_overlap("anything", &[]), 0.0);
}

#[test]
fn cosine_similarity_handles_degenerate_vectors() {
    assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
}

#[test]
fn hybrid_score_blends_signals() {
    assert!((hybrid_score(1.0, 0.0, 0.3) - 0.7).abs() < 1e-6);
    assert!((hybrid_score(0.0, 1.0, 0.3) - 0.3).abs() < 1e-6);
}
