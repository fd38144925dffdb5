use super::*;
use crate::testing::{HashEmbedder, MemoryStore, program_metadata};

const ARCHITECTURE: &str = "اسم البرنامج: هندسة معمارية\nرمز البرنامج: BS140\nالمؤسسة التعليمية: جامعة ظفار";
const MEDICINE: &str = "اسم البرنامج: طب\nرمز البرنامج: SQ959\nالمؤسسة التعليمية: جامعة السلطان قابوس";

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.seed(
        "arch",
        ARCHITECTURE,
        program_metadata(Some("هندسة معمارية"), Some("BS140"), 0),
        HashEmbedder::vector(ARCHITECTURE),
    );
    store.seed(
        "med",
        MEDICINE,
        program_metadata(Some("طب"), Some("SQ959"), 1),
        HashEmbedder::vector(MEDICINE),
    );
    store.seed(
        "notes",
        "ملاحظات عامة حول التسجيل",
        program_metadata(None, None, 2),
        HashEmbedder::vector("ملاحظات عامة حول التسجيل"),
    );
    store
}

struct Fixture {
    store: MemoryStore,
    embedder: HashEmbedder,
    config: RetrievalConfig,
    analysis: QueryAnalysis,
    primary_query: String,
    primary_embedding: Vec<f32>,
}

impl Fixture {
    fn new(analysis: QueryAnalysis) -> Self {
        Self::with_store(seeded_store(), analysis)
    }

    fn with_store(store: MemoryStore, analysis: QueryAnalysis) -> Self {
        let primary_query = analysis
            .search_phrasings()
            .into_iter()
            .next()
            .expect("analysis has a phrasing");
        let primary_embedding = HashEmbedder::vector(&primary_query);
        Self {
            store,
            embedder: HashEmbedder::new(),
            config: RetrievalConfig::default(),
            analysis,
            primary_query,
            primary_embedding,
        }
    }

    fn context(&self) -> SearchContext<'_> {
        SearchContext {
            analysis: &self.analysis,
            primary_query: &self.primary_query,
            primary_embedding: &self.primary_embedding,
            store: &self.store,
            embedder: &self.embedder,
            config: &self.config,
        }
    }
}

fn analysis(query: &str) -> QueryAnalysis {
    QueryAnalysis {
        search_query: Some(query.to_string()),
        ..QueryAnalysis::default()
    }
}

#[test]
fn default_order_is_fixed() {
    let names: Vec<&str> = default_strategies().iter().map(|s| s.name()).collect();
    assert_eq!(
        names,
        vec![
            "multi-phrasing",
            "program-name",
            "program-code",
            "institution",
            "keyword-text",
            "diverse-sample",
        ]
    );
}

#[tokio::test]
async fn multi_phrasing_reuses_primary_embedding_and_caps_phrasings() {
    let mut query = analysis("شروط هندسة معمارية");
    query.search_queries = vec![
        "متطلبات القبول".to_string(),
        "BS140".to_string(),
        "رابع".to_string(),
    ];
    let fixture = Fixture::new(query);

    let matches = MultiPhrasing
        .propose(&fixture.context())
        .await
        .expect("search succeeds");

    assert_eq!(
        fixture.store.hybrid_queries(),
        vec!["شروط هندسة معمارية", "متطلبات القبول", "BS140"]
    );
    assert_eq!(fixture.embedder.calls(), vec!["متطلبات القبول", "BS140"]);
    assert!(matches.iter().any(|m| m.id == "arch"));
}

#[tokio::test]
async fn multi_phrasing_skips_failed_phrasings() {
    let mut query = analysis("هندسة معمارية");
    query.search_queries = vec!["طب".to_string()];
    let fixture = Fixture::with_store(seeded_store().failing_hybrid_query("طب"), query);

    let matches = MultiPhrasing
        .propose(&fixture.context())
        .await
        .expect("failed phrasing is not fatal");

    assert!(matches.iter().any(|m| m.id == "arch"));
}

#[tokio::test]
async fn program_name_is_skipped_when_it_is_the_primary_query() {
    let mut query = analysis("هندسة معمارية");
    query.program = Some("هندسة معمارية".to_string());
    let fixture = Fixture::new(query);

    assert!(!ProgramName.applies(&fixture.context(), 0));
}

#[tokio::test]
async fn program_name_searches_the_name_alone() {
    let mut query = analysis("ما شروط القبول؟");
    query.program = Some("طب".to_string());
    let fixture = Fixture::new(query);

    assert!(ProgramName.applies(&fixture.context(), 20));
    ProgramName
        .propose(&fixture.context())
        .await
        .expect("search succeeds");

    assert_eq!(fixture.store.hybrid_queries(), vec!["طب"]);
}

#[tokio::test]
async fn code_search_uses_code_limits() {
    let mut query = analysis("ما شروط القبول؟");
    query.code = Some("SQ959".to_string());
    let mut fixture = Fixture::new(query);
    fixture.config.code_limit = 1;

    let matches = ProgramCode
        .propose(&fixture.context())
        .await
        .expect("search succeeds");

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, "med");
}

#[tokio::test]
async fn code_strategy_needs_a_code() {
    let fixture = Fixture::new(analysis("سؤال"));
    assert!(!ProgramCode.applies(&fixture.context(), 0));
}

#[tokio::test]
async fn institution_runs_only_while_matches_are_scarce() {
    let mut query = analysis("سؤال");
    query.university = Some("جامعة ظفار".to_string());
    let fixture = Fixture::new(query);
    let context = fixture.context();

    assert!(Institution.applies(&context, 4));
    assert!(!Institution.applies(&context, 5));
}

#[tokio::test]
async fn keyword_matches_carry_fixed_score() {
    let mut query = analysis("سؤال");
    query.keywords = vec!["SQ959".to_string()];
    query.program = Some("طب".to_string());
    let fixture = Fixture::new(query);

    assert!(KeywordText.applies(&fixture.context(), 0));
    let matches = KeywordText
        .propose(&fixture.context())
        .await
        .expect("search succeeds");

    assert_eq!(fixture.store.text_searches(), vec![vec!["SQ959", "طب"]]);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, "med");
    assert!((matches[0].similarity - fixture.config.keyword_score).abs() < f32::EPSILON);
}

#[tokio::test]
async fn keyword_strategy_needs_terms() {
    let fixture = Fixture::new(analysis("سؤال"));
    assert!(!KeywordText.applies(&fixture.context(), 0));
}

#[tokio::test]
async fn sample_only_for_general_questions_with_few_matches() {
    let mut query = analysis("ما هي البرامج المتاحة؟");
    let fixture = Fixture::new(query.clone());
    assert!(!DiverseSample.applies(&fixture.context(), 0));

    query.is_general_question = true;
    let fixture = Fixture::new(query);
    assert!(DiverseSample.applies(&fixture.context(), 2));
    assert!(!DiverseSample.applies(&fixture.context(), 3));

    let matches = DiverseSample
        .propose(&fixture.context())
        .await
        .expect("sample succeeds");

    let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["arch", "med"]);
    assert!(
        matches
            .iter()
            .all(|m| (m.similarity - fixture.config.sample_score).abs() < f32::EPSILON)
    );
}
