//! Decomposes a question into program, institution and code hints plus
//! alternate search phrasings, using the language model.


use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::embeddings::{LanguageModel, Prompt};

const ANALYSIS_INSTRUCTIONS: &str = "\
أنت محلل أسئلة لنظام القبول الموحد في مؤسسات التعليم العالي.
حلل سؤال المستخدم وأعد كائن JSON فقط دون أي نص إضافي، بالمفاتيح التالية:
- \"program\": اسم البرنامج الدراسي المذكور في السؤال أو null
- \"university\": اسم الجامعة أو المؤسسة التعليمية أو null
- \"code\": رمز البرنامج مثل BS140 أو null
- \"search_query\": أفضل صياغة واحدة للبحث
- \"search_queries\": قائمة من صياغتين إلى ثلاث صياغات بديلة للبحث
- \"is_general_question\": true إذا كان السؤال عاماً لا يخص برنامجاً بعينه
- \"keywords\": قائمة بالكلمات المفتاحية المهمة في السؤال";

/// Structured reading of one question
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryAnalysis {
    pub program: Option<String>,
    pub university: Option<String>,
    pub code: Option<String>,
    pub search_query: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub search_queries: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub is_general_question: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub keywords: Vec<String>,
}

/// Models write `null` for fields they have nothing to say about
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl QueryAnalysis {
    /// Raw-text analysis used when the model output is unusable
    #[inline]
    pub fn fallback(question: &str) -> Self {
        Self {
            search_query: Some(question.to_string()),
            is_general_question: true,
            keywords: question
                .split_whitespace()
                .filter(|word| word.chars().count() > 2)
                .map(str::to_string)
                .collect(),
            ..Self::default()
        }
    }

    /// Search strings in priority order: the single best query first, then
    /// the alternates. Blank and repeated entries are dropped.
    #[inline]
    pub fn search_phrasings(&self) -> Vec<String> {
        self.search_query
            .iter()
            .chain(&self.search_queries)
            .map(|phrasing| phrasing.trim())
            .filter(|phrasing| !phrasing.is_empty())
            .unique()
            .map(str::to_string)
            .collect()
    }

    /// Blank strings become `None`/dropped and the question is used when no
    /// phrasing survives
    fn normalized(mut self, question: &str) -> Self {
        let clean = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        self.program = clean(self.program);
        self.university = clean(self.university);
        self.code = clean(self.code);
        self.search_query = clean(self.search_query);
        self.keywords.retain(|k| !k.trim().is_empty());

        if self.search_phrasings().is_empty() {
            self.search_query = Some(question.to_string());
        }
        self
    }
}

pub struct QueryAnalyzer {
    model: Arc<dyn LanguageModel>,
}

impl QueryAnalyzer {
    #[inline]
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Never fails: model or parse errors degrade to [`QueryAnalysis::fallback`]
    #[inline]
    pub async fn analyze(&self, question: &str) -> QueryAnalysis {
        let prompt = Prompt::new(question).with_system(ANALYSIS_INSTRUCTIONS);

        match self.model.complete(&prompt).await {
            Ok(raw) => parse_analysis(&raw, question),
            Err(e) => {
                warn!("Query analysis failed, searching with the raw question: {:#}", e);
                QueryAnalysis::fallback(question)
            }
        }
    }
}

/// Parse model output into an analysis, tolerating code fences and chatter
/// around the JSON object
#[inline]
pub fn parse_analysis(raw: &str, question: &str) -> QueryAnalysis {
    let unfenced = strip_code_fence(raw);

    let parsed = serde_json::from_str::<QueryAnalysis>(unfenced).or_else(|first_error| {
        outermost_object(unfenced)
            .ok_or(first_error)
            .and_then(serde_json::from_str::<QueryAnalysis>)
    });

    match parsed {
        Ok(analysis) => {
            debug!("Query analysis: {:?}", analysis);
            analysis.normalized(question)
        }
        Err(e) => {
            warn!("Unparseable query analysis, searching with the raw question: {}", e);
            QueryAnalysis::fallback(question)
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the language tag on the opening fence line
    let body = rest.split_once('\n').map_or(rest, |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    text.get(start..=end)
}
