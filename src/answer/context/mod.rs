
use crate::database::RetrievedMatch;

/// Rendered in place of an empty context
pub const NO_INFORMATION: &str = "لا توجد معلومات متاحة في قاعدة البيانات حول هذا السؤال.";

const DIVIDER: &str = "\n\n---\n\n";
const UNSPECIFIED: &str = "غير محدد";

/// Render matches as numbered source blocks for the answer prompt
#[inline]
pub fn format_context(matches: &[RetrievedMatch]) -> String {
    if matches.is_empty() {
        return NO_INFORMATION.to_string();
    }

    matches
        .iter()
        .enumerate()
        .map(|(index, m)| format_block(index + 1, m))
        .collect::<Vec<_>>()
        .join(DIVIDER)
}

fn format_block(position: usize, m: &RetrievedMatch) -> String {
    let field = |value: &Option<String>| value.as_deref().unwrap_or(UNSPECIFIED).to_string();

    format!(
        "[المصدر {}] (نسبة التطابق: {}%)\nالبرنامج: {}\nالمؤسسة: {}\nالرمز: {}\n\n{}",
        position,
        similarity_percent(m.similarity),
        field(&m.metadata.program_name),
        field(&m.metadata.institution),
        field(&m.metadata.program_code),
        m.content.trim()
    )
}

/// `round(similarity * 100)`
#[inline]
pub fn similarity_percent(similarity: f32) -> i64 {
    (f64::from(similarity) * 100.0).round() as i64
}
