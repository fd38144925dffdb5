//! Pattern-based field extraction for program records.
//!
//! Each field is matched against an ordered list of patterns. The first
//! capture that survives the field's sanity filter wins; when nothing
//! survives the field stays unset.

#[cfg(test)]
mod tests;

use std::sync::LazyLock;

use fancy_regex::Regex;
use tracing::debug;

/// Labels that introduce a field value, for every field we know about.
/// A captured value containing one of these followed by a colon has run
/// into a neighbouring field and is rejected.
const FIELD_LABELS: &[&str] = &[
    "اسم البرنامج",
    "رمز البرنامج",
    "كود البرنامج",
    "المؤسسة التعليمية",
    "المؤسسة",
    "الجامعة",
    "الكلية",
    "البرنامج",
    "الرمز",
    "program name",
    "program code",
    "program",
    "code",
    "institution",
    "university",
];

const MAX_TEXT_FIELD_CHARS: usize = 150;
const MAX_CODE_CHARS: usize = 20;

static FIELD_LABEL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = FIELD_LABELS.join("|");
    Regex::new(&format!(r"(?i)(?:{})\s*[:：]", alternatives)).expect("label pattern is valid")
});

static NAME_EXTRACTOR: LazyLock<FieldExtractor> = LazyLock::new(|| {
    FieldExtractor::new(
        "program_name",
        &[
            r"(?i)(?:اسم البرنامج|program name)\s*[:：]\s*([^\n/|]+)",
            r"(?i)(?:اسم البرنامج|program name)\s*[:：]\s*([^\n]+)",
            r"(?im)^[^\S\n]*(?:البرنامج|program)[^\S\n]*[:：][^\S\n]*([^\n/|]+)",
        ],
        is_plausible_text_value,
    )
});

static CODE_EXTRACTOR: LazyLock<FieldExtractor> = LazyLock::new(|| {
    FieldExtractor::new(
        "program_code",
        &[
            r"(?i)(?:رمز البرنامج|كود البرنامج|program code)\s*[:：]\s*([A-Za-z0-9][A-Za-z0-9_\-]*)",
            r"(?im)^[^\S\n]*(?:الرمز|code)[^\S\n]*[:：][^\S\n]*([A-Za-z0-9][A-Za-z0-9_\-]*)",
            r"\b([A-Z]{2,4}\d{3,4})\b",
        ],
        is_plausible_code,
    )
});

static INSTITUTION_EXTRACTOR: LazyLock<FieldExtractor> = LazyLock::new(|| {
    FieldExtractor::new(
        "institution",
        &[
            r"(?i)(?:المؤسسة التعليمية|institution|university)\s*[:：]\s*([^\n/|]+)",
            r"(?i)(?:المؤسسة التعليمية|institution|university)\s*[:：]\s*([^\n]+)",
            r"(?im)^[^\S\n]*(?:المؤسسة|الجامعة|الكلية)[^\S\n]*[:：][^\S\n]*([^\n/|]+)",
        ],
        is_plausible_text_value,
    )
});

/// Fields identifying a program record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramFields {
    pub name: Option<String>,
    pub code: Option<String>,
    pub institution: Option<String>,
}

impl ProgramFields {
    /// A record is usable once it has a name or a code
    #[inline]
    pub fn is_identified(&self) -> bool {
        self.name.is_some() || self.code.is_some()
    }

    /// Fill fields that are still unset from `other`
    #[inline]
    pub fn fill_from(&mut self, other: Self) {
        if self.name.is_none() {
            self.name = other.name;
        }
        if self.code.is_none() {
            self.code = other.code;
        }
        if self.institution.is_none() {
            self.institution = other.institution;
        }
    }
}

struct FieldExtractor {
    field: &'static str,
    patterns: Vec<Regex>,
    filter: fn(&str) -> bool,
}

impl FieldExtractor {
    fn new(field: &'static str, patterns: &[&str], filter: fn(&str) -> bool) -> Self {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p).expect("field pattern is valid"))
            .collect();
        Self {
            field,
            patterns,
            filter,
        }
    }

    fn extract(&self, text: &str) -> Option<String> {
        for pattern in &self.patterns {
            for captures in pattern.captures_iter(text) {
                let captures = match captures {
                    Ok(captures) => captures,
                    Err(e) => {
                        debug!("Pattern for {} failed to evaluate: {}", self.field, e);
                        break;
                    }
                };

                let Some(value) = captures.get(1).map(|m| clean_value(m.as_str())) else {
                    continue;
                };

                if (self.filter)(&value) {
                    return Some(value);
                }

                debug!("Rejected {} candidate: {:?}", self.field, value);
            }
        }

        None
    }
}

/// Extract name, code and institution from a block of text
#[inline]
pub fn extract_program_fields(text: &str) -> ProgramFields {
    ProgramFields {
        name: extract_program_name(text),
        code: extract_program_code(text),
        institution: extract_institution(text),
    }
}

#[inline]
pub fn extract_program_name(text: &str) -> Option<String> {
    NAME_EXTRACTOR.extract(text)
}

#[inline]
pub fn extract_program_code(text: &str) -> Option<String> {
    CODE_EXTRACTOR.extract(text)
}

#[inline]
pub fn extract_institution(text: &str) -> Option<String> {
    INSTITUTION_EXTRACTOR.extract(text)
}

/// Whether `value` carries the label of some field followed by a colon
#[inline]
pub fn contains_field_label(value: &str) -> bool {
    FIELD_LABEL_PATTERN.is_match(value).unwrap_or(false)
}

fn clean_value(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(['،', ',', '.', '؛', ';', '-', '–', ':'])
        .trim()
        .to_string()
}

fn is_plausible_text_value(value: &str) -> bool {
    let len = value.chars().count();
    (2..=MAX_TEXT_FIELD_CHARS).contains(&len) && !contains_field_label(value)
}

fn is_plausible_code(value: &str) -> bool {
    let len = value.chars().count();
    (2..=MAX_CODE_CHARS).contains(&len)
        && !value.chars().any(char::is_whitespace)
        && value.chars().any(|c| c.is_ascii_digit())
}
