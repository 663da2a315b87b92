//! PII redaction applied to CV text before it leaves the service.
//!
//! Redaction is deliberately regex-based and conservative about what it touches:
//! a missed phone number is a privacy bug, but a redacted date range or metric
//! silently lowers a candidate's score.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}\b").unwrap()
});

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bhttps?://|\bwww\.|\b(?:linkedin|github)\.com/)[^\s<>()\[\]]+").unwrap()
});

static DATE_OF_BIRTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:date\s+of\s+birth|d\.?o\.?b\.?|born(?:\s+on)?)\s*[:\-]?\s*(?:\d{1,2}[./-]\d{1,2}[./-]\d{2,4}|\d{4}-\d{2}-\d{2}|\d{1,2}\s+[a-z]+\.?\s+\d{4}|[a-z]+\.?\s+\d{1,2},?\s+\d{4}|\d{4})",
    )
    .unwrap()
});

static AGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:age|aged)\s*[:\-]?\s*\d{1,2}\b|\b\d{1,2}\s*(?:years?|yrs?)[\s-]*old\b")
        .unwrap()
});

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,3}[ .-]?)?(?:\(\d{1,4}\)[ .-]?|\b)\d(?:[ .-]?\d){6,14}\b").unwrap()
});

static YEAR_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:19|20)\d{2}\s*[-.]\s*(?:19|20)\d{2}$").unwrap());

static NUMERIC_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}[./-]\d{1,2}[./-]\d{2,4}$").unwrap());

/// Year-first dates: 2019-03-12, 2015.06.30, 2020/1/7.
static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:19|20)\d{2}[./-]\d{1,2}[./-]\d{1,2}$").unwrap());

/// Consecutive years such as "2018 2019 2020".
static YEAR_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:19|20)\d{2}(?:[ .-]?(?:19|20)\d{2})+$").unwrap());

static ADDRESS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:home\s+|postal\s+|mailing\s+)?(?:address|adresse)[ \t]*:[^\n]*")
        .unwrap()
});

static STREET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b\d{1,5}[A-Za-z]?,?\s+(?:[A-Z][A-Za-z'.-]*\s+){1,4}(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct|Way|Place|Pl|Terrace|Close|Crescent|Square|Sq)\b\.?",
    )
    .unwrap()
});

static STREET_PREFIXED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d{1,5},?\s+(?:rue|avenue|boulevard|bd|chemin|impasse|calle|via)\s+[^\n,]{2,40}")
        .unwrap()
});

static GENDER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:gender|sex)[ \t]*:[^\n]*").unwrap()
});

static HONORIFIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:Mr|Mrs|Ms|Miss)\.?\s+([A-Z])").unwrap());

static PRONOUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:he|she|him|his|her|hers|himself|herself)\b").unwrap()
});

/// How many spans of each category were redacted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RedactionCounts {
    pub emails: usize,
    pub urls: usize,
    pub dates_of_birth: usize,
    pub ages: usize,
    pub phones: usize,
    pub addresses: usize,
    pub gender_markers: usize,
}

impl RedactionCounts {
    pub fn total(&self) -> usize {
        self.emails
            + self.urls
            + self.dates_of_birth
            + self.ages
            + self.phones
            + self.addresses
            + self.gender_markers
    }
}

#[derive(Debug, Clone)]
pub struct Anonymized {
    pub text: String,
    pub redactions: RedactionCounts,
}

/// Redacts contact details, age, address and gender markers from CV text.
pub fn anonymize(text: &str) -> Anonymized {
    let mut counts = RedactionCounts::default();

    let text = replace_all_counting(&EMAIL, text, &mut counts.emails, |_| {
        Some("[EMAIL]".into())
    });
    let text = replace_all_counting(&URL, &text, &mut counts.urls, |_| Some("[URL]".into()));
    let text = replace_all_counting(&DATE_OF_BIRTH, &text, &mut counts.dates_of_birth, |_| {
        Some("[DOB]".into())
    });
    let text = replace_all_counting(&AGE, &text, &mut counts.ages, |_| Some("[AGE]".into()));
    let text = replace_all_counting(&PHONE, &text, &mut counts.phones, |caps| {
        is_phone_number(&caps[0]).then(|| "[PHONE]".into())
    });
    let text = replace_all_counting(&ADDRESS_LINE, &text, &mut counts.addresses, |_| {
        Some("[ADDRESS]".into())
    });
    let text = replace_all_counting(&STREET, &text, &mut counts.addresses, |_| {
        Some("[ADDRESS]".into())
    });
    let text = replace_all_counting(&STREET_PREFIXED, &text, &mut counts.addresses, |_| {
        Some("[ADDRESS]".into())
    });
    let text = replace_all_counting(&GENDER_LINE, &text, &mut counts.gender_markers, |_| {
        Some("[GENDER]".into())
    });
    let text = replace_all_counting(&HONORIFIC, &text, &mut counts.gender_markers, |caps| {
        Some(caps[1].to_string())
    });
    let text = replace_all_counting(&PRONOUN, &text, &mut counts.gender_markers, |caps| {
        Some(neutral_pronoun(&caps[0]))
    });

    Anonymized {
        text,
        redactions: counts,
    }
}

/// Runs `re` over `text`, replacing each match with `f`'s output.
/// `None` keeps the match as-is and is not counted.
fn replace_all_counting<F>(re: &Regex, text: &str, count: &mut usize, mut f: F) -> String
where
    F: FnMut(&Captures) -> Option<String>,
{
    re.replace_all(text, |caps: &Captures| match f(caps) {
        Some(replacement) => {
            *count += 1;
            replacement
        }
        None => caps[0].to_string(),
    })
    .into_owned()
}

fn is_phone_number(candidate: &str) -> bool {
    let digits = candidate.chars().filter(char::is_ascii_digit).count();
    if !(8..=15).contains(&digits) {
        return false;
    }
    let trimmed = candidate.trim();
    ![&YEAR_RANGE, &NUMERIC_DATE, &ISO_DATE, &YEAR_RUN]
        .iter()
        .any(|pattern| pattern.is_match(trimmed))
}

fn neutral_pronoun(word: &str) -> String {
    let neutral = match word.to_ascii_lowercase().as_str() {
        "he" | "she" => "they",
        "him" => "them",
        "his" | "her" => "their",
        "hers" => "theirs",
        _ => "themselves",
    };

    if word.len() > 1 && word.chars().all(|c| c.is_ascii_uppercase()) {
        neutral.to_ascii_uppercase()
    } else if word.starts_with(|c: char| c.is_ascii_uppercase()) {
        let mut chars = neutral.chars();
        match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => String::new(),
        }
    } else {
        neutral.to_string()
    }
}
