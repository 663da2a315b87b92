//! Document handling: PDF text extraction and PII redaction for uploaded CVs.

pub mod anonymize;
pub mod pdf;

pub use anonymize::anonymize;
pub use pdf::{excerpt, extract_text};
