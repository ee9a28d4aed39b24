//! Static vetting of submitted scripts.

mod analyzer;

pub use analyzer::{LARGE_SUBMISSION_CHARS, SecurityVerdict, analyze_code};
