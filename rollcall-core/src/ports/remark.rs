//! Remark port - text generation for member performance remarks

/// Remark text, with the reason when it is a fallback sentence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedRemark {
    pub text: String,
    /// Never carries the member's name
    pub failure: Option<String>,
}

impl GeneratedRemark {
    pub fn generated(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            failure: None,
        }
    }

    pub fn fallback(text: impl Into<String>, failure: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            failure: Some(failure.into()),
        }
    }
}

/// Generates a short remark for a member from an attendance summary.
///
/// Implementations never fail: problems are reported as a fixed
/// fallback sentence in place of the remark.
pub trait RemarkGenerator: Send + Sync {
    fn generate(&self, member_name: &str, summary: &str) -> GeneratedRemark;
}
