//! Analysis collaborator: turns intake text and answers into candidate
//! findings and follow-up questions.
//!
//! The engine calls the collaborator before opening a snapshot and treats
//! the response as the snapshot's input. Calls are never retried.

#[cfg(feature = "anthropic")]
mod anthropic;

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicAnalysisClient;

use async_trait::async_trait;
use rcaflow_model::{Confidence, FollowupQuestion, Priority, Record};
use serde::{Deserialize, Serialize};

/// Error type for analysis client operations.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// No analysis backend is configured.
    #[error("analysis service unavailable: {0}")]
    Unavailable(String),
    /// Network or HTTP error.
    #[error("analysis network error: {0}")]
    Network(String),
    /// The service answered with an error status.
    #[error("analysis API error ({status}): {message}")]
    Api { status: u16, message: String },
    /// The response could not be parsed.
    #[error("analysis parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnsweredQuestion {
    pub question: String,
    pub answer: String,
}

/// Everything the collaborator sees about a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub title: String,
    pub failure_description: String,
    pub impact: Option<String>,
    pub supporting_notes: Option<String>,
    pub answered_questions: Vec<AnsweredQuestion>,
    /// Questions already asked, so the service does not repeat them.
    pub open_questions: Vec<String>,
}

impl AnalysisRequest {
    pub fn for_record(record: &Record, questions: &[FollowupQuestion]) -> Self {
        let mut answered_questions = Vec::new();
        let mut open_questions = Vec::new();
        for q in questions {
            match &q.answer_text {
                Some(answer) => answered_questions.push(AnsweredQuestion {
                    question: q.question_text.clone(),
                    answer: answer.clone(),
                }),
                None => open_questions.push(q.question_text.clone()),
            }
        }
        Self {
            title: record.title.clone(),
            failure_description: record.failure_description.clone(),
            impact: record.impact.clone(),
            supporting_notes: record.supporting_notes.clone(),
            answered_questions,
            open_questions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedRootCause {
    pub cause_text: String,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedActionItem {
    pub action_text: String,
    pub priority: Priority,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub success_criteria: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default)]
    pub root_causes: Vec<SuggestedRootCause>,
    #[serde(default)]
    pub action_items: Vec<SuggestedActionItem>,
    #[serde(default)]
    pub questions: Vec<String>,
    /// False when the new evidence does not change the analysis.
    #[serde(default = "default_material_change")]
    pub material_change: bool,
}

fn default_material_change() -> bool {
    true
}

impl AnalysisResponse {
    /// A response reporting nothing new.
    pub fn no_material_change() -> Self {
        Self {
            root_causes: Vec::new(),
            action_items: Vec::new(),
            questions: Vec::new(),
            material_change: false,
        }
    }
}

/// Trait for calling the analysis service.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError>;
}

/// Client used when no service is configured. Every call fails, so AI-guided
/// starts and re-analysis surface as internal errors while the manual
/// workflow keeps working.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAnalysis;

#[async_trait]
impl AnalysisClient for DisabledAnalysis {
    async fn analyze(&self, _request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        Err(AnalysisError::Unavailable(
            "no analysis provider configured".to_string(),
        ))
    }
}

/// Strip markdown code fences from a model response.
pub(crate) fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();

    if let Some(stripped) = trimmed.strip_prefix("```json") {
        if let Some(inner) = stripped.strip_suffix("```") {
            return inner.trim();
        }
    }
    if let Some(stripped) = trimmed.strip_prefix("```") {
        if let Some(inner) = stripped.strip_suffix("```") {
            return inner.trim();
        }
    }

    trimmed
}

/// Parse a model's text reply into a response.
pub fn parse_response(text: &str) -> Result<AnalysisResponse, AnalysisError> {
    serde_json::from_str(strip_code_fences(text))
        .map_err(|e| AnalysisError::Parse(format!("invalid analysis JSON: {e}")))
}
