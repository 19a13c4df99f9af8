// analyzer.rs — Content analyzer boundary.
//
// The analyzer itself lives outside this engine. We only define the
// request/response shape, the async trait the engine calls through, and an
// HTTP client for analyzers exposed as a JSON endpoint.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AnalyzerConfig;
use crate::error::CollaboratorError;

/// Per-request hints passed to the analyzer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

/// Toxicity verdict with per-category scores in `[0, 1]`.
///
/// Category keys follow the common moderation taxonomy:
/// `harassment`, `harassment/threatening`, `hate`, `hate/threatening`,
/// `violence`, `violence/graphic`, `sexual`, `sexual/minors`,
/// `self-harm`, `self-harm/intent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Toxicity {
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub category_scores: BTreeMap<String, f64>,
}

impl Toxicity {
    /// Highest category score, or 0 when there are no categories.
    pub fn max_score(&self) -> f64 {
        self.category_scores.values().copied().fold(0.0, f64::max)
    }

    /// The category with the highest score.
    pub fn max_category(&self) -> Option<(&str, f64)> {
        self.category_scores
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(name, score)| (name.as_str(), *score))
    }

    pub fn score(&self, category: &str) -> f64 {
        self.category_scores.get(category).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    /// -1 (negative) to 1 (positive).
    #[serde(default)]
    pub score: f64,
}

/// Everything the analyzer reports about one piece of content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub toxicity: Toxicity,
    #[serde(default)]
    pub spam: bool,
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub profanity: bool,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
}

/// The external content analyzer.
#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        content: &str,
        user_id: &str,
        options: &AnalyzeOptions,
    ) -> Result<AnalysisResult, CollaboratorError>;
}

/// Stand-in used when no analyzer is configured: every call fails, so
/// every `ai.*` field resolves to Unresolved.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAnalyzer;

#[async_trait]
impl ContentAnalyzer for NoAnalyzer {
    async fn analyze(
        &self,
        _content: &str,
        _user_id: &str,
        _options: &AnalyzeOptions,
    ) -> Result<AnalysisResult, CollaboratorError> {
        Err(CollaboratorError::Unavailable(
            "no content analyzer configured".to_string(),
        ))
    }
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    content: &'a str,
    user_id: &'a str,
    options: &'a AnalyzeOptions,
}

/// Calls an analyzer exposed as `POST <endpoint>` taking and returning JSON.
pub struct HttpContentAnalyzer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpContentAnalyzer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Build from config; `None` when no endpoint is set.
    pub fn from_config(config: &AnalyzerConfig) -> Result<Option<Self>, CollaboratorError> {
        config
            .endpoint
            .as_ref()
            .map(|endpoint| Self::new(endpoint.clone(), Duration::from_millis(config.timeout_ms)))
            .transpose()
    }
}

#[async_trait]
impl ContentAnalyzer for HttpContentAnalyzer {
    async fn analyze(
        &self,
        content: &str,
        user_id: &str,
        options: &AnalyzeOptions,
    ) -> Result<AnalysisResult, CollaboratorError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&AnalyzeRequest {
                content,
                user_id,
                options,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<AnalysisResult>().await?)
    }
}
