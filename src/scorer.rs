//! Client for the external fraud-scoring service. The transport is hidden
//! behind the `Scorer` trait so handlers and tests can swap in fakes.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use utoipa::ToSchema;

use crate::models::{RiskLevel, Verdict};
use crate::validate::{OfferDraft, SocialScanDraft};

#[derive(thiserror::Error, Debug, Clone)]
pub enum ScorerError {
    /// Transport failure, timeout, or non-2xx status. Safe for the caller to
    /// retry.
    #[error("scorer unavailable: {0}")]
    Unavailable(String),
    /// The service answered 2xx but the body does not match the contract.
    /// Logged for investigation, never coerced into a default verdict.
    #[error("scorer malformed response: {0}")]
    Malformed(String),
}

/// Attachment already spooled to disk by the upload path. The spool file
/// outlives the scorer call; its RAII guard lives in the request handler.
#[derive(Debug, Clone)]
pub struct AttachmentRef {
    pub file_name: String,
    pub mime: String,
    pub path: PathBuf,
}

/// One submission packaged for scoring: structured text fields plus any
/// spooled attachments.
#[derive(Debug, Clone)]
pub struct ScoreRequest {
    pub kind: &'static str,
    pub text_data: serde_json::Value,
    pub attachments: Vec<AttachmentRef>,
}

impl ScoreRequest {
    pub fn offer(draft: &OfferDraft, attachments: Vec<AttachmentRef>) -> Self {
        Self {
            kind: "offer",
            text_data: json!({
                "description": draft.description,
                "platform": draft.platform,
                "companyName": draft.company_name,
                "advisorName": draft.advisor_name,
                "contactInfo": draft.contact_info,
                "links": draft.links,
                "emails": draft.emails,
            }),
            attachments,
        }
    }

    pub fn social(draft: &SocialScanDraft) -> Self {
        Self {
            kind: "social_post",
            text_data: json!({
                "platform": draft.platform,
                "username": draft.username,
                "profileLink": draft.profile_link,
                "postText": draft.post_text,
                "links": draft.links,
                "contactInfo": draft.contact_info,
                "mediaFiles": draft.media_files,
            }),
            attachments: Vec::new(),
        }
    }
}

/// Advisor-registry lookup forwarded to the verification service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorQuery {
    pub user_id: Option<String>,
    pub license_id: String,
    pub regulator: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorReport {
    pub status: String,
    pub message: String,
    pub is_registered: bool,
    #[schema(value_type = Object)]
    pub details: Option<serde_json::Value>,
}

#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, req: &ScoreRequest) -> Result<Verdict, ScorerError>;
    async fn check_advisor(&self, query: &AdvisorQuery) -> Result<AdvisorReport, ScorerError>;
    async fn investigate(
        &self,
        symbol: &str,
        details: &serde_json::Value,
    ) -> Result<serde_json::Value, ScorerError>;
}

/// Raw wire shape of `/analyze`. Everything optional so normalization can
/// report exactly what is missing or out of range.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVerdict {
    overall_risk: Option<String>,
    risk_score: Option<f64>,
    fraud_probability: Option<f64>,
    risk_keywords: Option<Vec<String>>,
    recommendations: Option<Vec<String>>,
}

fn normalize(raw: RawVerdict) -> Result<Verdict, ScorerError> {
    let label = raw
        .overall_risk
        .ok_or_else(|| ScorerError::Malformed("missing overallRisk".into()))?;
    let overall_risk = RiskLevel::parse(&label)
        .ok_or_else(|| ScorerError::Malformed(format!("unrecognized risk label '{label}'")))?;

    let risk_score = raw
        .risk_score
        .ok_or_else(|| ScorerError::Malformed("missing riskScore".into()))?;
    if !(0.0..=100.0).contains(&risk_score) {
        return Err(ScorerError::Malformed(format!("riskScore {risk_score} out of range")));
    }

    let fraud_probability = raw
        .fraud_probability
        .ok_or_else(|| ScorerError::Malformed("missing fraudProbability".into()))?;
    if !(0.0..=1.0).contains(&fraud_probability) {
        return Err(ScorerError::Malformed(format!(
            "fraudProbability {fraud_probability} out of range"
        )));
    }

    Ok(Verdict {
        overall_risk,
        risk_score: risk_score.round() as i32,
        fraud_probability,
        // Absent arrays are normal; render as "none detected" downstream.
        risk_keywords: raw.risk_keywords.unwrap_or_default(),
        recommendations: raw.recommendations.unwrap_or_default(),
    })
}

/// HTTP implementation against the analysis service.
pub struct HttpScorer {
    base_url: String,
    http: reqwest::Client,
}

impl HttpScorer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url: base_url.into().trim_end_matches('/').to_string(), http })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let base_url = std::env::var("SCORER_BASE_URL")
            .map_err(|_| anyhow::anyhow!("SCORER_BASE_URL must be set"))?;
        let timeout_secs = std::env::var("SCORER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30u64);
        Self::new(base_url, Duration::from_secs(timeout_secs))
    }
}

#[async_trait]
impl Scorer for HttpScorer {
    async fn score(&self, req: &ScoreRequest) -> Result<Verdict, ScorerError> {
        metrics::increment_counter!("scorer_requests_total");

        let mut form = reqwest::multipart::Form::new()
            .text("kind", req.kind)
            .text("textData", req.text_data.to_string());
        for att in &req.attachments {
            // Spool files are capped at 10 MiB by the upload path, so reading
            // them back is bounded.
            let bytes = tokio::fs::read(&att.path)
                .await
                .map_err(|e| ScorerError::Unavailable(format!("spool read failed: {e}")))?;
            let part = reqwest::multipart::Part::bytes(bytes)
                .file_name(att.file_name.clone())
                .mime_str(&att.mime)
                .map_err(|e| ScorerError::Malformed(format!("bad attachment mime: {e}")))?;
            form = form.part("files", part);
        }

        debug!(kind = req.kind, attachments = req.attachments.len(), "posting to scorer");
        let resp = self
            .http
            .post(format!("{}/analyze", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ScorerError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            metrics::increment_counter!("scorer_failures_total");
            return Err(ScorerError::Unavailable(format!("status {}", resp.status())));
        }
        let raw: RawVerdict =
            resp.json().await.map_err(|e| ScorerError::Malformed(e.to_string()))?;
        normalize(raw)
    }

    async fn check_advisor(&self, query: &AdvisorQuery) -> Result<AdvisorReport, ScorerError> {
        let resp = self
            .http
            .post(format!("{}/check-advisor", self.base_url))
            .json(query)
            .send()
            .await
            .map_err(|e| ScorerError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ScorerError::Unavailable(format!("status {}", resp.status())));
        }
        resp.json().await.map_err(|e| ScorerError::Malformed(e.to_string()))
    }

    async fn investigate(
        &self,
        symbol: &str,
        details: &serde_json::Value,
    ) -> Result<serde_json::Value, ScorerError> {
        let resp = self
            .http
            .post(format!("{}/investigate", self.base_url))
            .json(&json!({ "symbol": symbol, "details": details }))
            .send()
            .await
            .map_err(|e| ScorerError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ScorerError::Unavailable(format!("status {}", resp.status())));
        }
        resp.json().await.map_err(|e| ScorerError::Malformed(e.to_string()))
    }
}
