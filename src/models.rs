use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Bigserial in Postgres, plain counter in the in-memory store.
pub type Id = i64;

/// Closed risk taxonomy. Anything the scorer returns outside of this set is a
/// malformed response, never coerced into a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "risk_level", rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Case-insensitive parse of the scorer's `overallRisk` label.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

/// Moderation overwrite applied to a scan after human review. Does not touch
/// the `flagged` bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "moderation_tag", rename_all = "snake_case")]
pub enum ModerationTag {
    FalsePositive,
    Reported,
}

/// Three-state standing exposed to investors querying an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Legitimacy {
    Legit,
    Flagged,
    Pending,
}

/// Normalized scorer output. Serialized camelCase because that is the wire
/// shape of the external analysis service, and API clients receive it as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub overall_risk: RiskLevel,
    pub risk_score: i32,
    pub fraud_probability: f64,
    pub risk_keywords: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Offer {
    pub id: Id,
    pub description: String,
    pub platform: Option<String>,
    pub company_name: Option<String>,
    pub advisor_name: Option<String>,
    pub contact_info: Option<String>,
    pub links: Option<String>,
    pub emails: Option<String>,
    /// sha-256 of each uploaded attachment; the bytes themselves are only
    /// spooled long enough to forward to the scorer.
    pub attachment_hashes: Vec<String>,
    pub flagged: bool,
    pub overall_risk: Option<RiskLevel>,
    pub risk_score: Option<i32>,
    pub fraud_probability: Option<f64>,
    pub risk_keywords: Vec<String>,
    pub recommendations: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewOffer {
    pub description: String,
    pub platform: Option<String>,
    pub company_name: Option<String>,
    pub advisor_name: Option<String>,
    pub contact_info: Option<String>,
    pub links: Option<String>,
    pub emails: Option<String>,
    pub attachment_hashes: Vec<String>,
}

/// Human-originated suspicion marker on an offer. Deleted with its offer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Flag {
    pub id: Id,
    pub offer_id: Id,
    pub flagged_by: String,
    pub reason: String,
    pub risk_score: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewFlag {
    pub offer_id: Id,
    pub flagged_by: String,
    pub reason: String,
    pub risk_score: Option<i32>,
}

/// Flagged offer with its moderation history embedded, as served to
/// regulators.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FlaggedOffer {
    #[serde(flatten)]
    pub offer: Offer,
    pub flags: Vec<Flag>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct SocialScan {
    pub id: Id,
    pub platform: String,
    pub username: String,
    pub profile_link: Option<String>,
    pub post_text: String,
    pub links: Option<String>,
    pub contact_info: Option<String>,
    pub media_files: Vec<String>,
    pub flagged: bool,
    pub ai_verdict: Option<ModerationTag>,
    pub overall_risk: Option<RiskLevel>,
    pub risk_score: Option<i32>,
    pub fraud_probability: Option<f64>,
    pub risk_keywords: Vec<String>,
    pub recommendations: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewSocialScan {
    pub platform: String,
    pub username: String,
    pub profile_link: Option<String>,
    pub post_text: String,
    pub links: Option<String>,
    pub contact_info: Option<String>,
    pub media_files: Vec<String>,
}

/// Account row mirroring the external auth provider's user. Upserted on every
/// signup/login.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: crate::auth::Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: crate::auth::Role,
}
