//! Submission Validator: turns raw request bodies into well-typed drafts or
//! fails with a specific reason. Pure: no network, no persistence.

use serde::Deserialize;
use utoipa::ToSchema;

/// Hard cap on a single uploaded attachment, enforced while the upload is
/// spooled and before any scorer call.
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("offer description must not be empty")]
    MissingOfferText,
    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),
    #[error("attachment '{file_name}' exceeds the 10 MiB limit")]
    FileTooLarge { file_name: String },
}

/// Raw text fields of an offer scan as they arrive from the multipart form.
/// Unrecognized fields are dropped by the reader; absent optional fields stay
/// `None`.
#[derive(Debug, Default, Clone, Deserialize, ToSchema)]
pub struct OfferForm {
    pub description: Option<String>,
    pub platform: Option<String>,
    pub company_name: Option<String>,
    pub advisor_name: Option<String>,
    pub contact_info: Option<String>,
    pub links: Option<String>,
    pub emails: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OfferDraft {
    pub description: String,
    pub platform: Option<String>,
    pub company_name: Option<String>,
    pub advisor_name: Option<String>,
    pub contact_info: Option<String>,
    pub links: Option<String>,
    pub emails: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SocialScanForm {
    pub platform: Option<String>,
    pub username: Option<String>,
    pub profile_link: Option<String>,
    pub post_text: Option<String>,
    pub links: Option<String>,
    pub contact_info: Option<String>,
    #[serde(default)]
    pub media_files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SocialScanDraft {
    pub platform: String,
    pub username: String,
    pub profile_link: Option<String>,
    pub post_text: String,
    pub links: Option<String>,
    pub contact_info: Option<String>,
    pub media_files: Vec<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
    })
}

pub fn validate_offer(form: OfferForm) -> Result<OfferDraft, ValidationError> {
    let description = non_empty(form.description).ok_or(ValidationError::MissingOfferText)?;
    Ok(OfferDraft {
        description,
        platform: non_empty(form.platform),
        company_name: non_empty(form.company_name),
        advisor_name: non_empty(form.advisor_name),
        contact_info: non_empty(form.contact_info),
        links: non_empty(form.links),
        emails: non_empty(form.emails),
    })
}

pub fn validate_social(form: SocialScanForm) -> Result<SocialScanDraft, ValidationError> {
    let platform =
        non_empty(form.platform).ok_or(ValidationError::MissingRequiredField("platform"))?;
    let username =
        non_empty(form.username).ok_or(ValidationError::MissingRequiredField("username"))?;
    let post_text =
        non_empty(form.post_text).ok_or(ValidationError::MissingRequiredField("postText"))?;
    Ok(SocialScanDraft {
        platform,
        username,
        profile_link: non_empty(form.profile_link),
        post_text,
        links: non_empty(form.links),
        contact_info: non_empty(form.contact_info),
        media_files: form.media_files,
    })
}
