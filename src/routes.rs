use std::io::Write as _;
use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::TryStreamExt as _;
use serde_json::json;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::auth::{Auth, AuthProvider, Role};
use crate::error::ApiError;
use crate::models::*;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::Repo;
use crate::scorer::{AdvisorQuery, AdvisorReport, AttachmentRef, ScoreRequest, Scorer};
use crate::validate::{
    self, OfferForm, SocialScanForm, ValidationError, MAX_ATTACHMENT_BYTES,
};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/auth")
            .service(web::resource("/signup").route(web::post().to(signup)))
            .service(web::resource("/login").route(web::post().to(login)))
            .service(web::resource("/logout").route(web::post().to(logout)))
            .service(web::resource("/profile").route(web::get().to(profile))),
    );
    cfg.service(
        web::scope("/api/offer-scan")
            .service(web::resource("/scan").route(web::post().to(scan_offer)))
            .service(web::resource("/check-advisor").route(web::post().to(check_advisor)))
            .service(web::resource("/flag").route(web::post().to(flag_offer)))
            .service(web::resource("/flagged").route(web::get().to(flagged_offers)))
            .service(web::resource("/legitimacy/{offer_id}").route(web::get().to(legitimacy))),
    );
    cfg.service(
        web::scope("/api/social-scan")
            .service(web::resource("/scan").route(web::post().to(scan_social)))
            .service(web::resource("/all").route(web::get().to(list_social_scans)))
            .service(web::resource("/stock/{symbol}").route(web::get().to(scans_by_stock)))
            .service(
                web::resource("/investigate/{symbol}").route(web::post().to(investigate_stock)),
            )
            .service(
                web::resource("/{id}/false-positive").route(web::post().to(mark_false_positive)),
            )
            .service(web::resource("/{id}/report").route(web::post().to(report_scan)))
            .service(web::resource("/{id}").route(web::get().to(get_social_scan))),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub scorer: Arc<dyn Scorer>,
    /// None when no auth provider is configured; auth endpoints answer 503.
    pub auth: Option<Arc<dyn AuthProvider>>,
    pub rate_limiter: Option<RateLimiterFacade>,
}

fn client_ip(req: &HttpRequest) -> String {
    req.connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string()
}

// ---------------- attachment spooling ----------------

/// Upload streamed to a temp file. The file is removed when this guard drops,
/// on every exit path.
struct SpooledAttachment {
    file_name: String,
    mime: String,
    sha256: String,
    size: usize,
    temp: NamedTempFile,
}

impl SpooledAttachment {
    fn attachment_ref(&self) -> AttachmentRef {
        AttachmentRef {
            file_name: self.file_name.clone(),
            mime: self.mime.clone(),
            path: self.temp.path().to_path_buf(),
        }
    }
}

fn multipart_err(e: actix_multipart::MultipartError) -> ApiError {
    warn!(%e, "malformed multipart payload");
    ApiError::BadRequest("malformed multipart payload".into())
}

async fn spool_attachment(
    field: &mut actix_multipart::Field,
    file_name: String,
) -> Result<SpooledAttachment, ApiError> {
    let mut temp = NamedTempFile::new().map_err(|e| {
        warn!(%e, "failed to create spool file");
        ApiError::Internal
    })?;
    let mut hasher = Sha256::new();
    let mut head: Vec<u8> = Vec::new();
    let mut size = 0usize;

    while let Some(chunk) = field.try_next().await.map_err(multipart_err)? {
        // Enforced while streaming so an oversized upload never reaches the
        // scorer or the datastore.
        if size + chunk.len() > MAX_ATTACHMENT_BYTES {
            return Err(ValidationError::FileTooLarge { file_name }.into());
        }
        size += chunk.len();
        hasher.update(&chunk);
        if head.len() < 512 {
            head.extend_from_slice(&chunk[..chunk.len().min(512 - head.len())]);
        }
        temp.write_all(&chunk).map_err(|e| {
            warn!(%e, "spool write failed");
            ApiError::Internal
        })?;
    }
    temp.flush().map_err(|_| ApiError::Internal)?;

    let mime = infer::get(&head)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into());
    let sha256 = format!("{:x}", hasher.finalize());
    Ok(SpooledAttachment { file_name, mime, sha256, size, temp })
}

async fn read_text_field(field: &mut actix_multipart::Field) -> Result<String, ApiError> {
    const TEXT_FIELD_LIMIT: usize = 16 * 1024;
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(multipart_err)? {
        if buf.len() + chunk.len() > TEXT_FIELD_LIMIT {
            return Err(ApiError::BadRequest("text field too large".into()));
        }
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8(buf).map_err(|_| ApiError::BadRequest("text field is not valid utf-8".into()))
}

/// Reads the offer-scan multipart body: named text fields into an `OfferForm`
/// (camelCase and snake_case accepted, unknown names ignored), file parts into
/// spool files.
async fn read_offer_multipart(
    payload: &mut Multipart,
) -> Result<(OfferForm, Vec<SpooledAttachment>), ApiError> {
    let mut form = OfferForm::default();
    let mut attachments = Vec::new();
    while let Some(mut field) = payload.try_next().await.map_err(multipart_err)? {
        let cd = field.content_disposition();
        let name = cd.get_name().map(str::to_string);
        let file_name = cd.get_filename().map(str::to_string);
        if let Some(file_name) = file_name {
            attachments.push(spool_attachment(&mut field, file_name).await?);
            continue;
        }
        let Some(name) = name else { continue };
        let value = read_text_field(&mut field).await?;
        match name.as_str() {
            "description" => form.description = Some(value),
            "platform" => form.platform = Some(value),
            "companyName" | "company_name" => form.company_name = Some(value),
            "advisorName" | "advisor_name" => form.advisor_name = Some(value),
            "contactInfo" | "contact_info" => form.contact_info = Some(value),
            "links" => form.links = Some(value),
            "emails" => form.emails = Some(value),
            _ => {} // optional fields only; unrecognized names are ignored
        }
    }
    Ok((form, attachments))
}

// ---------------- offer scan ----------------

#[utoipa::path(
    post,
    path = "/api/offer-scan/scan",
    responses(
        (status = 200, description = "Offer stored and scored", body = Offer),
        (status = 400, description = "Validation failed"),
        (status = 413, description = "Attachment over 10 MiB"),
        (status = 502, description = "Scorer returned malformed response"),
        (status = 503, description = "Scorer unavailable; offer retained un-scored")
    )
)]
pub async fn scan_offer(
    req: HttpRequest,
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_scan(&client_ip(&req)) {
            return Err(ApiError::RateLimited);
        }
    }

    let (form, attachments) = read_offer_multipart(&mut payload).await?;
    let draft = validate::validate_offer(form)?;
    metrics::increment_counter!("offer_scans_total");
    tracing::debug!(
        files = attachments.len(),
        bytes = attachments.iter().map(|a| a.size).sum::<usize>(),
        "attachments spooled"
    );

    // Persist first so a scorer failure still leaves an auditable record.
    let offer = data
        .repo
        .create_offer(NewOffer {
            description: draft.description.clone(),
            platform: draft.platform.clone(),
            company_name: draft.company_name.clone(),
            advisor_name: draft.advisor_name.clone(),
            contact_info: draft.contact_info.clone(),
            links: draft.links.clone(),
            emails: draft.emails.clone(),
            attachment_hashes: attachments.iter().map(|a| a.sha256.clone()).collect(),
        })
        .await?;

    let score_req =
        ScoreRequest::offer(&draft, attachments.iter().map(|a| a.attachment_ref()).collect());
    let verdict = match data.scorer.score(&score_req).await {
        Ok(v) => v,
        Err(e) => {
            warn!(offer_id = offer.id, "offer stored but scoring failed");
            return Err(e.into());
        }
    };
    let offer = data.repo.attach_offer_verdict(offer.id, verdict.clone()).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Offer scanned and saved successfully",
        "offer": offer,
        "analysis": verdict,
    })))
    // spooled attachments drop here; temp files are removed on success and
    // failure alike
}

#[utoipa::path(
    post,
    path = "/api/offer-scan/check-advisor",
    request_body = AdvisorQuery,
    responses(
        (status = 200, description = "Registry verification result", body = AdvisorReport),
        (status = 503, description = "Verification service unavailable")
    )
)]
pub async fn check_advisor(
    data: web::Data<AppState>,
    payload: web::Json<AdvisorQuery>,
) -> Result<HttpResponse, ApiError> {
    let report = data.scorer.check_advisor(&payload).await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Advisor credentials checked successfully",
        "result": report,
    })))
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlagRequest {
    pub offer_id: Id,
    pub flagged_by: String,
    pub reason: String,
    pub risk_score: Option<i32>,
}

#[utoipa::path(
    post,
    path = "/api/offer-scan/flag",
    request_body = FlagRequest,
    responses(
        (status = 200, description = "Flag recorded", body = Flag),
        (status = 404, description = "Offer not found")
    )
)]
pub async fn flag_offer(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<FlagRequest>,
) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_flag(&client_ip(&req)) {
            return Err(ApiError::RateLimited);
        }
    }
    let payload = payload.into_inner();
    let flag = data
        .repo
        .create_flag(NewFlag {
            offer_id: payload.offer_id,
            flagged_by: payload.flagged_by,
            reason: payload.reason,
            risk_score: payload.risk_score,
        })
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Offer flagged successfully", "flag": flag })))
}

#[utoipa::path(
    get,
    path = "/api/offer-scan/flagged",
    responses((status = 200, description = "Flagged offers, newest first", body = [FlaggedOffer]))
)]
pub async fn flagged_offers(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let offers = data.repo.list_flagged_offers().await?;
    Ok(HttpResponse::Ok().json(json!({ "offers": offers })))
}

#[utoipa::path(
    get,
    path = "/api/offer-scan/legitimacy/{offer_id}",
    params(("offer_id" = Id, Path, description = "Offer id")),
    responses(
        (status = 200, description = "legit or flagged"),
        (status = 404, description = "Unknown offer; status pending")
    )
)]
pub async fn legitimacy(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    use actix_web::http::StatusCode;
    let status = data.repo.offer_legitimacy(path.into_inner()).await?;
    let (http_status, message) = match status {
        Legitimacy::Pending => (StatusCode::NOT_FOUND, "Offer not found"),
        Legitimacy::Flagged => (StatusCode::OK, "This offer has been flagged as suspicious."),
        Legitimacy::Legit => (StatusCode::OK, "This offer is not flagged."),
    };
    Ok(HttpResponse::build(http_status).json(json!({ "status": status, "message": message })))
}

// ---------------- social scan ----------------

#[utoipa::path(
    post,
    path = "/api/social-scan/scan",
    request_body = SocialScanForm,
    responses(
        (status = 200, description = "Post stored and scored", body = SocialScan),
        (status = 400, description = "Required field missing"),
        (status = 503, description = "Scorer unavailable; scan retained un-scored")
    )
)]
pub async fn scan_social(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<SocialScanForm>,
) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_scan(&client_ip(&req)) {
            return Err(ApiError::RateLimited);
        }
    }

    let draft = validate::validate_social(payload.into_inner())?;
    metrics::increment_counter!("social_scans_total");

    let scan = data
        .repo
        .create_scan(NewSocialScan {
            platform: draft.platform.clone(),
            username: draft.username.clone(),
            profile_link: draft.profile_link.clone(),
            post_text: draft.post_text.clone(),
            links: draft.links.clone(),
            contact_info: draft.contact_info.clone(),
            media_files: draft.media_files.clone(),
        })
        .await?;

    let verdict = match data.scorer.score(&ScoreRequest::social(&draft)).await {
        Ok(v) => v,
        Err(e) => {
            warn!(scan_id = scan.id, "scan stored but scoring failed");
            return Err(e.into());
        }
    };
    let scan = data.repo.attach_scan_verdict(scan.id, verdict).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Social media post scanned successfully",
        "result": scan,
    })))
}

#[utoipa::path(
    get,
    path = "/api/social-scan/all",
    responses((status = 200, description = "All scans, newest first", body = [SocialScan]))
)]
pub async fn list_social_scans(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let scans = data.repo.list_scans().await?;
    Ok(HttpResponse::Ok().json(scans))
}

#[utoipa::path(
    get,
    path = "/api/social-scan/{id}",
    params(("id" = Id, Path, description = "Scan id")),
    responses(
        (status = 200, description = "Scan", body = SocialScan),
        (status = 404, description = "Scan not found")
    )
)]
pub async fn get_social_scan(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let scan = data.repo.get_scan(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(scan))
}

#[utoipa::path(
    get,
    path = "/api/social-scan/stock/{symbol}",
    params(("symbol" = String, Path, description = "Stock symbol")),
    responses((status = 200, description = "Scans mentioning the symbol", body = [SocialScan]))
)]
pub async fn scans_by_stock(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let scans = data.repo.find_by_symbol(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(scans))
}

pub async fn investigate_stock(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: Option<web::Json<serde_json::Value>>,
) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_investigate(&client_ip(&req)) {
            return Err(ApiError::RateLimited);
        }
    }
    let symbol = path.into_inner();
    let details = body.map(|b| b.into_inner()).unwrap_or_else(|| json!({}));
    let result = data.scorer.investigate(&symbol, &details).await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "AI investigation complete",
        "result": result,
    })))
}

async fn moderate(
    data: web::Data<AppState>,
    id: Id,
    tag: ModerationTag,
    message: &str,
) -> Result<HttpResponse, ApiError> {
    let scan = data.repo.set_moderation(id, tag).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": message, "scan": scan })))
}

#[utoipa::path(
    post,
    path = "/api/social-scan/{id}/false-positive",
    params(("id" = Id, Path, description = "Scan id")),
    responses(
        (status = 200, description = "Marked as false positive", body = SocialScan),
        (status = 404, description = "Scan not found")
    )
)]
pub async fn mark_false_positive(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    moderate(data, path.into_inner(), ModerationTag::FalsePositive, "Marked as false positive")
        .await
}

#[utoipa::path(
    post,
    path = "/api/social-scan/{id}/report",
    params(("id" = Id, Path, description = "Scan id")),
    responses(
        (status = 200, description = "Reported for review", body = SocialScan),
        (status = 404, description = "Scan not found")
    )
)]
pub async fn report_scan(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    moderate(data, path.into_inner(), ModerationTag::Reported, "Reported for review").await
}

// ---------------- auth ----------------

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

fn auth_provider(data: &AppState) -> Result<&Arc<dyn AuthProvider>, ApiError> {
    data.auth.as_ref().ok_or(ApiError::AuthUnavailable)
}

pub async fn signup(
    data: web::Data<AppState>,
    payload: web::Json<SignupRequest>,
) -> Result<HttpResponse, ApiError> {
    let provider = auth_provider(&data)?;
    let session = provider.sign_up(&payload.email, &payload.password).await?;
    let role = payload.role.as_deref().and_then(Role::parse).unwrap_or(Role::Investor);
    let user = data
        .repo
        .upsert_user(NewUser {
            id: session.user.id,
            email: payload.email.clone(),
            name: payload.name.clone(),
            role,
        })
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Signup successful, verify your email!",
        "user": user,
    })))
}

pub async fn login(
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let provider = auth_provider(&data)?;
    let session = provider.sign_in(&payload.email, &payload.password).await?;
    let user = data
        .repo
        .upsert_user(NewUser {
            id: session.user.id,
            email: payload.email.clone(),
            name: None,
            role: Role::Investor, // preserved by the upsert when already set
        })
        .await?;
    let token = crate::auth::create_jwt(&user.id, &user.email, user.role)
        .map_err(|_| ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Login successful",
        "token": token,
        "user": user,
    })))
}

pub async fn logout(
    req: HttpRequest,
    _auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let provider = auth_provider(&data)?;
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;
    provider.sign_out(token).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Logout successful" })))
}

pub async fn profile(auth: Auth) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(json!({
        "user": {
            "id": auth.0.sub,
            "email": auth.0.email,
            "role": auth.0.role,
        }
    })))
}
