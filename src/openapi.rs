use crate::models::{Flag, FlaggedOffer, NewFlag, Offer, SocialScan, User, Verdict};
use crate::scorer::{AdvisorQuery, AdvisorReport};
use crate::validate::SocialScanForm;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::scan_offer,
        crate::routes::check_advisor,
        crate::routes::flag_offer,
        crate::routes::flagged_offers,
        crate::routes::legitimacy,
        crate::routes::scan_social,
        crate::routes::list_social_scans,
        crate::routes::get_social_scan,
        crate::routes::scans_by_stock,
        crate::routes::mark_false_positive,
        crate::routes::report_scan,
    ),
    components(schemas(
        Offer, Flag, NewFlag, FlaggedOffer, SocialScan, Verdict, User,
        AdvisorQuery, AdvisorReport, SocialScanForm,
        crate::routes::FlagRequest,
        crate::routes::SignupRequest,
        crate::routes::LoginRequest,
    )),
    tags(
        (name = "offer-scan", description = "Investment offer scanning and flagging"),
        (name = "social-scan", description = "Social media post scanning and moderation"),
    )
)]
pub struct ApiDoc;
