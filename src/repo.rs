use async_trait::async_trait;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("datastore failure: {0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait OfferRepo: Send + Sync {
    async fn create_offer(&self, new: NewOffer) -> RepoResult<Offer>;
    async fn get_offer(&self, id: Id) -> RepoResult<Offer>;
    /// Writes the verdict fields and recomputes
    /// `flagged = flagged OR overall_risk == high`. Last write wins on repeat.
    async fn attach_offer_verdict(&self, id: Id, verdict: Verdict) -> RepoResult<Offer>;
    /// Inserts the flag and force-sets `flagged = true` on the parent offer
    /// (idempotent with respect to the bit).
    async fn create_flag(&self, new: NewFlag) -> RepoResult<Flag>;
    /// Flagged offers with embedded flags, newest offer first.
    async fn list_flagged_offers(&self) -> RepoResult<Vec<FlaggedOffer>>;

    async fn offer_legitimacy(&self, id: Id) -> RepoResult<Legitimacy> {
        match self.get_offer(id).await {
            Ok(offer) if offer.flagged => Ok(Legitimacy::Flagged),
            Ok(_) => Ok(Legitimacy::Legit),
            Err(RepoError::NotFound) => Ok(Legitimacy::Pending),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
pub trait SocialScanRepo: Send + Sync {
    async fn create_scan(&self, new: NewSocialScan) -> RepoResult<SocialScan>;
    async fn get_scan(&self, id: Id) -> RepoResult<SocialScan>;
    async fn attach_scan_verdict(&self, id: Id, verdict: Verdict) -> RepoResult<SocialScan>;
    /// All scans, newest first.
    async fn list_scans(&self) -> RepoResult<Vec<SocialScan>>;
    /// Case-insensitive substring match against post text, newest first.
    async fn find_by_symbol(&self, symbol: &str) -> RepoResult<Vec<SocialScan>>;
    /// Sets the moderation tag; never touches `flagged`.
    async fn set_moderation(&self, id: Id, tag: ModerationTag) -> RepoResult<SocialScan>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn upsert_user(&self, new: NewUser) -> RepoResult<User>;
}

pub trait Repo: OfferRepo + SocialScanRepo + UserRepo {}

impl<T> Repo for T where T: OfferRepo + SocialScanRepo + UserRepo {}

fn verdict_flags(flagged: bool, verdict: &Verdict) -> bool {
    flagged || verdict.overall_risk == RiskLevel::High
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        offers: HashMap<Id, Offer>,
        flags: HashMap<Id, Flag>,
        scans: HashMap<Id, SocialScan>,
        users: HashMap<String, User>,
        next_id: Id,
    }

    /// JSON-snapshot backed store for tests and local development.
    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            match std::env::var("FW_DATA_DIR") {
                Ok(dir) => {
                    let mut p = PathBuf::from(dir);
                    p.push("state.json");
                    p
                }
                Err(_) => PathBuf::from(SNAPSHOT_PATH),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        tracing::info!(path = %path.display(), "loaded snapshot");
                        s
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), %e, "snapshot parse failed, starting empty");
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(bytes) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, bytes) {
                    tracing::warn!(path = %path.display(), %e, "snapshot write failed");
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl OfferRepo for InMemRepo {
        async fn create_offer(&self, new: NewOffer) -> RepoResult<Offer> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            let offer = Offer {
                id,
                description: new.description,
                platform: new.platform,
                company_name: new.company_name,
                advisor_name: new.advisor_name,
                contact_info: new.contact_info,
                links: new.links,
                emails: new.emails,
                attachment_hashes: new.attachment_hashes,
                flagged: false,
                overall_risk: None,
                risk_score: None,
                fraud_probability: None,
                risk_keywords: Vec::new(),
                recommendations: Vec::new(),
                created_at: Utc::now(),
            };
            s.offers.insert(id, offer.clone());
            drop(s); // release lock before persisting
            self.persist();
            Ok(offer)
        }

        async fn get_offer(&self, id: Id) -> RepoResult<Offer> {
            let s = self.state.read().unwrap();
            s.offers.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn attach_offer_verdict(&self, id: Id, verdict: Verdict) -> RepoResult<Offer> {
            let mut s = self.state.write().unwrap();
            let offer = s.offers.get_mut(&id).ok_or(RepoError::NotFound)?;
            offer.flagged = verdict_flags(offer.flagged, &verdict);
            offer.overall_risk = Some(verdict.overall_risk);
            offer.risk_score = Some(verdict.risk_score);
            offer.fraud_probability = Some(verdict.fraud_probability);
            offer.risk_keywords = verdict.risk_keywords;
            offer.recommendations = verdict.recommendations;
            let updated = offer.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn create_flag(&self, new: NewFlag) -> RepoResult<Flag> {
            let mut s = self.state.write().unwrap();
            if !s.offers.contains_key(&new.offer_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let flag = Flag {
                id,
                offer_id: new.offer_id,
                flagged_by: new.flagged_by,
                reason: new.reason,
                risk_score: new.risk_score,
                created_at: Utc::now(),
            };
            s.flags.insert(id, flag.clone());
            if let Some(offer) = s.offers.get_mut(&new.offer_id) {
                offer.flagged = true;
            }
            drop(s);
            self.persist();
            Ok(flag)
        }

        async fn list_flagged_offers(&self) -> RepoResult<Vec<FlaggedOffer>> {
            let s = self.state.read().unwrap();
            let mut offers: Vec<_> = s.offers.values().filter(|o| o.flagged).cloned().collect();
            offers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(offers
                .into_iter()
                .map(|offer| {
                    let mut flags: Vec<_> = s
                        .flags
                        .values()
                        .filter(|f| f.offer_id == offer.id)
                        .cloned()
                        .collect();
                    flags.sort_by(|a, b| a.created_at.cmp(&b.created_at));
                    FlaggedOffer { offer, flags }
                })
                .collect())
        }
    }

    #[async_trait]
    impl SocialScanRepo for InMemRepo {
        async fn create_scan(&self, new: NewSocialScan) -> RepoResult<SocialScan> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            let scan = SocialScan {
                id,
                platform: new.platform,
                username: new.username,
                profile_link: new.profile_link,
                post_text: new.post_text,
                links: new.links,
                contact_info: new.contact_info,
                media_files: new.media_files,
                flagged: false,
                ai_verdict: None,
                overall_risk: None,
                risk_score: None,
                fraud_probability: None,
                risk_keywords: Vec::new(),
                recommendations: Vec::new(),
                created_at: Utc::now(),
            };
            s.scans.insert(id, scan.clone());
            drop(s);
            self.persist();
            Ok(scan)
        }

        async fn get_scan(&self, id: Id) -> RepoResult<SocialScan> {
            let s = self.state.read().unwrap();
            s.scans.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn attach_scan_verdict(&self, id: Id, verdict: Verdict) -> RepoResult<SocialScan> {
            let mut s = self.state.write().unwrap();
            let scan = s.scans.get_mut(&id).ok_or(RepoError::NotFound)?;
            scan.flagged = verdict_flags(scan.flagged, &verdict);
            scan.overall_risk = Some(verdict.overall_risk);
            scan.risk_score = Some(verdict.risk_score);
            scan.fraud_probability = Some(verdict.fraud_probability);
            scan.risk_keywords = verdict.risk_keywords;
            scan.recommendations = verdict.recommendations;
            let updated = scan.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn list_scans(&self) -> RepoResult<Vec<SocialScan>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.scans.values().cloned().collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(v)
        }

        async fn find_by_symbol(&self, symbol: &str) -> RepoResult<Vec<SocialScan>> {
            let needle = symbol.to_lowercase();
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .scans
                .values()
                .filter(|scan| scan.post_text.to_lowercase().contains(&needle))
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(v)
        }

        async fn set_moderation(&self, id: Id, tag: ModerationTag) -> RepoResult<SocialScan> {
            let mut s = self.state.write().unwrap();
            let scan = s.scans.get_mut(&id).ok_or(RepoError::NotFound)?;
            scan.ai_verdict = Some(tag);
            let updated = scan.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn upsert_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            let user = match s.users.get_mut(&new.id) {
                Some(existing) => {
                    existing.email = new.email;
                    if new.name.is_some() {
                        existing.name = new.name;
                    }
                    // role assignments survive re-login
                    existing.clone()
                }
                None => {
                    let user = User {
                        id: new.id.clone(),
                        email: new.email,
                        name: new.name,
                        role: new.role,
                        created_at: Utc::now(),
                    };
                    s.users.insert(new.id, user.clone());
                    user
                }
            };
            drop(s);
            self.persist();
            Ok(user)
        }
    }
}

#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    const OFFER_COLS: &str = "id, description, platform, company_name, advisor_name, contact_info, \
         links, emails, attachment_hashes, flagged, overall_risk, risk_score, fraud_probability, \
         risk_keywords, recommendations, created_at";
    const SCAN_COLS: &str = "id, platform, username, profile_link, post_text, links, contact_info, \
         media_files, flagged, ai_verdict, overall_risk, risk_score, fraud_probability, \
         risk_keywords, recommendations, created_at";

    fn map_err(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            other => RepoError::Internal(other.to_string()),
        }
    }

    /// Escapes LIKE/ILIKE metacharacters so the symbol is matched as a literal
    /// substring, same as the in-memory backend. Pair with `ESCAPE '\'`.
    fn like_escape(s: &str) -> String {
        s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
    }

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl OfferRepo for PgRepo {
        async fn create_offer(&self, new: NewOffer) -> RepoResult<Offer> {
            let sql = format!(
                "INSERT INTO investment_offers \
                 (description, platform, company_name, advisor_name, contact_info, links, emails, attachment_hashes) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8) RETURNING {OFFER_COLS}"
            );
            sqlx::query_as::<_, Offer>(&sql)
                .bind(&new.description)
                .bind(&new.platform)
                .bind(&new.company_name)
                .bind(&new.advisor_name)
                .bind(&new.contact_info)
                .bind(&new.links)
                .bind(&new.emails)
                .bind(&new.attachment_hashes)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn get_offer(&self, id: Id) -> RepoResult<Offer> {
            let sql = format!("SELECT {OFFER_COLS} FROM investment_offers WHERE id = $1");
            sqlx::query_as::<_, Offer>(&sql)
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn attach_offer_verdict(&self, id: Id, verdict: Verdict) -> RepoResult<Offer> {
            let sql = format!(
                "UPDATE investment_offers SET overall_risk = $2, risk_score = $3, \
                 fraud_probability = $4, risk_keywords = $5, recommendations = $6, \
                 flagged = flagged OR $7 WHERE id = $1 RETURNING {OFFER_COLS}"
            );
            sqlx::query_as::<_, Offer>(&sql)
                .bind(id)
                .bind(verdict.overall_risk)
                .bind(verdict.risk_score)
                .bind(verdict.fraud_probability)
                .bind(&verdict.risk_keywords)
                .bind(&verdict.recommendations)
                .bind(verdict.overall_risk == RiskLevel::High)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn create_flag(&self, new: NewFlag) -> RepoResult<Flag> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            let flag = sqlx::query_as::<_, Flag>(
                "INSERT INTO offer_flags (offer_id, flagged_by, reason, risk_score) \
                 VALUES ($1,$2,$3,$4) \
                 RETURNING id, offer_id, flagged_by, reason, risk_score, created_at",
            )
            .bind(new.offer_id)
            .bind(&new.flagged_by)
            .bind(&new.reason)
            .bind(new.risk_score)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| match e {
                // FK violation on offer_id means the offer is gone; any other
                // database failure is a real error, not a 404
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => RepoError::NotFound,
                other => map_err(other),
            })?;
            sqlx::query("UPDATE investment_offers SET flagged = TRUE WHERE id = $1")
                .bind(new.offer_id)
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;
            tx.commit().await.map_err(map_err)?;
            Ok(flag)
        }

        async fn list_flagged_offers(&self) -> RepoResult<Vec<FlaggedOffer>> {
            let sql = format!(
                "SELECT {OFFER_COLS} FROM investment_offers WHERE flagged \
                 ORDER BY created_at DESC, id DESC"
            );
            let offers = sqlx::query_as::<_, Offer>(&sql)
                .fetch_all(&self.pool)
                .await
                .map_err(map_err)?;
            let ids: Vec<Id> = offers.iter().map(|o| o.id).collect();
            let flags = sqlx::query_as::<_, Flag>(
                "SELECT id, offer_id, flagged_by, reason, risk_score, created_at \
                 FROM offer_flags WHERE offer_id = ANY($1) ORDER BY created_at ASC",
            )
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
            Ok(offers
                .into_iter()
                .map(|offer| {
                    let flags = flags.iter().filter(|f| f.offer_id == offer.id).cloned().collect();
                    FlaggedOffer { offer, flags }
                })
                .collect())
        }
    }

    #[async_trait]
    impl SocialScanRepo for PgRepo {
        async fn create_scan(&self, new: NewSocialScan) -> RepoResult<SocialScan> {
            let sql = format!(
                "INSERT INTO social_scans \
                 (platform, username, profile_link, post_text, links, contact_info, media_files) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7) RETURNING {SCAN_COLS}"
            );
            sqlx::query_as::<_, SocialScan>(&sql)
                .bind(&new.platform)
                .bind(&new.username)
                .bind(&new.profile_link)
                .bind(&new.post_text)
                .bind(&new.links)
                .bind(&new.contact_info)
                .bind(&new.media_files)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn get_scan(&self, id: Id) -> RepoResult<SocialScan> {
            let sql = format!("SELECT {SCAN_COLS} FROM social_scans WHERE id = $1");
            sqlx::query_as::<_, SocialScan>(&sql)
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn attach_scan_verdict(&self, id: Id, verdict: Verdict) -> RepoResult<SocialScan> {
            let sql = format!(
                "UPDATE social_scans SET overall_risk = $2, risk_score = $3, \
                 fraud_probability = $4, risk_keywords = $5, recommendations = $6, \
                 flagged = flagged OR $7 WHERE id = $1 RETURNING {SCAN_COLS}"
            );
            sqlx::query_as::<_, SocialScan>(&sql)
                .bind(id)
                .bind(verdict.overall_risk)
                .bind(verdict.risk_score)
                .bind(verdict.fraud_probability)
                .bind(&verdict.risk_keywords)
                .bind(&verdict.recommendations)
                .bind(verdict.overall_risk == RiskLevel::High)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn list_scans(&self) -> RepoResult<Vec<SocialScan>> {
            let sql = format!("SELECT {SCAN_COLS} FROM social_scans ORDER BY created_at DESC, id DESC");
            sqlx::query_as::<_, SocialScan>(&sql)
                .fetch_all(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn find_by_symbol(&self, symbol: &str) -> RepoResult<Vec<SocialScan>> {
            let sql = format!(
                "SELECT {SCAN_COLS} FROM social_scans \
                 WHERE post_text ILIKE '%' || $1 || '%' ESCAPE '\\' \
                 ORDER BY created_at DESC, id DESC"
            );
            sqlx::query_as::<_, SocialScan>(&sql)
                .bind(like_escape(symbol))
                .fetch_all(&self.pool)
                .await
                .map_err(map_err)
        }

        async fn set_moderation(&self, id: Id, tag: ModerationTag) -> RepoResult<SocialScan> {
            let sql = format!(
                "UPDATE social_scans SET ai_verdict = $2 WHERE id = $1 RETURNING {SCAN_COLS}"
            );
            sqlx::query_as::<_, SocialScan>(&sql)
                .bind(id)
                .bind(tag)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn upsert_user(&self, new: NewUser) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "INSERT INTO users (id, email, name, role) VALUES ($1,$2,$3,$4) \
                 ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email, \
                 name = COALESCE(EXCLUDED.name, users.name) \
                 RETURNING id, email, name, role, created_at",
            )
            .bind(&new.id)
            .bind(&new.email)
            .bind(&new.name)
            .bind(new.role)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }
    }

}
