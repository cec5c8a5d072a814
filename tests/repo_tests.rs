#![cfg(feature = "inmem-store")]

use fraudwatch::models::*;
use fraudwatch::repo::{inmem::InMemRepo, OfferRepo, RepoError, SocialScanRepo, UserRepo};

/// Helper that returns a fresh, empty repository for every test run.
fn repo() -> InMemRepo {
    // isolate state: do **not** persist to the default file path
    std::env::set_var("FW_DATA_DIR", tempfile::tempdir().unwrap().path());
    InMemRepo::new()
}

fn offer(description: &str) -> NewOffer {
    NewOffer {
        description: description.into(),
        platform: None,
        company_name: None,
        advisor_name: None,
        contact_info: None,
        links: None,
        emails: None,
        attachment_hashes: Vec::new(),
    }
}

fn scan(username: &str, post_text: &str) -> NewSocialScan {
    NewSocialScan {
        platform: "telegram".into(),
        username: username.into(),
        profile_link: None,
        post_text: post_text.into(),
        links: None,
        contact_info: None,
        media_files: Vec::new(),
    }
}

fn verdict(risk: RiskLevel, score: i32) -> Verdict {
    Verdict {
        overall_risk: risk,
        risk_score: score,
        fraud_probability: score as f64 / 100.0,
        risk_keywords: vec!["guaranteed returns".into()],
        recommendations: vec!["Verify advisor".into()],
    }
}

#[tokio::test]
async fn high_risk_verdict_sets_flagged() {
    let r = repo();
    let o = r.create_offer(offer("guaranteed 50% returns, act now")).await.unwrap();
    assert!(!o.flagged);

    let o = r.attach_offer_verdict(o.id, verdict(RiskLevel::High, 92)).await.unwrap();
    assert!(o.flagged);
    assert_eq!(o.overall_risk, Some(RiskLevel::High));
}

#[tokio::test]
async fn low_risk_verdict_leaves_unflagged() {
    let r = repo();
    let o = r.create_offer(offer("index fund newsletter")).await.unwrap();
    let o = r.attach_offer_verdict(o.id, verdict(RiskLevel::Low, 8)).await.unwrap();
    assert!(!o.flagged);
}

#[tokio::test]
async fn verdict_round_trip() {
    let r = repo();
    let o = r.create_offer(offer("crypto doubler")).await.unwrap();
    let attached = verdict(RiskLevel::Medium, 55);
    r.attach_offer_verdict(o.id, attached.clone()).await.unwrap();

    let fetched = r.get_offer(o.id).await.unwrap();
    assert_eq!(fetched.overall_risk, Some(attached.overall_risk));
    assert_eq!(fetched.risk_score, Some(attached.risk_score));
    assert_eq!(fetched.fraud_probability, Some(attached.fraud_probability));
    assert_eq!(fetched.risk_keywords, attached.risk_keywords);
    assert_eq!(fetched.recommendations, attached.recommendations);
}

#[tokio::test]
async fn attach_verdict_unknown_offer_is_not_found() {
    let r = repo();
    let err = r.attach_offer_verdict(999, verdict(RiskLevel::Low, 1)).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn flagging_is_idempotent_and_preserves_history() {
    let r = repo();
    let o = r.create_offer(offer("ponzi pool")).await.unwrap();

    let f1 = r
        .create_flag(NewFlag {
            offer_id: o.id,
            flagged_by: "regulator-7".into(),
            reason: "unregistered advisor".into(),
            risk_score: Some(80),
        })
        .await
        .unwrap();
    assert!(r.get_offer(o.id).await.unwrap().flagged);

    // second flag: flagged stays true, both flags listed
    let f2 = r
        .create_flag(NewFlag {
            offer_id: o.id,
            flagged_by: "regulator-8".into(),
            reason: "victim report".into(),
            risk_score: None,
        })
        .await
        .unwrap();
    assert!(r.get_offer(o.id).await.unwrap().flagged);

    let flagged = r.list_flagged_offers().await.unwrap();
    assert_eq!(flagged.len(), 1);
    let ids: Vec<_> = flagged[0].flags.iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![f1.id, f2.id]);
}

#[tokio::test]
async fn flag_on_unknown_offer_is_not_found() {
    let r = repo();
    let err = r
        .create_flag(NewFlag {
            offer_id: 42,
            flagged_by: "x".into(),
            reason: "y".into(),
            risk_score: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn legitimacy_three_states() {
    let r = repo();
    assert_eq!(r.offer_legitimacy(123).await.unwrap(), Legitimacy::Pending);

    let o = r.create_offer(offer("dividend club")).await.unwrap();
    assert_eq!(r.offer_legitimacy(o.id).await.unwrap(), Legitimacy::Legit);

    r.create_flag(NewFlag {
        offer_id: o.id,
        flagged_by: "mod".into(),
        reason: "spam".into(),
        risk_score: None,
    })
    .await
    .unwrap();
    assert_eq!(r.offer_legitimacy(o.id).await.unwrap(), Legitimacy::Flagged);
}

#[tokio::test]
async fn flagged_list_is_newest_first() {
    let r = repo();
    let older = r.create_offer(offer("first scheme")).await.unwrap();
    let newer = r.create_offer(offer("second scheme")).await.unwrap();
    r.attach_offer_verdict(older.id, verdict(RiskLevel::High, 90)).await.unwrap();
    r.attach_offer_verdict(newer.id, verdict(RiskLevel::High, 91)).await.unwrap();

    let flagged = r.list_flagged_offers().await.unwrap();
    assert_eq!(flagged.len(), 2);
    assert_eq!(flagged[0].offer.id, newer.id);
    assert_eq!(flagged[1].offer.id, older.id);
}

#[tokio::test]
async fn symbol_search_is_case_insensitive_newest_first() {
    let r = repo();
    let a = r.create_scan(scan("pumper1", "Buy $ACME before earnings")).await.unwrap();
    let b = r.create_scan(scan("pumper2", "acme is going to the moon")).await.unwrap();
    r.create_scan(scan("other", "unrelated ticker talk")).await.unwrap();

    let hits = r.find_by_symbol("ACME").await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, b.id);
    assert_eq!(hits[1].id, a.id);

    let hits = r.find_by_symbol("acme").await.unwrap();
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn symbol_search_treats_wildcard_characters_literally() {
    let r = repo();
    r.create_scan(scan("pumper1", "Buy $ACME before earnings")).await.unwrap();
    let literal = r.create_scan(scan("pumper2", "the A_ME ticker is fake")).await.unwrap();

    // "_" and "%" are plain characters in a symbol, not pattern wildcards
    let hits = r.find_by_symbol("A_ME").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, literal.id);

    let hits = r.find_by_symbol("%").await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn moderation_tag_does_not_touch_flagged() {
    let r = repo();
    let s = r.create_scan(scan("pumper", "guaranteed 10x")).await.unwrap();
    let s = r.attach_scan_verdict(s.id, verdict(RiskLevel::High, 95)).await.unwrap();
    assert!(s.flagged);

    let s = r.set_moderation(s.id, ModerationTag::FalsePositive).await.unwrap();
    assert_eq!(s.ai_verdict, Some(ModerationTag::FalsePositive));
    assert!(s.flagged, "moderation must not clear the flagged bit");

    let s = r.set_moderation(s.id, ModerationTag::Reported).await.unwrap();
    assert_eq!(s.ai_verdict, Some(ModerationTag::Reported));
}

#[tokio::test]
async fn upsert_user_preserves_role_on_relogin() {
    let r = repo();
    let created = r
        .upsert_user(NewUser {
            id: "u-1".into(),
            email: "reg@example.com".into(),
            name: Some("Reg".into()),
            role: fraudwatch::auth::Role::Regulator,
        })
        .await
        .unwrap();
    assert_eq!(created.role, fraudwatch::auth::Role::Regulator);

    // login path upserts with the default role; the stored one must survive
    let again = r
        .upsert_user(NewUser {
            id: "u-1".into(),
            email: "reg@example.com".into(),
            name: None,
            role: fraudwatch::auth::Role::Investor,
        })
        .await
        .unwrap();
    assert_eq!(again.role, fraudwatch::auth::Role::Regulator);
    assert_eq!(again.name.as_deref(), Some("Reg"));
}
