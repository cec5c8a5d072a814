#![cfg(feature = "inmem-store")]

use std::sync::Arc;
use std::time::Duration;

use actix_web::{test, App};
use fraudwatch::auth::{AuthProvider, HttpAuthProvider};
use fraudwatch::repo::inmem::InMemRepo;
use fraudwatch::scorer::{HttpScorer, Scorer};
use fraudwatch::{config, AppState};
use serial_test::serial;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("FW_DATA_DIR", tmp.path().to_str().unwrap());
}

fn state(provider: Option<Arc<dyn AuthProvider>>) -> AppState {
    // the scorer is never reached by auth endpoints; point it nowhere useful
    let scorer: Arc<dyn Scorer> = Arc::new(
        HttpScorer::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap(),
    );
    AppState {
        repo: Arc::new(InMemRepo::new()),
        scorer,
        auth: provider,
        rate_limiter: None,
    }
}

fn provider_for(server: &MockServer) -> Arc<dyn AuthProvider> {
    Arc::new(HttpAuthProvider::new(server.uri(), Duration::from_secs(2)).unwrap())
}

#[actix_web::test]
#[serial]
async fn signup_upserts_user_with_requested_role() {
    setup_env();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/signup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": null,
            "user": { "id": "uid-1", "email": "reg@example.com" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(Some(provider_for(&server)))))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/auth/signup")
        .set_json(serde_json::json!({
            "email": "reg@example.com",
            "password": "hunter22hunter22",
            "name": "Reg",
            "role": "regulator"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["message"], "Signup successful, verify your email!");
    assert_eq!(body["user"]["id"], "uid-1");
    assert_eq!(body["user"]["role"], "regulator");
}

#[actix_web::test]
#[serial]
async fn login_issues_jwt_usable_for_profile_and_logout() {
    setup_env();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(query_param("grant_type", "password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "provider-token-abc",
            "user": { "id": "uid-2", "email": "inv@example.com" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/logout"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(Some(provider_for(&server)))))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(serde_json::json!({
            "email": "inv@example.com",
            "password": "hunter22hunter22"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["user"]["role"], "investor");
    let token = body["token"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/api/auth/profile")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["user"]["id"], "uid-2");
    assert_eq!(body["user"]["email"], "inv@example.com");

    let req = test::TestRequest::post()
        .uri("/api/auth/logout")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["message"], "Logout successful");
}

#[actix_web::test]
#[serial]
async fn profile_rejects_missing_or_garbage_token() {
    setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(None)))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/auth/profile").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/auth/profile")
        .insert_header(("Authorization", "Bearer not-a-jwt"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
#[serial]
async fn provider_rejection_surfaces_its_message() {
    setup_env();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error_description": "Invalid login credentials"
        })))
        .mount(&server)
        .await;

    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(Some(provider_for(&server)))))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(serde_json::json!({
            "email": "inv@example.com",
            "password": "wrong"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["error"], "Invalid login credentials");
}

#[actix_web::test]
#[serial]
async fn auth_endpoints_degrade_without_provider() {
    setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(None)))
            .configure(config),
    )
    .await;

    for uri in ["/api/auth/signup", "/api/auth/login"] {
        let req = test::TestRequest::post()
            .uri(uri)
            .set_json(serde_json::json!({
                "email": "x@example.com",
                "password": "hunter22hunter22"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 503, "{uri} should answer 503 without a provider");
    }
}
