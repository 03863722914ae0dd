//! HTTP API driven through `actix_web::test` with a simulated meter.

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use hp4280a_lab::config::{InstrumentConfig, LabConfig};
use hp4280a_lab::data::CsvStore;
use hp4280a_lab::database::{Store, ADMIN_EMAIL, ADMIN_PASSWORD, DEMO_EMAIL, DEMO_PASSWORD};
use hp4280a_lab::server::{self, AppState};
use hp4280a_lab::session::SessionRegistry;
use serde_json::{json, Value};
use std::path::Path;

async fn state(dir: &Path) -> AppState {
    let mut config = LabConfig::default();
    config.instrument = InstrumentConfig {
        simulated: true,
        write_delay_ms: 0,
        query_delay_ms: 0,
        ..InstrumentConfig::default()
    };
    config.storage.uploads_dir = dir.join("uploads");
    config.storage.database_url = format!("sqlite://{}?mode=rwc", dir.join("lab.db").display());

    let store = Store::connect(&config.storage.database_url).await.unwrap();
    store.init_db().await.unwrap();
    let sessions = SessionRegistry::new(
        config.instrument.clone(),
        CsvStore::new(config.storage.uploads_dir.clone()),
    );
    AppState::new(config, store, sessions)
}

macro_rules! app {
    ($dir:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(state($dir).await))
                .configure(server::configure),
        )
        .await
    };
}

macro_rules! login {
    ($app:expr, $email:expr, $password:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/login")
            .set_json(json!({ "email": $email, "password": $password }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&$app, req).await;
        assert_eq!(body["status"], "success", "{body}");
        body["access_token"].as_str().unwrap().to_string()
    }};
}

fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

#[actix_web::test]
async fn demo_login_connects_the_simulated_meter() {
    let dir = tempfile::tempdir().unwrap();
    let app = app!(dir.path());

    let req = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({ "email": DEMO_EMAIL, "password": DEMO_PASSWORD }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("Authorization"));
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body["message"],
        "Login successful! Device connection established."
    );
    assert_eq!(body["connection"]["status"], "success");
    assert!(body["user"].get("password").is_none());

    let token = body["access_token"].as_str().unwrap();
    let req = test::TestRequest::get()
        .uri("/api/status")
        .insert_header(bearer(token))
        .to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["terminal_output"][0], "Connection to device established.");
}

#[actix_web::test]
async fn bad_credentials_and_missing_token() {
    let dir = tempfile::tempdir().unwrap();
    let app = app!(dir.path());

    let req = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({ "email": "nobody@lab.org", "password": "x" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Email not found. Please register.");

    let req = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({ "email": DEMO_EMAIL, "password": "wrong" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get().uri("/api/status").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/api/status")
        .insert_header(bearer("not-a-jwt"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn registration_then_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let app = app!(dir.path());
    let form = json!({
        "first_name": "Ada",
        "last_name": "Lovelace",
        "email": "ada@lab.org",
        "password": "engine",
    });

    let req = test::TestRequest::post()
        .uri("/api/register")
        .set_json(&form)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = test::TestRequest::post()
        .uri("/api/register")
        .set_json(&form)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    login!(app, "ada@lab.org", "engine");
}

#[actix_web::test]
async fn malformed_json_is_a_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = app!(dir.path());

    let req = test::TestRequest::post()
        .uri("/api/login")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn measurement_round_trip_through_history() {
    let dir = tempfile::tempdir().unwrap();
    let app = app!(dir.path());
    let token = login!(app, DEMO_EMAIL, DEMO_PASSWORD);

    let req = test::TestRequest::post()
        .uri("/api/parameters")
        .insert_header(bearer(&token))
        .set_json(json!({
            "action": "update_settings",
            "sweep_type": "voltage",
            "dc_bias_v": 1.0,
            "start_v": 0.0,
            "stop_v": 1.0,
            "step_v": 0.25,
            "hold_time_s": 0.05,
            "step_time_s": 0.05,
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["message"], "Voltage settings updated successfully!");

    let req = test::TestRequest::get()
        .uri("/api/parameters")
        .insert_header(bearer(&token))
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["step_count"], 5.0);
    assert_eq!(view["settings"]["sweep"]["stop_v"], 1.0);

    let req = test::TestRequest::post()
        .uri("/api/measurements")
        .insert_header(bearer(&token))
        .set_json(json!({ "sweep_type": "voltage" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let result: Value = test::read_body_json(resp).await;
    assert_eq!(result["test_type"], "C-V Measurement");
    let id = result["measurement_id"].as_i64().unwrap();
    let csv_file = result["csv_file"].as_str().unwrap().to_string();
    assert!(dir.path().join("uploads").join(&csv_file).is_file());

    let req = test::TestRequest::get()
        .uri("/api/history")
        .insert_header(bearer(&token))
        .to_request();
    let history: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(history.as_array().unwrap().len(), 1);

    let req = test::TestRequest::get()
        .uri(&format!("/api/measurements/{id}"))
        .insert_header(bearer(&token))
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["csv_file_name"], csv_file.as_str());
    assert_eq!(view["download_url"], format!("/uploads/{csv_file}"));
    assert_eq!(view["data"]["headers"], json!(["C", "G", "V"]));
    assert_eq!(view["data"]["rows"].as_array().unwrap().len(), 5);

    let req = test::TestRequest::get()
        .uri(&format!("/uploads/{csv_file}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/measurements/{id}"))
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(!dir.path().join("uploads").join(&csv_file).exists());
}

#[actix_web::test]
async fn configuration_actions() {
    let dir = tempfile::tempdir().unwrap();
    let app = app!(dir.path());
    let token = login!(app, DEMO_EMAIL, DEMO_PASSWORD);

    let req = test::TestRequest::post()
        .uri("/api/configuration")
        .insert_header(bearer(&token))
        .set_json(json!({ "action": "set_mode", "mode": "sweep" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/configuration")
        .insert_header(bearer(&token))
        .set_json(json!({ "action": "set_mode", "mode": "ct" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/api/parameters")
        .insert_header(bearer(&token))
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["settings"]["mode"], "ct");
}

#[actix_web::test]
async fn uploads_reject_path_traversal() {
    let dir = tempfile::tempdir().unwrap();
    let app = app!(dir.path());

    let req = test::TestRequest::get()
        .uri("/uploads/..%2Flab.db")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_client_error());

    let req = test::TestRequest::get()
        .uri("/uploads/missing.csv")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn admin_routes_need_the_admin_flag() {
    let dir = tempfile::tempdir().unwrap();
    let app = app!(dir.path());
    let demo = login!(app, DEMO_EMAIL, DEMO_PASSWORD);

    let req = test::TestRequest::get()
        .uri("/api/admin/users")
        .insert_header(bearer(&demo))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let admin = login!(app, ADMIN_EMAIL, ADMIN_PASSWORD);
    let req = test::TestRequest::get()
        .uri("/api/admin/users")
        .insert_header(bearer(&admin))
        .to_request();
    let list: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(list["logged_in_email"], ADMIN_EMAIL);
    let emails: Vec<&str> = list["users"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|u| u["email"].as_str())
        .collect();
    assert_eq!(emails, vec![ADMIN_EMAIL]);

    let req = test::TestRequest::get()
        .uri("/api/admin/measurements/export")
        .insert_header(bearer(&admin))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    assert!(body.starts_with(b"Measurement ID,Date,Time,Full Name,Test Type"));
}

#[actix_web::test]
async fn demo_user_cannot_open_settings() {
    let dir = tempfile::tempdir().unwrap();
    let app = app!(dir.path());
    let token = login!(app, DEMO_EMAIL, DEMO_PASSWORD);

    let req = test::TestRequest::get()
        .uri("/api/settings")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn logout_invalidates_the_token() {
    let dir = tempfile::tempdir().unwrap();
    let app = app!(dir.path());
    let token = login!(app, DEMO_EMAIL, DEMO_PASSWORD);

    let req = test::TestRequest::post()
        .uri("/api/logout")
        .insert_header(bearer(&token))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["message"], "You have been logged out.");

    let req = test::TestRequest::get()
        .uri("/api/status")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
