use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use dispatch_api::middleware::auth::{issue_token, ROLE_ADMIN, ROLE_DRIVER};
use dispatch_api::worker::WorkerSettings;
use dispatch_api::{app, AppSettings, AppState, AuthConfig, Stores};
use dispatch_core::events::TracingEventPublisher;
use dispatch_core::notification::LogPushProvider;
use dispatch_reservation::TransitionPolicy;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    auth: AuthConfig,
}

impl TestApp {
    fn new() -> Self {
        let auth = AuthConfig {
            secret: "test-secret".to_string(),
            expiration: 3600,
        };
        let settings = AppSettings {
            auth: auth.clone(),
            policy: TransitionPolicy::Strict,
            worker: WorkerSettings {
                max_attempts: 3,
                base_delay: Duration::from_millis(10),
                queue_capacity: 16,
            },
            allowed_origins: vec!["https://dispatch.example.com".to_string()],
        };
        let state = AppState::assemble(
            Stores::in_memory(),
            Arc::new(LogPushProvider),
            Arc::new(TracingEventPublisher),
            settings,
            None,
        );
        Self { router: app(state), auth }
    }

    fn token(&self, user_id: Uuid, role: &str) -> String {
        issue_token(&self.auth, user_id, role).unwrap()
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

fn new_reservation() -> Value {
    json!({
        "client_name": "Marie Laurent",
        "phone": "+33 6 12 34 56 78",
        "pickup_address": "Aéroport Charles de Gaulle, Terminal 2E",
        "destination": "15 Rue de Rivoli, Paris",
        "date": "2026-10-20T08:30:00+02:00",
        "passengers": 2,
        "luggage": 3,
        "vehicle_type": "berline",
        "payment_type": "card",
        "amount": "85.00",
        "commission": 17,
        "driver_amount": "68.00",
        "dispatcher": "Elite Transfers",
        "flight_number": "AF1234"
    })
}

async fn create(app: &TestApp, admin: &str) -> String {
    let (status, body) = app
        .call(Method::POST, "/v1/reservations", Some(admin), Some(new_reservation()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["reservation"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_is_public() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_requires_bearer_token() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/v1/reservations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = app
        .call(Method::GET, "/v1/reservations", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_driver_cannot_create_or_reach_admin_routes() {
    let app = TestApp::new();
    let driver = app.token(Uuid::new_v4(), ROLE_DRIVER);

    let (status, _) = app
        .call(Method::POST, "/v1/reservations", Some(&driver), Some(new_reservation()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = format!("/v1/admin/documents/{}/reject", Uuid::new_v4());
    let (status, _) = app
        .call(Method::POST, &uri, Some(&driver), Some(json!({ "reason": "Blurry scan of the licence" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_full_lifecycle_records_revenue() {
    let app = TestApp::new();
    let admin = app.token(Uuid::new_v4(), ROLE_ADMIN);
    let driver_id = Uuid::new_v4();
    let driver = app.token(driver_id, ROLE_DRIVER);
    let id = create(&app, &admin).await;

    let (status, buckets) = app.call(Method::GET, "/v1/reservations", Some(&driver), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(buckets["upcoming"].as_array().unwrap().len(), 1);

    for (step, expected, next) in [
        ("accept", "accepted", "start_ride"),
        ("start", "started", "arrive"),
        ("arrive", "arrived", "board_client"),
        ("board", "onBoard", "complete"),
    ] {
        let uri = format!("/v1/reservations/{}/{}", id, step);
        let (status, body) = app.call(Method::POST, &uri, Some(&driver), None).await;
        assert_eq!(status, StatusCode::OK, "{}: {}", step, body);
        assert_eq!(body["reservation"]["status"], expected);
        assert_eq!(body["actions"], json!([next]));
    }

    let uri = format!("/v1/reservations/{}/complete", id);
    let (status, body) = app
        .call(
            Method::POST,
            &uri,
            Some(&driver),
            Some(json!({ "rating": 5, "comment": "Très agréable", "distance": "32 km" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["reservation"]["status"], "completed");
    assert_eq!(body["actions"], json!([]));
    assert_eq!(body["reservation"]["rating"], 5);
    assert_eq!(body["reservation"]["driver_id"], driver_id.to_string());

    let (_, buckets) = app.call(Method::GET, "/v1/reservations", Some(&driver), None).await;
    assert_eq!(buckets["completed"].as_array().unwrap().len(), 1);
    assert!(buckets["current"].as_array().unwrap().is_empty());

    // The revenue sync runs on the background worker.
    let uri = format!("/v1/accounting/transactions?reservation_id={}", id);
    let mut transactions = Vec::new();
    for _ in 0..50 {
        let (_, body) = app.call(Method::GET, &uri, Some(&driver), None).await;
        transactions = body["transactions"].as_array().cloned().unwrap_or_default();
        if !transactions.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["transaction_type"], "revenue");
    assert_eq!(transactions[0]["amount"], "85.00");
}

#[tokio::test]
async fn test_skipping_states_is_a_conflict() {
    let app = TestApp::new();
    let admin = app.token(Uuid::new_v4(), ROLE_ADMIN);
    let driver = app.token(Uuid::new_v4(), ROLE_DRIVER);
    let id = create(&app, &admin).await;

    let (status, _) = app
        .call(Method::POST, &format!("/v1/reservations/{}/accept", id), Some(&driver), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(Method::POST, &format!("/v1/reservations/{}/complete", id), Some(&driver), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_driver_reject_only_hides_ride_from_that_driver() {
    let app = TestApp::new();
    let admin = app.token(Uuid::new_v4(), ROLE_ADMIN);
    let first = app.token(Uuid::new_v4(), ROLE_DRIVER);
    let second_id = Uuid::new_v4();
    let second = app.token(second_id, ROLE_DRIVER);
    let id = create(&app, &admin).await;

    let (status, body) = app
        .call(Method::POST, &format!("/v1/reservations/{}/reject", id), Some(&first), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["reservation"]["status"], "pending");
    assert_eq!(body["actions"], json!([]));

    let (_, buckets) = app.call(Method::GET, "/v1/reservations", Some(&first), None).await;
    assert!(buckets["upcoming"].as_array().unwrap().is_empty());
    let (_, buckets) = app.call(Method::GET, "/v1/reservations", Some(&second), None).await;
    assert_eq!(buckets["upcoming"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .call(Method::POST, &format!("/v1/reservations/{}/accept", id), Some(&second), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["reservation"]["driver_id"], second_id.to_string());
}

#[tokio::test]
async fn test_admin_reject_removes_reservation() {
    let app = TestApp::new();
    let admin = app.token(Uuid::new_v4(), ROLE_ADMIN);
    let id = create(&app, &admin).await;

    let (status, _) = app
        .call(Method::POST, &format!("/v1/reservations/{}/reject", id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(Method::GET, &format!("/v1/reservations/{}", id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_reservation_lists_field_errors() {
    let app = TestApp::new();
    let admin = app.token(Uuid::new_v4(), ROLE_ADMIN);

    let mut payload = new_reservation();
    payload["phone"] = json!("12");
    payload["vehicle_type"] = json!("limousine");

    let (status, body) = app
        .call(Method::POST, "/v1/reservations", Some(&admin), Some(payload))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["field"].as_str())
        .collect();
    assert!(fields.contains(&"phone"));
    assert!(fields.contains(&"vehicle_type"));
}

#[tokio::test]
async fn test_accounting_rejects_bad_type_with_400() {
    let app = TestApp::new();
    let driver = app.token(Uuid::new_v4(), ROLE_DRIVER);

    let (status, body) = app
        .call(
            Method::POST,
            "/v1/accounting/transactions",
            Some(&driver),
            Some(json!({
                "transaction_type": "bonus",
                "amount": 12.5,
                "category": "fuel",
                "transaction_date": "2026-10-18"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("transaction_type"));

    let (status, body) = app
        .call(
            Method::POST,
            "/v1/accounting/transactions",
            Some(&driver),
            Some(json!({
                "transaction_type": "expense",
                "amount": "12.50",
                "category": "fuel",
                "transaction_date": "2026-10-18"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["transaction"]["payment_status"], "pending");

    let (_, summary) = app.call(Method::GET, "/v1/accounting/summary", Some(&driver), None).await;
    assert_eq!(summary["total_expense"], "12.50");
    assert_eq!(summary["transaction_count"], 1);
}

#[tokio::test]
async fn test_undecodable_body_uses_error_envelope() {
    let app = TestApp::new();
    let driver = app.token(Uuid::new_v4(), ROLE_DRIVER);

    let (status, body) = app
        .call(
            Method::POST,
            "/v1/accounting/transactions",
            Some(&driver),
            Some(json!({
                "transaction_type": "expense",
                "category": "fuel",
                "transaction_date": "2026-10-18"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("amount"), "{}", body);

    let (status, body) = app
        .call(Method::PUT, "/v1/preferences/language", Some(&driver), Some(json!(["fr"])))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_document_rejection_reason_rules() {
    let app = TestApp::new();
    let admin = app.token(Uuid::new_v4(), ROLE_ADMIN);
    let uri = format!("/v1/admin/documents/{}/reject", Uuid::new_v4());

    let (status, body) = app
        .call(Method::POST, &uri, Some(&admin), Some(json!({ "reason": "  too short " })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"][0]["message"], "Reason must be at least 10 characters");

    let (status, body) = app
        .call(
            Method::POST,
            &uri,
            Some(&admin),
            Some(json!({ "reason": "  Permis de conduire expiré  " })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["rejection"]["reason"], "Permis de conduire expiré");
}

#[tokio::test]
async fn test_language_preference_round_trip() {
    let app = TestApp::new();
    let driver = app.token(Uuid::new_v4(), ROLE_DRIVER);

    let (status, body) = app
        .call(Method::GET, "/v1/preferences/language", Some(&driver), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["language"], "fr");

    let (status, _) = app
        .call(Method::PUT, "/v1/preferences/language", Some(&driver), Some(json!({ "language": "EN" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app
        .call(Method::GET, "/v1/preferences/language", Some(&driver), None)
        .await;
    assert_eq!(body["language"], "en");

    let (status, _) = app
        .call(Method::PUT, "/v1/preferences/language", Some(&driver), Some(json!({ "language": "pt" })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_device_token_and_direct_notification() {
    let app = TestApp::new();
    let admin = app.token(Uuid::new_v4(), ROLE_ADMIN);
    let driver_id = Uuid::new_v4();
    let driver = app.token(driver_id, ROLE_DRIVER);
    let id = create(&app, &admin).await;

    let notify = json!({ "reservation_id": id, "driver_id": driver_id });
    let (status, body) = app
        .call(Method::POST, "/v1/notifications/send", Some(&admin), Some(notify.clone()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "driver has not enabled notifications");

    let (status, _) = app
        .call(Method::PUT, "/v1/devices/token", Some(&driver), Some(json!({ "token": "fcm-token-abc" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(Method::POST, "/v1/notifications/send", Some(&admin), Some(notify))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["driver_id"], driver_id.to_string());

    let (status, body) = app.call(Method::DELETE, "/v1/devices/token", Some(&driver), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], true);
}
