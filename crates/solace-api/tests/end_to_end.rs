use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use serde_json::{Value, json};
use tower::ServiceExt;

use solace_api::tokens::TokenSettings;
use solace_api::{AppStateInner, router};
use solace_chat::completion::CompletionRequest;
use solace_chat::{
    CompletionBackend, CompletionClient, CompletionError, ConversationStore, CrisisDetector,
    Dispatcher,
};
use solace_db::Database;

#[derive(Default)]
struct StubBackend {
    fail: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl CompletionBackend for StubBackend {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(CompletionError::Status {
                status: 503,
                body: "overloaded".into(),
            })
        } else {
            Ok("Gracias por contármelo. ¿Qué te ayudaría ahora?".into())
        }
    }
}

struct TestApp {
    router: Router,
    backend: Arc<StubBackend>,
}

impl TestApp {
    fn new() -> Self {
        Self::with_backend(StubBackend::default())
    }

    fn with_backend(backend: StubBackend) -> Self {
        let backend = Arc::new(backend);
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new(
            ConversationStore::new(),
            CompletionClient::new(backend.clone(), Duration::from_secs(2)),
            CrisisDetector::default(),
            db.clone(),
        );
        let state = Arc::new(AppStateInner {
            db,
            dispatcher,
            tokens: TokenSettings::new(
                "integration-secret",
                chrono::Duration::minutes(60),
                chrono::Duration::days(30),
            ),
            started_at: Utc::now(),
            development: false,
        });
        Self {
            router: router(state),
            backend,
        }
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
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

    /// Register a user and return the access token.
    async fn register(&self, email: &str) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({ "name": "Ana", "email": email, "password": "s3cret-pass" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["tokens"]["accessToken"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn register_login_and_chat() {
    let app = TestApp::new();

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "name": "Ana", "email": "Ana@Example.com", "password": "s3cret-pass", "age": 29 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["email"], "ana@example.com");
    assert_eq!(body["user"]["subscription"]["tier"], "free");
    assert!(body["user"].get("password").is_none());
    assert_eq!(body["tokens"]["tokenType"], "Bearer");

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "ana@example.com", "password": "s3cret-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["user"].get("password").is_none());
    let token = body["tokens"]["accessToken"].as_str().unwrap().to_string();

    let (status, body) = app.call("POST", "/api/chat/session/start", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"]["type"], "welcome");
    assert_eq!(body["sessionsRemaining"], 4);
    let conversation_id = body["conversationId"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            "POST",
            "/api/chat/message",
            Some(&token),
            Some(json!({ "conversationId": conversation_id, "message": "Me siento ansioso hoy" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["conversationId"], conversation_id.as_str());
    assert_eq!(body["message"]["role"], "assistant");
    assert_eq!(body["message"]["type"], "text");
    let suggestions: Vec<&str> = body["suggestions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(suggestions.contains(&"Probar un ejercicio de respiración"));

    let (status, body) = app
        .call("GET", &format!("/api/chat/session/{}", conversation_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let roles: Vec<&str> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["role"].as_str())
        .collect();
    assert_eq!(roles, ["assistant", "user", "assistant"]);

    let (status, body) = app.call("GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["stats"]["totalSessions"], 1);
    assert_eq!(body["user"]["stats"]["totalMessages"], 1);
    assert_eq!(body["user"]["stats"]["streakDays"], 1);
    assert!(body["user"]["lastLogin"].is_string());

    let (status, body) = app
        .call(
            "POST",
            "/api/chat/session/end",
            Some(&token),
            Some(json!({ "conversationId": conversation_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messageCount"], 3);
    assert_eq!(app.backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn short_password_signup_then_quick_chat() {
    let app = TestApp::new();

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "name": "Ana", "email": "ana@x.com", "password": "secret1" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "ana@x.com", "password": "secret1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["tokens"]["accessToken"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            "POST",
            "/api/chat",
            Some(&token),
            Some(json!({ "message": "me siento ansioso" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["type"], "crisis");
    assert!(body["reply"].as_str().is_some_and(|r| !r.is_empty()));
    let suggestions: Vec<&str> = body["suggestions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(suggestions.contains(&"Probar un ejercicio de respiración"));
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let app = TestApp::new();
    app.register("ana@example.com").await;

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "name": "Otra", "email": "ANA@example.com", "password": "another-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["details"][0]["field"], "email");
}

#[tokio::test]
async fn registration_requires_password() {
    let app = TestApp::new();

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "name": "Ana", "email": "ana@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "name": "Ana", "email": "ana@example.com", "password": "short" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "password");
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = TestApp::new();

    let (status, _) = app.call("GET", "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.call("GET", "/api/auth/me", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn mood_range_is_enforced() {
    let app = TestApp::new();
    let token = app.register("ana@example.com").await;

    for mood in [0, 11, -3] {
        let (status, body) = app
            .call("POST", "/api/progress", Some(&token), Some(json!({ "mood": mood })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "mood {}", mood);
        assert_eq!(body["details"][0]["field"], "mood");
    }

    let (status, body) = app
        .call(
            "POST",
            "/api/progress",
            Some(&token),
            Some(json!({ "mood": 7, "note": "  buen día  " })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entry"]["mood"], 7);
    assert_eq!(body["entry"]["note"], "buen día");
    assert_eq!(body["averageMood"], 7.0);
    assert_eq!(body["totalEntries"], 1);

    let (status, body) = app.call("GET", "/api/progress/mood", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"].as_array().unwrap().len(), 1);
    assert_eq!(body["entries"][0]["mood"], 7);

    let (status, body) = app.call("GET", "/api/progress/overview", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["latestMood"], 7);
    assert_eq!(body["moodTrend"], "insufficient_data");
    assert_eq!(body["weeklySessionLimit"], 5);
}

#[tokio::test]
async fn free_plan_allows_five_sessions_per_week() {
    let app = TestApp::new();
    let token = app.register("ana@example.com").await;

    for expected_remaining in (0..5).rev() {
        let (status, body) = app.call("POST", "/api/chat/session/start", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessionsRemaining"], expected_remaining);
    }

    let (status, body) = app.call("POST", "/api/chat/session/start", Some(&token), None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "session_limit_reached");

    let (_, body) = app.call("GET", "/api/progress/overview", Some(&token), None).await;
    assert_eq!(body["sessionsThisWeek"], 5);
    assert_eq!(body["sessionsRemaining"], 0);
}

#[tokio::test]
async fn crisis_message_returns_resources_without_model_call() {
    let app = TestApp::new();
    let token = app.register("ana@example.com").await;

    let (status, body) = app
        .call(
            "POST",
            "/api/chat",
            Some(&token),
            Some(json!({ "message": "Ya no quiero vivir" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "crisis");
    assert_eq!(body["resources"]["urgency"], "high");
    assert_eq!(body["resources"]["language"], "es");
    assert!(!body["resources"]["resources"].as_array().unwrap().is_empty());
    assert_eq!(app.backend.calls.load(Ordering::SeqCst), 0);

    let (_, body) = app.call("GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(body["user"]["stats"]["totalMessages"], 0);
}

#[tokio::test]
async fn unknown_language_tag_still_gets_crisis_resources() {
    let app = TestApp::new();
    let token = app.register("ana@example.com").await;

    for tag in ["fr", "en-US"] {
        let (status, body) = app
            .call(
                "POST",
                "/api/chat",
                Some(&token),
                Some(json!({ "message": "I want to die", "context": { "language": tag } })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}: {}", tag, body);
        assert_eq!(body["type"], "crisis");
        let expected = if tag == "fr" { "es" } else { "en" };
        assert_eq!(body["resources"]["language"], expected);
    }
    assert_eq!(app.backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn model_outage_still_answers() {
    let app = TestApp::with_backend(StubBackend {
        fail: true,
        ..Default::default()
    });
    let token = app.register("ana@example.com").await;

    let (status, body) = app
        .call(
            "POST",
            "/api/chat",
            Some(&token),
            Some(json!({
                "message": "No he dormido bien",
                "history": [{ "role": "user", "content": "hola" }],
                "context": { "mood": 4, "language": "en" }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "fallback");
    assert!(!body["reply"].as_str().unwrap().is_empty());
    assert_eq!(app.backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn chat_message_length_is_capped() {
    let app = TestApp::new();
    let token = app.register("ana@example.com").await;

    for message in [String::from("   "), "a".repeat(1001)] {
        let (status, body) = app
            .call("POST", "/api/chat", Some(&token), Some(json!({ "message": message })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"][0]["field"], "message");
    }
    assert_eq!(app.backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn conversations_are_private() {
    let app = TestApp::new();
    let owner = app.register("ana@example.com").await;
    let other = app.register("luis@example.com").await;

    let (_, body) = app.call("POST", "/api/chat/session/start", Some(&owner), None).await;
    let conversation_id = body["conversationId"].as_str().unwrap().to_string();

    let (status, _) = app
        .call(
            "POST",
            "/api/chat/message",
            Some(&other),
            Some(json!({ "conversationId": conversation_id, "message": "hola" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            "POST",
            "/api/chat/message",
            Some(&owner),
            Some(json!({ "conversationId": "conv_unknown", "message": "hola" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn repeated_failures_lock_the_account() {
    let app = TestApp::new();
    app.register("ana@example.com").await;

    for _ in 0..5 {
        let (status, _) = app
            .call(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "email": "ana@example.com", "password": "wrong-pass" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "ana@example.com", "password": "s3cret-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(body["error"], "account_locked");
}

#[tokio::test]
async fn refresh_tokens_rotate() {
    let app = TestApp::new();
    let (_, body) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "name": "Ana", "email": "ana@example.com", "password": "s3cret-pass" })),
        )
        .await;
    let refresh = body["tokens"]["refreshToken"].as_str().unwrap().to_string();

    let (status, body) = app
        .call("POST", "/api/auth/refresh", None, Some(json!({ "refreshToken": refresh })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["tokens"]["refreshToken"], refresh.as_str());

    let (status, _) = app
        .call("POST", "/api/auth/refresh", None, Some(json!({ "refreshToken": refresh })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn profile_update_accepts_only_known_fields() {
    let app = TestApp::new();
    let token = app.register("ana@example.com").await;

    let (status, _) = app
        .call(
            "PATCH",
            "/api/auth/profile",
            Some(&token),
            Some(json!({ "subscription": { "tier": "premium" } })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(
            "PUT",
            "/api/auth/profile",
            Some(&token),
            Some(json!({ "name": "Ana María", "preferences": { "language": "en" } })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["name"], "Ana María");
    assert_eq!(body["user"]["preferences"]["language"], "en");
    assert_eq!(body["user"]["subscription"]["tier"], "free");
}

#[tokio::test]
async fn deactivated_account_stops_working() {
    let app = TestApp::new();
    let token = app.register("ana@example.com").await;

    let (_, body) = app.call("POST", "/api/chat/session/start", Some(&token), None).await;
    let conversation_id = body["conversationId"].as_str().unwrap().to_string();

    let (status, _) = app.call("DELETE", "/api/auth/account", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.call("GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call("POST", "/api/chat", Some(&token), Some(json!({ "message": "hola" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(
            "POST",
            "/api/chat/message",
            Some(&token),
            Some(json!({ "conversationId": conversation_id, "message": "hola" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call("GET", &format!("/api/chat/session/{}", conversation_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.backend.calls.load(Ordering::SeqCst), 0);

    let (status, _) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "ana@example.com", "password": "s3cret-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_reports_ok() {
    let app = TestApp::new();
    let (status, body) = app.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["activeConversations"], 0);
}
