mod assets;
mod auth;
mod bank_webhook;
mod error;
mod ledger;

pub use auth::{AuthenticatedUser, SESSION_COOKIE};
pub use bank_webhook::SECRET_HEADER;
pub use error::ApiError;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Json, Router,
};

use crate::{
    config::Config,
    model::Catalog,
    orchestrator::TransactionOrchestrator,
    session::SessionStore,
    settlement::SettlementClient,
    store::LedgerStore,
    webhook::WebhookHandler,
};

/// Everything a handler may need, shared across requests.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LedgerStore>,
    pub sessions: Arc<SessionStore>,
    pub catalog: Arc<Catalog>,
    pub orchestrator: Arc<TransactionOrchestrator>,
    pub webhooks: Arc<WebhookHandler>,
}

impl AppState {
    pub fn new(config: &Config, settlement: Arc<dyn SettlementClient + Send + Sync>) -> Self {
        let store = Arc::new(LedgerStore::new());
        let catalog = Arc::new(Catalog::standard());
        let orchestrator = TransactionOrchestrator::new(
            store.clone(),
            settlement,
            catalog.clone(),
            &config.frontend_url,
            &config.bank_frontend_url,
        );
        let webhooks = WebhookHandler::new(store.clone(), config.bank_webhook_secret.clone());

        Self {
            store,
            sessions: Arc::new(SessionStore::new(config.session_ttl)),
            catalog,
            orchestrator: Arc::new(orchestrator),
            webhooks: Arc::new(webhooks),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/user/me", get(auth::me))
        .route("/user/balance", get(ledger::balance))
        .route("/deposit", post(ledger::deposit))
        .route("/withdraw", post(ledger::withdraw))
        .route("/transaction", get(ledger::transactions))
        .route("/transaction/statement", get(ledger::statement))
        .route("/webhook/bank", post(bank_webhook::settle))
        .route("/assets/catalog", get(assets::catalog))
        .route("/assets/my", get(assets::owned))
        .route("/assets/buy", post(assets::buy));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .with_state(state)
}

async fn health() -> Json<&'static str> {
    Json("Healthy")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use rstest::rstest;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{
        config::Config,
        model::Amount,
        settlement::{mock::MockSettlementClient, SettlementError},
        store::AccountStore,
    };

    use super::{router, AppState};

    struct TestApp {
        router: Router,
        state: AppState,
        settlement: MockSettlementClient,
    }

    impl TestApp {
        fn new(vars: &[(&str, &str)]) -> Self {
            let vars: Vec<(String, String)> = vars
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect();
            let config = Config::from_lookup(|name| {
                vars.iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| value.clone())
            })
            .unwrap();
            let settlement = MockSettlementClient::new();
            let state = AppState::new(&config, Arc::new(settlement.clone()));
            Self {
                router: router(state.clone()),
                state,
                settlement,
            }
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            session: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(session) = session {
                request = request.header(header::AUTHORIZATION, format!("Bearer {session}"));
            }
            let request = match body {
                Some(body) => request
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string())),
                None => request.body(Body::empty()),
            }
            .unwrap();
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, body)
        }

        async fn signup(&self, email: &str) -> String {
            let (status, body) = self
                .call(
                    Method::POST,
                    "/api/auth/signup",
                    None,
                    Some(json!({ "email": email })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            body["sessionId"].as_str().unwrap().to_string()
        }

        async fn fund(&self, session: &str, amount: u128) {
            let user_id = self.state.sessions.resolve(session).unwrap();
            self.state
                .store
                .credit(user_id, Amount::new(amount).unwrap())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = TestApp::new(&[]);
        assert_eq!(
            app.call(Method::GET, "/health", None, None).await,
            (StatusCode::OK, json!("Healthy"))
        );
    }

    #[rstest]
    #[case(Method::GET,  "/api/user/me")]
    #[case(Method::GET,  "/api/user/balance")]
    #[case(Method::GET,  "/api/transaction")]
    #[case(Method::GET,  "/api/transaction/statement")]
    #[case(Method::GET,  "/api/assets/my")]
    #[case(Method::POST, "/api/deposit")]
    #[case(Method::POST, "/api/withdraw")]
    #[case(Method::POST, "/api/assets/buy")]
    #[tokio::test]
    async fn user_routes_require_a_session(#[case] method: Method, #[case] uri: &str) {
        let app = TestApp::new(&[]);
        for session in [None, Some("6f9619ff-8b86-d011-b42d-00cf4fc964ff")] {
            assert_eq!(
                app.call(method.clone(), uri, session, Some(json!({}))).await,
                (StatusCode::UNAUTHORIZED, json!({ "error": "Unauthorized" }))
            );
        }
    }

    #[tokio::test]
    async fn signing_up_twice_with_one_email_conflicts() {
        let app = TestApp::new(&[]);
        let session = app.signup("ada@example.com").await;

        assert_eq!(
            app.call(Method::GET, "/api/user/balance", Some(&session), None)
                .await,
            (StatusCode::OK, json!({ "balance": "0" }))
        );
        assert_eq!(
            app.call(
                Method::POST,
                "/api/auth/signup",
                None,
                Some(json!({ "email": "ADA@example.com" }))
            )
            .await,
            (
                StatusCode::CONFLICT,
                json!({ "error": "Email already registered" })
            )
        );
    }

    #[tokio::test]
    async fn users_can_log_in_again_once_their_session_expired() {
        let app = TestApp::new(&[("SESSION_TTL_SECS", "1")]);
        let expired = app.signup("ada@example.com").await;
        app.fund(&expired, 75).await;
        tokio::time::sleep(std::time::Duration::from_millis(1_100)).await;
        assert_eq!(
            app.call(Method::GET, "/api/user/balance", Some(&expired), None)
                .await,
            (StatusCode::UNAUTHORIZED, json!({ "error": "Unauthorized" }))
        );

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "email": " Ada@Example.com" }).to_string()))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .to_string();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        let session = body["sessionId"].as_str().unwrap();
        assert_ne!(session, expired);
        assert!(cookie.starts_with(&format!("session_id={session};")));

        assert_eq!(
            app.call(Method::GET, "/api/user/balance", Some(session), None)
                .await,
            (StatusCode::OK, json!({ "balance": "75" }))
        );
        assert_eq!(
            app.call(Method::GET, "/api/user/me", Some(session), None)
                .await,
            (
                StatusCode::OK,
                json!({ "user": { "id": body["userId"], "email": "ada@example.com" } })
            )
        );
    }

    #[rstest]
    #[case("grace@example.com")]
    #[case("not-an-email")]
    #[tokio::test]
    async fn unknown_emails_cannot_log_in(#[case] email: &str) {
        let app = TestApp::new(&[]);
        app.signup("ada@example.com").await;

        assert_eq!(
            app.call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": email }))
            )
            .await,
            (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Invalid credentials" })
            )
        );
    }

    #[rstest]
    #[case(json!({ "amount": "12.5" }))]
    #[case(json!({ "amount": "-5" }))]
    #[case(json!({ "amount": "abc" }))]
    #[case(json!({ "amount": 0 }))]
    #[case(json!({}))]
    #[tokio::test]
    async fn invalid_amounts_are_bad_requests(#[case] body: Value) {
        let app = TestApp::new(&[]);
        let session = app.signup("ada@example.com").await;

        for uri in ["/api/deposit", "/api/withdraw"] {
            assert_eq!(
                app.call(Method::POST, uri, Some(&session), Some(body.clone()))
                    .await,
                (
                    StatusCode::BAD_REQUEST,
                    json!({ "error": "Amount must be a positive integer." })
                )
            );
        }
    }

    #[tokio::test]
    async fn a_deposit_returns_the_approval_url() {
        let app = TestApp::new(&[
            ("FRONTEND_URL", "https://app.example.com"),
            ("BANK_FRONTEND_URL", "https://bank.example.com"),
        ]);
        let session = app.signup("ada@example.com").await;
        app.settlement.expect_deposit_order(
            Amount::new(500).unwrap(),
            "https://app.example.com/me",
            Ok("bank_tok_9".to_string()),
        );

        let (status, body) = app
            .call(
                Method::POST,
                "/api/deposit",
                Some(&session),
                Some(json!({ "amount": "500" })),
            )
            .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["bank_token"], "bank_tok_9");
        assert_eq!(
            body["url"],
            "https://bank.example.com/bank/approve?token=bank_tok_9"
        );
        assert_eq!(
            body["reference"].as_str().unwrap(),
            app.settlement.references()[0].as_str()
        );
    }

    #[rstest]
    #[case(SettlementError::MissingToken,         "Bank API did not return a bank token.")]
    #[case(SettlementError::Timeout,              "Unable to register deposit with bank API.")]
    #[case(SettlementError::UnexpectedStatus(500), "Unable to register deposit with bank API.")]
    #[tokio::test]
    async fn partner_failures_on_deposit_are_bad_gateways(
        #[case] error: SettlementError,
        #[case] message: &str,
    ) {
        let app = TestApp::new(&[]);
        let session = app.signup("ada@example.com").await;
        app.settlement.expect_deposit_order(
            Amount::new(500).unwrap(),
            "http://localhost:3000/me",
            Err(error),
        );

        assert_eq!(
            app.call(
                Method::POST,
                "/api/deposit",
                Some(&session),
                Some(json!({ "amount": 500 }))
            )
            .await,
            (StatusCode::BAD_GATEWAY, json!({ "error": message }))
        );
        assert_eq!(
            app.call(Method::GET, "/api/transaction", Some(&session), None)
                .await,
            (StatusCode::OK, json!({ "transactions": [] }))
        );
    }

    #[rstest]
    //     partner answer,                status,                  error
    #[case(Ok(true),                      StatusCode::CREATED,     None)]
    #[case(Ok(false),                     StatusCode::BAD_GATEWAY, Some("Bank rejected withdrawal request."))]
    #[case(Err(SettlementError::Timeout), StatusCode::BAD_GATEWAY, Some("Unable to complete withdraw"))]
    #[tokio::test]
    async fn withdrawals_answer_with_the_saga_outcome(
        #[case] answer: Result<bool, SettlementError>,
        #[case] expected_status: StatusCode,
        #[case] expected_error: Option<&str>,
    ) {
        let app = TestApp::new(&[]);
        let session = app.signup("ada@example.com").await;
        app.fund(&session, 100).await;
        let user_id = app.state.sessions.resolve(&session).unwrap();
        app.settlement
            .expect_withdrawal(user_id, Amount::new(40).unwrap(), answer);

        let (status, body) = app
            .call(
                Method::POST,
                "/api/withdraw",
                Some(&session),
                Some(json!({ "amount": "40" })),
            )
            .await;

        assert_eq!(status, expected_status);
        let expected_balance = match expected_error {
            None => {
                assert_eq!(body["ok"], true);
                assert_eq!(body["balance"], "60");
                "60"
            }
            Some(error) => {
                assert_eq!(body, json!({ "error": error }));
                "100"
            }
        };
        assert_eq!(
            app.call(Method::GET, "/api/user/balance", Some(&session), None)
                .await,
            (StatusCode::OK, json!({ "balance": expected_balance }))
        );
    }

    #[tokio::test]
    async fn withdrawing_more_than_the_balance_is_rejected() {
        let app = TestApp::new(&[]);
        let session = app.signup("ada@example.com").await;
        app.fund(&session, 100).await;

        assert_eq!(
            app.call(
                Method::POST,
                "/api/withdraw",
                Some(&session),
                Some(json!({ "amount": "150" }))
            )
            .await,
            (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Insufficient balance" })
            )
        );
        assert_eq!(
            app.call(Method::GET, "/api/transaction", Some(&session), None)
                .await,
            (StatusCode::OK, json!({ "transactions": [] }))
        );
    }

    #[tokio::test]
    async fn assets_can_be_bought_once() {
        let app = TestApp::new(&[]);
        let session = app.signup("ada@example.com").await;
        app.fund(&session, 300).await;
        let buy = json!({ "assetId": "api-observability-kit" });

        let (status, body) = app
            .call(Method::POST, "/api/assets/buy", Some(&session), Some(buy.clone()))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["ok"], true);
        assert_eq!(body["assetId"], "api-observability-kit");
        assert_eq!(body["balance"], "120");
        let reference = body["reference"].clone();

        assert_eq!(
            app.call(Method::POST, "/api/assets/buy", Some(&session), Some(buy))
                .await,
            (
                StatusCode::CONFLICT,
                json!({ "error": "Asset already purchased" })
            )
        );

        let (status, body) = app
            .call(Method::GET, "/api/assets/my", Some(&session), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["purchases"].as_array().unwrap().len(), 1);
        assert_eq!(body["purchases"][0]["assetId"], "api-observability-kit");
        assert_eq!(body["purchases"][0]["price"], "180");
        assert_eq!(body["purchases"][0]["transactionRef"], reference);
        assert!(reference.as_str().unwrap().starts_with("buy_"));
    }

    #[rstest]
    #[case(json!({ "assetId": "no-such-asset" }), StatusCode::NOT_FOUND,   "Asset not found")]
    #[case(json!({}),                             StatusCode::BAD_REQUEST, "assetId is required")]
    #[tokio::test]
    async fn bad_purchases_are_reported(
        #[case] body: Value,
        #[case] expected_status: StatusCode,
        #[case] expected_error: &str,
    ) {
        let app = TestApp::new(&[]);
        let session = app.signup("ada@example.com").await;

        assert_eq!(
            app.call(Method::POST, "/api/assets/buy", Some(&session), Some(body))
                .await,
            (expected_status, json!({ "error": expected_error }))
        );
    }

    #[tokio::test]
    async fn the_catalog_lists_prices_as_strings() {
        let app = TestApp::new(&[]);
        let (status, body) = app
            .call(Method::GET, "/api/assets/catalog", None, None)
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["assets"].as_array().unwrap().len(), 4);
        assert_eq!(body["assets"][0]["id"], "starter-template-pack");
        assert_eq!(body["assets"][0]["price"], "120");
    }

    #[rstest]
    #[case(None,           StatusCode::UNAUTHORIZED)]
    #[case(Some("wrong"),  StatusCode::UNAUTHORIZED)]
    #[case(Some("s3cret"), StatusCode::NOT_FOUND)]
    #[tokio::test]
    async fn the_webhook_checks_its_secret_first(
        #[case] secret: Option<&str>,
        #[case] expected_status: StatusCode,
    ) {
        let app = TestApp::new(&[("BANK_WEBHOOK_SECRET", "s3cret")]);
        let mut request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/api/webhook/bank")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(secret) = secret {
            request = request.header(super::SECRET_HEADER, secret);
        }
        let request = request
            .body(Body::from(
                json!({ "token": "unknown", "status": "SUCCESS" }).to_string(),
            ))
            .unwrap();

        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), expected_status);
    }

    #[rstest]
    #[case(json!({ "token": "tok", "status": "PENDING" }))]
    #[case(json!({ "status": "SUCCESS" }))]
    #[case(json!("SUCCESS"))]
    #[tokio::test]
    async fn malformed_webhooks_are_bad_requests(#[case] body: Value) {
        let app = TestApp::new(&[]);
        assert_eq!(
            app.call(Method::POST, "/api/webhook/bank", None, Some(body))
                .await,
            (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid webhook payload" })
            )
        );
    }

    #[tokio::test]
    async fn the_statement_is_csv() {
        let app = TestApp::new(&[]);
        let session = app.signup("ada@example.com").await;
        app.fund(&session, 300).await;
        app.call(
            Method::POST,
            "/api/assets/buy",
            Some(&session),
            Some(json!({ "assetId": "starter-template-pack" })),
        )
        .await;

        let request = Request::builder()
            .uri("/api/transaction/statement")
            .header(header::COOKIE, format!("session_id={session}"))
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let csv = String::from_utf8(bytes.to_vec()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "reference,type,status,amount,created_at");
        assert!(lines[1].starts_with("buy_"));
        assert!(lines[1].contains(",TRANSFER_OUT,SUCCESS,120,"));
    }
}
