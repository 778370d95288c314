// End-to-end pipeline checks: the gateway router is driven in-process while
// backends run as real axum servers on ephemeral ports.
#[cfg(test)]
mod test {
    use std::{
        net::SocketAddr,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use axum::{
        Json, Router,
        body::{Body, to_bytes},
        extract::{Request, State},
        http::{StatusCode, header},
        response::{IntoResponse, Response},
        routing::get,
    };
    use chrono::Utc;
    use edge_gateway::{
        GatewayService, HttpClientAdapter, JwtTokenValidator,
        adapters::build_router,
        config::{ServerConfigValidator, models::ServerConfig},
    };
    use http_body_util::BodyExt;
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const SECRET: &str = "integration-test-secret";
    const PNG: &[u8] = &[
        0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0xff, 0x00, 0x80,
    ];

    type Hits = Arc<AtomicUsize>;

    async fn echo(State(hits): State<Hits>, req: Request) -> Response {
        hits.fetch_add(1, Ordering::SeqCst);
        let (parts, body) = req.into_parts();
        let body = to_bytes(body, usize::MAX).await.unwrap();

        if parts.uri.path().ends_with("/missing") {
            return (StatusCode::NOT_FOUND, Json(json!({"error": "no such thing"}))).into_response();
        }

        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        (
            [("x-backend", "mock")],
            Json(json!({
                "method": parts.method.as_str(),
                "path": parts.uri.path(),
                "query": parts.uri.query(),
                "userId": header("x-user-id"),
                "role": header("x-user-role"),
                "authorization": header("authorization"),
                "body": String::from_utf8_lossy(&body),
            })),
        )
            .into_response()
    }

    async fn png(State(hits): State<Hits>) -> Response {
        hits.fetch_add(1, Ordering::SeqCst);
        ([(header::CONTENT_TYPE, "image/png")], PNG).into_response()
    }

    async fn spawn_backend() -> (String, Hits) {
        let hits: Hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/api/media/1", get(png))
            .fallback(echo)
            .with_state(hits.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), hits)
    }

    /// An address nothing listens on.
    async fn dead_backend() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    fn gateway(user: &str, product: &str, media: &str) -> Router {
        let config = ServerConfig::builder()
            .jwt_secret(SECRET)
            .service("user", user)
            .service("product", product)
            .service("media", media)
            .backend_timeout("5s")
            .build()
            .unwrap();
        ServerConfigValidator::validate(&config).unwrap();

        let config = Arc::new(config);
        let client = Arc::new(HttpClientAdapter::new(Duration::from_secs(5)).unwrap());
        let validator = Arc::new(JwtTokenValidator::new(&config.jwt));
        let service = GatewayService::new(config, client, validator).unwrap();
        build_router(Arc::new(service))
    }

    fn token(exp_offset_secs: i64) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &json!({
                "userId": "42",
                "role": "SELLER",
                "exp": Utc::now().timestamp() + exp_offset_secs,
            }),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_forwarded_without_auth() {
        let (url, hits) = spawn_backend().await;
        let app = gateway(&url, &url, &url);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/users/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"name":"ada","email":"ada@example.com"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["method"], "POST");
        assert_eq!(json["path"], "/api/users/register");
        assert_eq!(json["body"], r#"{"name":"ada","email":"ada@example.com"}"#);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_login_rate_limited_after_capacity() {
        let (url, hits) = spawn_backend().await;
        let app = gateway(&url, &url, &url);

        let login = || {
            Request::builder()
                .method("POST")
                .uri("/api/users/login")
                .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
                .body(Body::from(r#"{"email":"a@b.c","password":"x"}"#))
                .unwrap()
        };

        for attempt in 1..=10 {
            let response = app.clone().oneshot(login()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "attempt {attempt}");
        }

        let response = app.clone().oneshot(login()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = json_body(response).await;
        assert_eq!(json["message"], "Rate limit exceeded");
        assert_eq!(json["path"], "/api/users/login");
        assert_eq!(json["status"], 429);
        assert_eq!(hits.load(Ordering::SeqCst), 10);

        // Another client is unaffected.
        let other = Request::builder()
            .method("POST")
            .uri("/api/users/login")
            .header("x-forwarded-for", "198.51.100.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.oneshot(other).await.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_public_product_passthrough() {
        let (url, _) = spawn_backend().await;
        let app = gateway(&url, &url, &url);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/products/42?expand=media")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-backend"], "mock");
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("application/json")
        );
        let json = json_body(response).await;
        assert_eq!(json["path"], "/api/products/42");
        assert_eq!(json["query"], "expand=media");
        assert_eq!(json["userId"], Value::Null);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_backend_error_status_relayed() {
        let (url, _) = spawn_backend().await;
        let app = gateway(&url, &url, &url);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/products/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await, json!({"error": "no such thing"}));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_expired_token_never_reaches_backend() {
        let (url, hits) = spawn_backend().await;
        let app = gateway(&url, &url, &url);

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/users/profile/avatar")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token(-60)))
                    .body(Body::from("new-avatar"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = json_body(response).await;
        assert_eq!(json["message"], "Invalid or expired token");
        assert_eq!(json["success"], false);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_token_on_protected_route() {
        let (url, hits) = spawn_backend().await;
        let app = gateway(&url, &url, &url);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/products/42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = json_body(response).await;
        assert_eq!(json["message"], "Missing or invalid Authorization header");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_valid_token_injects_identity() {
        let (url, _) = spawn_backend().await;
        let app = gateway(&url, &url, &url);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/products/my-products")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token(600)))
                    .header("x-user-id", "1")
                    .header("x-user-role", "ADMIN")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["userId"], "42");
        assert_eq!(json["role"], "SELLER");
        assert!(json["authorization"].as_str().unwrap().starts_with("Bearer "));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_spoofed_identity_stripped_on_public_route() {
        let (url, _) = spawn_backend().await;
        let app = gateway(&url, &url, &url);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/products")
                    .header("x-user-id", "1")
                    .header("x-user-role", "ADMIN")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let json = json_body(response).await;
        assert_eq!(json["userId"], Value::Null);
        assert_eq!(json["role"], Value::Null);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_path_envelope() {
        let (url, hits) = spawn_backend().await;
        let app = gateway(&url, &url, &url);

        let response = app
            .oneshot(Request::builder().uri("/api/unknown").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(
            json_body(response).await,
            json!({
                "success": false,
                "message": "Resource not found",
                "path": "/api/unknown",
                "status": 404
            })
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_refused_backend_is_unavailable() {
        let (url, _) = spawn_backend().await;
        let media = dead_backend().await;
        let app = gateway(&url, &url, &media);

        let response = app
            .oneshot(Request::builder().uri("/api/media/5").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = json_body(response).await;
        assert_eq!(json["message"], "Service temporarily unavailable");
        assert_eq!(json["path"], "/api/media/5");
        assert_eq!(json["status"], 503);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_image_bytes_relayed_exactly() {
        let (url, _) = spawn_backend().await;
        let app = gateway(&url, &url, &url);

        let response = app
            .oneshot(Request::builder().uri("/api/media/1").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], PNG);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cors_preflight_answered_by_gateway() {
        let (url, hits) = spawn_backend().await;
        let app = gateway(&url, &url, &url);

        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/products")
                    .header(header::ORIGIN, "http://localhost:4200")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:4200"
        );
        assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
