//! In-process tests of the storefront router.
//!
//! Each test builds a fresh app, so sessions and rate limits never leak
//! between tests.

#![allow(clippy::unwrap_used)]

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use shopfront_integration_tests::{CLIENT_IP, storefront_app};

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", CLIENT_IP);
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = storefront_app()
        .oneshot(request(Method::GET, "/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
}

#[tokio::test]
async fn test_session_without_sign_in_is_unauthorized() {
    let response = storefront_app()
        .oneshot(request(Method::GET, "/api/auth/session", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_direct_client_is_keyed_by_peer_address() {
    let app = storefront_app();

    let expected = [
        ("/api/auth/session", StatusCode::UNAUTHORIZED),
        ("/api/checkout", StatusCode::OK),
    ];
    for (uri, status) in expected {
        let mut req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 52_000))));

        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), status, "{uri}");
    }
}

#[tokio::test]
async fn test_logout_without_sign_in_succeeds() {
    let response = storefront_app()
        .oneshot(request(Method::POST, "/api/auth/logout", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_order_history_requires_sign_in() {
    let response = storefront_app()
        .oneshot(request(Method::GET, "/api/orders", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_guest_cart_starts_empty() {
    let response = storefront_app()
        .oneshot(request(Method::GET, "/api/cart", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["items"], json!([]));
    assert_eq!(body["item_count"], 0);
}

#[tokio::test]
async fn test_clearing_guest_cart() {
    let response = storefront_app()
        .oneshot(request(Method::DELETE, "/api/cart", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_checkout_starts_at_identity() {
    let response = storefront_app()
        .oneshot(request(Method::GET, "/api/checkout", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["step"], "identity");
    assert_eq!(body["reviewed"], false);
    assert_eq!(body["identity"], Value::Null);
}

#[tokio::test]
async fn test_guest_identity_needs_verified_email() {
    let response = storefront_app()
        .oneshot(request(
            Method::PUT,
            "/api/checkout/identity",
            Some(json!({"name": "Ada Lovelace", "email": "ada@example.com"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_identity_rejects_invalid_email() {
    let response = storefront_app()
        .oneshot(request(
            Method::PUT,
            "/api/checkout/identity",
            Some(json!({"name": "Ada Lovelace", "email": "not-an-email"})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_shipping_before_identity_conflicts() {
    let response = storefront_app()
        .oneshot(request(
            Method::PUT,
            "/api/checkout/shipping",
            Some(json!({
                "line1": "1 Analytical Way",
                "city": "London",
                "postal_code": "N1 9GU",
                "country": "GB",
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let response = storefront_app()
        .oneshot(request(Method::GET, "/api/does-not-exist", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
