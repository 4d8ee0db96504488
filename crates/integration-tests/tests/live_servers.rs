//! End-to-end tests against running servers.
//!
//! These tests require:
//! - A migrated `PostgreSQL` database (`sf-cli migrate`)
//! - The storefront running (`cargo run -p shopfront-storefront`)
//! - The admin server running (`cargo run -p shopfront-admin`)
//! - For the admin flow, an account created with
//!   `sf-cli user create -e $ADMIN_EMAIL -n Admin -p $ADMIN_PASSWORD -r admin`
//!
//! Run with: cargo test -p shopfront-integration-tests -- --ignored

#![allow(clippy::unwrap_used)]

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use shopfront_integration_tests::{admin_url, storefront_url};

fn client() -> Client {
    Client::builder()
        .cookie_store(true)
        .build()
        .expect("Failed to create HTTP client")
}

#[tokio::test]
#[ignore = "Requires running storefront and database"]
async fn test_storefront_is_ready() {
    let resp = client()
        .get(format!("{}/health/ready", storefront_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

async fn register(client: &Client, base: &str) -> String {
    let email = format!(
        "it-{}@example.com",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    );

    let resp = client
        .post(format!("{base}/api/auth/register"))
        .json(&json!({"name": "Integration", "email": email, "password": "correct horse battery"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    email
}

#[tokio::test]
#[ignore = "Requires running storefront and database"]
async fn test_register_sign_in_and_out() {
    let client = client();
    let base = storefront_url();
    let email = register(&client, &base).await;

    let resp = client
        .get(format!("{base}/api/auth/session"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let session: Value = resp.json().await.unwrap();
    assert_eq!(session["user"]["email"], email.as_str());
    assert!(session["expires_at"].is_string());

    let resp = client
        .post(format!("{base}/api/auth/logout"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client
        .get(format!("{base}/api/auth/session"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running storefront and a product with stock"]
async fn test_concurrent_adds_to_one_cart_both_apply() {
    let client = client();
    let base = storefront_url();
    register(&client, &base).await;

    let page: Value = client
        .get(format!("{base}/api/products?per_page=100"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let product = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["stock"].as_u64().unwrap_or(0) >= 2)
        .expect("No product with at least two units in stock");

    let add = || {
        client
            .post(format!("{base}/api/cart/items"))
            .json(&json!({"product_id": product["id"], "quantity": 1}))
            .send()
    };
    let (first, second) = tokio::join!(add(), add());
    assert_eq!(first.unwrap().status(), StatusCode::OK);
    assert_eq!(second.unwrap().status(), StatusCode::OK);

    let cart: Value = client
        .get(format!("{base}/api/cart"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cart["item_count"], 2);
}

#[tokio::test]
#[ignore = "Requires running storefront and database"]
async fn test_catalog_listing_is_paged() {
    let resp = client()
        .get(format!("{}/api/products?per_page=5", storefront_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["per_page"], 5);
    assert!(page["items"].as_array().unwrap().len() <= 5);
}

#[tokio::test]
#[ignore = "Requires running admin server and an admin account"]
async fn test_admin_overview_after_sign_in() {
    let client = client();
    let base = admin_url();
    let email = std::env::var("ADMIN_EMAIL").expect("ADMIN_EMAIL not set");
    let password = std::env::var("ADMIN_PASSWORD").expect("ADMIN_PASSWORD not set");

    let resp = client
        .post(format!("{base}/api/auth/login"))
        .json(&json!({"email": email, "password": password}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(format!("{base}/api/overview?days=7"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let overview: Value = resp.json().await.unwrap();
    assert!(overview["low_stock"].is_array());
    assert!(overview["user_count"].as_u64().unwrap() >= 1);

    let resp = client
        .get(format!("{base}/api/orders?status=bogus"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
