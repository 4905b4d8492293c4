//! Integration tests for product listings and product pages.
//!
//! Run with: cargo test -p corner-shop-integration-tests

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::StatusCode;

use corner_shop_integration_tests::{ADMIN_API_KEY, TestApp};

#[tokio::test]
async fn test_index_lists_available_products() {
    let mut app = TestApp::new();

    let response = app.get("/products").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Ruby on Rails Tote"));
    assert!(response.body.contains("Corner Shop Mug"));
    assert!(response.body.contains("$13.99"));
    assert!(!response.body.contains("Winter Collection Hoodie"));

    let home = app.get("/").await;
    assert_eq!(home.status, StatusCode::OK);
    assert!(home.body.contains("Ruby on Rails Tote"));
}

#[tokio::test]
async fn test_index_shows_root_taxonomies() {
    let mut app = TestApp::new();

    let response = app.get("/products").await;
    assert!(response.body.contains(r#"href="/t/categories""#));
    assert!(response.body.contains(r#"href="/t/brands""#));
}

#[tokio::test]
async fn test_admin_sees_unavailable_products() {
    let mut app = TestApp::new();
    app.sign_in(ADMIN_API_KEY);

    let response = app.get("/products").await;
    assert!(response.body.contains("Winter Collection Hoodie"));

    let calls = app.searcher.calls();
    assert!(calls[0].current_user.as_ref().is_some_and(|u| u.is_admin()));
}

#[tokio::test]
async fn test_keyword_search() {
    let mut app = TestApp::new();

    let response = app.get("/products?keywords=mug").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Corner Shop Mug"));
    assert!(!response.body.contains("Ruby on Rails Tote"));
    assert!(response.body.contains("1 found"));

    let calls = app.searcher.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].keywords.as_deref(), Some("mug"));
    assert_eq!(calls[0].taxon, None);
    assert_eq!(calls[0].page, 1);
    assert_eq!(calls[0].per_page, 12);
}

#[tokio::test]
async fn test_blank_keywords_list_everything() {
    let mut app = TestApp::new();

    let response = app.get("/products?keywords=+").await;
    assert!(response.body.contains("Ruby on Rails Tote"));
    assert_eq!(app.searcher.calls()[0].keywords, None);
}

#[tokio::test]
async fn test_search_without_matches() {
    let mut app = TestApp::new();

    let response = app.get("/products?keywords=bicycle").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("No products found."));
}

#[tokio::test]
async fn test_listing_is_paginated() {
    let mut app = TestApp::builder().products_per_page(3).build();

    let first = app.get("/products").await;
    assert!(first.body.contains("Page 1 of 2"));
    assert!(first.body.contains(r#"rel="next""#));
    assert!(!first.body.contains(r#"rel="prev""#));

    let second = app.get("/products?page=2").await;
    assert!(second.body.contains("Page 2 of 2"));
    assert!(second.body.contains(r#"rel="prev""#));
    assert_eq!(app.searcher.calls()[1].page, 2);
}

#[tokio::test]
async fn test_show_product() {
    let mut app = TestApp::new();

    let response = app.get("/products/ruby-on-rails-tote").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Ruby on Rails Tote"));
    assert!(response.body.contains("$15.99"));
    assert!(response.body.contains(r#"name="variant_id" value="1""#));
    assert!(!response.body.contains(r#"class="breadcrumbs""#));
}

#[tokio::test]
async fn test_show_product_with_variants() {
    let mut app = TestApp::new();

    let response = app.get("/products/corner-shop-baseball-shirt").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("CS-SHIRT-S"));
    assert!(response.body.contains("CS-SHIRT-M"));
    // The medium is backorderable.
    assert!(!response.body.contains("(out of stock)"));
}

#[tokio::test]
async fn test_show_out_of_stock_product() {
    let mut app = TestApp::new();
    app.sell_elsewhere(1, 25).await;

    let response = app.get("/products/ruby-on-rails-tote").await;
    assert!(response.body.contains("Out of stock"));
}

#[tokio::test]
async fn test_show_unknown_product_is_not_found() {
    let mut app = TestApp::new();

    let response = app.get("/products/no-such-thing").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unavailable_product_is_admin_only() {
    let mut app = TestApp::new();

    let response = app.get("/products/winter-collection-hoodie").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    app.sign_in(ADMIN_API_KEY);
    let response = app.get("/products/winter-collection-hoodie").await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_breadcrumbs_from_taxon_referer() {
    let mut app = TestApp::new();

    let response = app
        .get_with_referer(
            "/products/corner-shop-baseball-shirt",
            "http://localhost:3000/t/categories/clothing/shirts?page=1",
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains(r#"class="breadcrumbs""#));
    assert!(response.body.contains(r#"<a href="/t/categories">Categories</a>"#));
    assert!(
        response
            .body
            .contains(r#"<a href="/t/categories/clothing">Clothing</a>"#)
    );
}

#[tokio::test]
async fn test_no_breadcrumbs_from_other_referers() {
    let mut app = TestApp::new();

    let response = app
        .get_with_referer("/products/ruby-on-rails-tote", "http://localhost:3000/cart")
        .await;
    assert!(!response.body.contains(r#"class="breadcrumbs""#));
}
