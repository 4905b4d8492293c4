//! Integration tests for taxon pages.
//!
//! Run with: cargo test -p corner-shop-integration-tests

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::StatusCode;

use corner_shop_core::TaxonId;
use corner_shop_integration_tests::TestApp;

#[tokio::test]
async fn test_taxon_lists_products_in_descendants() {
    let mut app = TestApp::new();

    let response = app.get("/t/categories/clothing").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("<h1>Clothing</h1>"));
    assert!(response.body.contains("Ruby on Rails Tote"));
    assert!(response.body.contains("Corner Shop Baseball Shirt"));
    assert!(!response.body.contains("Corner Shop Mug"));
    assert!(!response.body.contains("Winter Collection Hoodie"));

    let calls = app.searcher.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].taxon, Some(TaxonId::new(2)));
}

#[tokio::test]
async fn test_taxon_links_children_and_breadcrumbs() {
    let mut app = TestApp::new();

    let response = app.get("/t/categories/clothing").await;
    assert!(
        response
            .body
            .contains(r#"<a href="/t/categories/clothing/shirts">Shirts</a>"#)
    );
    assert!(response.body.contains(r#"<a href="/t/categories">Categories</a>"#));
}

#[tokio::test]
async fn test_taxon_with_trailing_slash() {
    let mut app = TestApp::new();

    let response = app.get("/t/categories/mugs/").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Corner Shop Mug"));
}

#[tokio::test]
async fn test_taxon_keyword_search() {
    let mut app = TestApp::new();

    let response = app.get("/t/categories?keywords=shirt").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Corner Shop Baseball Shirt"));
    assert!(!response.body.contains("Ruby on Rails Tote"));

    let calls = app.searcher.calls();
    assert_eq!(calls[0].keywords.as_deref(), Some("shirt"));
    assert_eq!(calls[0].taxon, Some(TaxonId::new(1)));
}

#[tokio::test]
async fn test_empty_taxon() {
    let mut app = TestApp::new();

    let response = app.get("/t/brands").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("No products found."));
}

#[tokio::test]
async fn test_unknown_taxon_is_not_found() {
    let mut app = TestApp::new();

    let response = app.get("/t/categories/bicycles").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(app.searcher.calls().is_empty());
}
