//! Integration tests for Corner Shop.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p corner-shop-integration-tests
//! ```
//!
//! Requests go straight into the storefront router with
//! `tower::ServiceExt::oneshot`; orders and sessions live in memory, so no
//! server or database is needed. [`TestApp`] carries the session cookie
//! between requests like a browser would.

#![allow(clippy::missing_panics_doc, clippy::unwrap_used, clippy::indexing_slicing)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use secrecy::SecretString;
use tower::ServiceExt;
use tower_sessions::MemoryStore;

use corner_shop_core::checkout::StepInsertion;
use corner_shop_core::order::{Address, Order};
use corner_shop_core::{Currency, OrderNumber, VariantId};
use corner_shop_storefront::config::StorefrontConfig;
use corner_shop_storefront::db::{MemoryOrderRepository, OrderRepository, Seed};
use corner_shop_storefront::middleware::auth::API_KEY_HEADER;
use corner_shop_storefront::models::Catalog;
use corner_shop_storefront::routes;
use corner_shop_storefront::services::search::{
    CatalogSearcher, ProductSearcher, SearchParams, SearchResults,
};
use corner_shop_storefront::state::AppState;

/// The demo catalog shipped with the storefront.
pub const SEED: &str = include_str!("../../storefront/seeds/catalog.yaml");

/// API key of the seeded admin user.
pub const ADMIN_API_KEY: &str = "3f1c9e0b7a2d4c58b6e1f0a9d8c7b6a5";

/// API key of the seeded shopper with saved addresses.
pub const SHOPPER_API_KEY: &str = "8d2e4f6a1b3c5d7e9f0a2b4c6d8e0f1a";

/// Storefront configuration for tests.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: None,
        host: "127.0.0.1".parse().unwrap(),
        port: 3000,
        base_url: "http://localhost:3000".to_string(),
        session_secret: SecretString::from("Zq8r2LmX4vN7pT1kW9yB3sD6fH0jC5gA".repeat(2)),
        seed_path: PathBuf::from("crates/storefront/seeds/catalog.yaml"),
        currency: Currency::USD,
        track_inventory: true,
        checkout_extra_steps: Vec::new(),
        products_per_page: 12,
        rate_limit: false,
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// Parse the demo seed.
#[must_use]
pub fn seed() -> Seed {
    Seed::from_yaml(SEED).unwrap()
}

/// A US address that ships with the seeded methods.
#[must_use]
pub fn us_address() -> Address {
    Address {
        firstname: "John".to_string(),
        lastname: "Doe".to_string(),
        address1: "10 Lovely Street".to_string(),
        address2: "Northwest".to_string(),
        city: "Herndon".to_string(),
        zipcode: "35005".to_string(),
        phone: "555-555-0199".to_string(),
        state_name: "Alabama".to_string(),
        country_iso: "US".to_string(),
        ..Address::default()
    }
}

/// Form fields for a bill address (shipping to the same place).
#[must_use]
pub fn address_fields(address: &Address) -> Vec<(String, String)> {
    let field = |name: &str, value: &str| {
        (
            format!("order[bill_address_attributes][{name}]"),
            value.to_string(),
        )
    };
    vec![
        field("firstname", &address.firstname),
        field("lastname", &address.lastname),
        field("address1", &address.address1),
        field("address2", &address.address2),
        field("city", &address.city),
        field("zipcode", &address.zipcode),
        field("phone", &address.phone),
        field("state_name", &address.state_name),
        field("country_iso", &address.country_iso),
        ("order[use_billing]".to_string(), "1".to_string()),
    ]
}

// ============================================================================
// Searcher
// ============================================================================

/// Catalog searcher that remembers every query.
#[derive(Debug, Default)]
pub struct RecordingSearcher {
    calls: Mutex<Vec<SearchParams>>,
}

impl RecordingSearcher {
    /// Every query seen so far.
    pub fn calls(&self) -> Vec<SearchParams> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProductSearcher for RecordingSearcher {
    fn search(&self, catalog: &Catalog, params: &SearchParams) -> SearchResults {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(params.clone());
        CatalogSearcher.search(catalog, params)
    }
}

// ============================================================================
// Responses
// ============================================================================

/// A collected response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    /// The redirect target, if any.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    /// Assert a redirect to `path`.
    #[track_caller]
    pub fn assert_redirect(&self, path: &str) {
        assert!(
            self.status.is_redirection(),
            "expected redirect to {path}, got {} with body {}",
            self.status,
            self.body
        );
        assert_eq!(self.location(), Some(path));
    }
}

// ============================================================================
// App
// ============================================================================

/// Builder for [`TestApp`].
pub struct TestAppBuilder {
    config: StorefrontConfig,
    seed: Seed,
}

impl TestAppBuilder {
    #[must_use]
    pub fn track_inventory(mut self, track: bool) -> Self {
        self.config.track_inventory = track;
        self
    }

    /// Splice an extra checkout step, e.g. `"new_step:after:payment"`.
    #[must_use]
    pub fn extra_step(mut self, insertion: &str) -> Self {
        self.config
            .checkout_extra_steps
            .push(insertion.parse::<StepInsertion>().unwrap());
        self
    }

    #[must_use]
    pub fn products_per_page(mut self, per_page: usize) -> Self {
        self.config.products_per_page = per_page;
        self
    }

    /// Change the seed before the app is built.
    #[must_use]
    pub fn seed(mut self, change: impl FnOnce(&mut Seed)) -> Self {
        change(&mut self.seed);
        self
    }

    #[must_use]
    pub fn build(self) -> TestApp {
        let orders = Arc::new(MemoryOrderRepository::new());
        let searcher = Arc::new(RecordingSearcher::default());
        let state = AppState::with_searcher(
            self.config,
            orders.clone(),
            self.seed,
            searcher.clone(),
        )
        .unwrap();
        let router = routes::app(state.clone(), MemoryStore::default()).unwrap();

        TestApp {
            router,
            state,
            orders,
            searcher,
            cookie: None,
            api_key: None,
        }
    }
}

/// The storefront router plus a cookie jar of one.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub orders: Arc<MemoryOrderRepository>,
    pub searcher: Arc<RecordingSearcher>,
    cookie: Option<String>,
    api_key: Option<String>,
}

impl TestApp {
    #[must_use]
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            config: test_config(),
            seed: seed(),
        }
    }

    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Send the API key on every following request.
    pub fn sign_in(&mut self, api_key: &str) {
        self.api_key = Some(api_key.to_string());
    }

    /// Forget the session cookie, as a new browser would.
    pub fn clear_cookies(&mut self) {
        self.cookie = None;
    }

    pub async fn get(&mut self, path: &str) -> TestResponse {
        self.send(Method::GET, path, &[], None).await
    }

    pub async fn get_with_referer(&mut self, path: &str, referer: &str) -> TestResponse {
        self.send(Method::GET, path, &[(header::REFERER, referer)], None)
            .await
    }

    pub async fn post(&mut self, path: &str, fields: &[(String, String)]) -> TestResponse {
        self.send_form(Method::POST, path, fields, &[]).await
    }

    pub async fn put(&mut self, path: &str, fields: &[(String, String)]) -> TestResponse {
        self.send_form(Method::PUT, path, fields, &[]).await
    }

    pub async fn patch(&mut self, path: &str, fields: &[(String, String)]) -> TestResponse {
        self.send_form(Method::PATCH, path, fields, &[]).await
    }

    /// Add a variant to the cart through the populate endpoint.
    pub async fn populate(&mut self, variant_id: i32, quantity: u32) -> TestResponse {
        let fields = pairs(&[
            ("variant_id", &variant_id.to_string()),
            ("quantity", &quantity.to_string()),
        ]);
        self.post("/orders/populate", &fields).await
    }

    pub async fn send_form(
        &mut self,
        method: Method,
        path: &str,
        fields: &[(String, String)],
        headers: &[(header::HeaderName, &str)],
    ) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.send(method, path, headers, Some(body)).await
    }

    async fn send(
        &mut self,
        method: Method,
        path: &str,
        headers: &[(header::HeaderName, &str)],
        form: Option<String>,
    ) -> TestResponse {
        let mut request = Request::builder().method(method).uri(path);
        if let Some(cookie) = &self.cookie {
            request = request.header(header::COOKIE, cookie);
        }
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        for (name, value) in headers {
            request = request.header(name, *value);
        }
        let request = match form {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body)),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        if let Some(cookie) = headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
        {
            self.cookie = Some(cookie.to_string());
        }
        let bytes = response.into_body().collect().await.unwrap().to_bytes();

        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    // ------------------------------------------------------------------------
    // Order fixtures
    // ------------------------------------------------------------------------

    /// The most recently stored order.
    pub async fn last_order(&self) -> Order {
        self.orders.all().await.pop().unwrap()
    }

    pub async fn order(&self, number: &OrderNumber) -> Order {
        self.orders.find_by_number(number).await.unwrap().unwrap()
    }

    /// Store changes made to an order outside the HTTP surface.
    pub async fn store(&self, order: &Order) {
        self.orders.update(order).await.unwrap();
    }

    /// Take stock away as another shopper's completed order would.
    pub async fn sell_elsewhere(&self, variant_id: i32, quantity: u32) {
        let mut stock = self.state.catalog().lock_stock().await;
        let item = stock
            .catalog()
            .line_item_spec(VariantId::new(variant_id))
            .unwrap();
        let mut order = Order::new(None, None, Currency::USD);
        order.add_line_item(&item, quantity).unwrap();
        let shortfalls = stock.unstock(&order, true);
        assert!(shortfalls.is_empty(), "stock cannot cover {shortfalls:?}");
    }

    /// Populate a variant and return the resulting cart order.
    pub async fn cart_with(&mut self, variant_id: i32, quantity: u32) -> Order {
        self.populate(variant_id, quantity)
            .await
            .assert_redirect("/cart");
        self.last_order().await
    }

    /// Walk a fresh cart through the address step.
    pub async fn order_at_delivery(&mut self) -> Order {
        let order = self.cart_with(1, 1).await;
        let mut fields = address_fields(&us_address());
        fields.push(("order[email]".to_string(), "guest@example.com".to_string()));
        self.patch("/checkout/update/address", &fields)
            .await
            .assert_redirect("/checkout/delivery");
        self.order(&order.number).await
    }

    /// Walk a fresh cart through delivery.
    pub async fn order_at_payment(&mut self) -> Order {
        let order = self.order_at_delivery().await;
        self.patch("/checkout/update/delivery", &[])
            .await
            .assert_redirect("/checkout/payment");
        self.order(&order.number).await
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned form pairs from borrowed ones.
#[must_use]
pub fn pairs(fields: &[(&str, &str)]) -> Vec<(String, String)> {
    fields
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Form fields for a card payment.
#[must_use]
pub fn card_payment(method_id: i32, number: &str) -> Vec<(String, String)> {
    let source = |field: &str| format!("order[payments_attributes][][source_attributes][{field}]");
    vec![
        (
            "order[payments_attributes][][payment_method_id]".to_string(),
            method_id.to_string(),
        ),
        (source("name"), "John Doe".to_string()),
        (source("number"), number.to_string()),
        (source("month"), "12".to_string()),
        (source("year"), "2099".to_string()),
        (source("verification_value"), "123".to_string()),
    ]
}
