//! Product route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use corner_shop_core::{Currency, Money, TaxonId};

use crate::error::{AppError, Result};
use crate::middleware::CurrentUser;
use crate::models::{Catalog, Flash, Product, User};
use crate::routes::referer_path;
use crate::services::flash;
use crate::services::search::{SearchParams, SearchResults};
use crate::state::AppState;

/// Product card display data for listings.
#[derive(Debug, Clone)]
pub struct ProductSummaryView {
    pub name: String,
    pub slug: String,
    pub price: String,
}

impl ProductSummaryView {
    #[must_use]
    pub fn new(product: &Product, currency: Currency) -> Self {
        Self {
            name: product.name.clone(),
            slug: product.slug.clone(),
            price: product
                .price()
                .map(|p| Money::new(p, currency).to_string())
                .unwrap_or_default(),
        }
    }
}

/// Variant choice on the product page.
#[derive(Debug, Clone)]
pub struct VariantView {
    pub id: i32,
    pub sku: String,
    pub price: String,
    pub in_stock: bool,
}

/// Taxon link display data.
#[derive(Debug, Clone)]
pub struct TaxonLinkView {
    pub name: String,
    pub permalink: String,
}

/// Listing page data shared by products and taxons.
#[derive(Debug, Clone)]
pub struct ListingView {
    pub products: Vec<ProductSummaryView>,
    pub page: usize,
    pub total_pages: usize,
    pub total_count: usize,
    /// Query string without `page`, for pagination links.
    pub base_query: String,
}

impl ListingView {
    #[must_use]
    pub fn new(results: &SearchResults, currency: Currency, keywords: Option<&str>) -> Self {
        let base_query = keywords
            .filter(|k| !k.trim().is_empty())
            .map(|k| {
                url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("keywords", k)
                    .finish()
                    + "&"
            })
            .unwrap_or_default();

        Self {
            products: results
                .products
                .iter()
                .map(|p| ProductSummaryView::new(p, currency))
                .collect(),
            page: results.page,
            total_pages: results.total_pages,
            total_count: results.total_count,
            base_query,
        }
    }

    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.page > 1
    }

    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    #[must_use]
    pub const fn previous_page(&self) -> usize {
        self.page.saturating_sub(1)
    }

    #[must_use]
    pub const fn next_page(&self) -> usize {
        self.page + 1
    }
}

/// Listing query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    pub keywords: Option<String>,
    pub page: Option<usize>,
}

/// Product listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub listing: ListingView,
    pub keywords: String,
    pub taxonomies: Vec<TaxonLinkView>,
    pub flash: Flash,
}

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub name: String,
    pub description: String,
    pub price: String,
    pub variants: Vec<VariantView>,
    pub breadcrumbs: Vec<TaxonLinkView>,
    pub flash: Flash,
}

/// Build search parameters for the listing pages.
pub(crate) fn search_params(
    state: &AppState,
    query: &ListingQuery,
    taxon: Option<TaxonId>,
    user: Option<User>,
) -> SearchParams {
    SearchParams {
        keywords: query
            .keywords
            .as_ref()
            .map(|k| k.trim().to_owned())
            .filter(|k| !k.is_empty()),
        taxon,
        page: query.page.unwrap_or(1),
        per_page: state.config().products_per_page,
        current_user: user,
        now: Utc::now(),
    }
}

/// Root taxons, linked from every listing.
pub(crate) fn taxonomies(catalog: &Catalog) -> Vec<TaxonLinkView> {
    catalog
        .taxons
        .iter()
        .filter(|t| t.parent_id.is_none())
        .map(|t| TaxonLinkView {
            name: t.name.clone(),
            permalink: t.permalink.clone(),
        })
        .collect()
}

/// Display the product listing.
#[instrument(skip(state, session, user))]
pub async fn index(
    State(state): State<AppState>,
    session: Session,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListingQuery>,
) -> Result<Response> {
    let catalog = state.catalog().snapshot().await;
    let params = search_params(&state, &query, None, user);
    let results = state.searcher().search(&catalog, &params);

    Ok(ProductsIndexTemplate {
        listing: ListingView::new(&results, state.config().currency, params.keywords.as_deref()),
        keywords: params.keywords.unwrap_or_default(),
        taxonomies: taxonomies(&catalog),
        flash: flash::take(&session).await,
    }
    .into_response())
}

/// Display a product.
///
/// Unavailable products are only shown to admins. Arriving from a taxon
/// page adds that taxon's breadcrumbs.
#[instrument(skip(state, session, user, headers))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Result<Response> {
    let catalog = state.catalog().snapshot().await;
    let is_admin = user.as_ref().is_some_and(User::is_admin);
    let product = catalog
        .product_by_slug(&slug)
        .filter(|p| is_admin || p.is_available(Utc::now()))
        .ok_or_else(|| AppError::NotFound(format!("product {slug}")))?;

    let breadcrumbs = referer_path(&headers)
        .as_deref()
        .and_then(|path| path.split('?').next())
        .and_then(|path| path.strip_prefix("/t/"))
        .and_then(|permalink| catalog.taxon_by_permalink(permalink))
        .map(|taxon| {
            catalog
                .breadcrumbs(taxon)
                .into_iter()
                .map(|t| TaxonLinkView {
                    name: t.name.clone(),
                    permalink: t.permalink.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    let currency = state.config().currency;
    let track_inventory = state.config().track_inventory;
    Ok(ProductShowTemplate {
        name: product.name.clone(),
        description: product.description.clone(),
        price: product
            .price()
            .map(|p| Money::new(p, currency).to_string())
            .unwrap_or_default(),
        variants: product
            .variants
            .iter()
            .map(|v| VariantView {
                id: v.id.as_i32(),
                sku: v.sku.clone(),
                price: Money::new(v.price, currency).to_string(),
                in_stock: !track_inventory || !v.track_inventory || v.stock.can_supply(1),
            })
            .collect(),
        breadcrumbs,
        flash: flash::take(&session).await,
    }
    .into_response())
}
