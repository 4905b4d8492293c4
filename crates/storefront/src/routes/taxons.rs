//! Taxon route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::middleware::CurrentUser;
use crate::models::Flash;
use crate::routes::products::{ListingQuery, ListingView, TaxonLinkView, search_params, taxonomies};
use crate::services::flash;
use crate::state::AppState;

/// Taxon listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "taxons/show.html")]
pub struct TaxonShowTemplate {
    pub name: String,
    pub permalink: String,
    pub breadcrumbs: Vec<TaxonLinkView>,
    pub children: Vec<TaxonLinkView>,
    pub listing: ListingView,
    pub taxonomies: Vec<TaxonLinkView>,
    pub flash: Flash,
}

/// Display products in a taxon and its descendants.
#[instrument(skip(state, session, user))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    CurrentUser(user): CurrentUser,
    Path(permalink): Path<String>,
    Query(query): Query<ListingQuery>,
) -> Result<Response> {
    let catalog = state.catalog().snapshot().await;
    let permalink = permalink.trim_end_matches('/');
    let taxon = catalog
        .taxon_by_permalink(permalink)
        .ok_or_else(|| AppError::NotFound(format!("taxon {permalink}")))?;

    let params = search_params(&state, &query, Some(taxon.id), user);
    let results = state.searcher().search(&catalog, &params);

    let link = |t: &crate::models::Taxon| TaxonLinkView {
        name: t.name.clone(),
        permalink: t.permalink.clone(),
    };

    Ok(TaxonShowTemplate {
        name: taxon.name.clone(),
        permalink: taxon.permalink.clone(),
        breadcrumbs: catalog.breadcrumbs(taxon).into_iter().map(link).collect(),
        children: catalog
            .taxons
            .iter()
            .filter(|t| t.parent_id == Some(taxon.id))
            .map(link)
            .collect(),
        listing: ListingView::new(&results, state.config().currency, params.keywords.as_deref()),
        taxonomies: taxonomies(&catalog),
        flash: flash::take(&session).await,
    }
    .into_response())
}
