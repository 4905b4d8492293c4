//! Product search for listings and taxon pages.

use chrono::{DateTime, Utc};

use corner_shop_core::TaxonId;

use crate::models::{Catalog, Product, User};

/// What a listing asks for.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub keywords: Option<String>,
    /// Restrict to this taxon and its descendants.
    pub taxon: Option<TaxonId>,
    /// One-based page number.
    pub page: usize,
    pub per_page: usize,
    /// Admins also see products that are not available yet.
    pub current_user: Option<User>,
    pub now: DateTime<Utc>,
}

/// One page of matching products.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub products: Vec<Product>,
    pub page: usize,
    pub total_count: usize,
    pub total_pages: usize,
}

/// Finds products for a listing.
pub trait ProductSearcher: Send + Sync {
    fn search(&self, catalog: &Catalog, params: &SearchParams) -> SearchResults;
}

/// Searches the in-memory catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogSearcher;

impl ProductSearcher for CatalogSearcher {
    fn search(&self, catalog: &Catalog, params: &SearchParams) -> SearchResults {
        let show_unavailable = params.current_user.as_ref().is_some_and(User::is_admin);
        let taxons = params.taxon.map(|root| catalog.self_and_descendants(root));
        let keywords: Vec<String> = params
            .keywords
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        let matching: Vec<&Product> = catalog
            .products
            .iter()
            .filter(|p| show_unavailable || p.is_available(params.now))
            .filter(|p| {
                taxons
                    .as_ref()
                    .is_none_or(|ids| p.taxon_ids.iter().any(|id| ids.contains(id)))
            })
            .filter(|p| {
                let haystack = format!("{} {}", p.name, p.description).to_lowercase();
                keywords.iter().all(|k| haystack.contains(k.as_str()))
            })
            .collect();

        let per_page = params.per_page.max(1);
        let total_count = matching.len();
        let total_pages = total_count.div_ceil(per_page).max(1);
        let page = params.page.clamp(1, total_pages);

        SearchResults {
            products: matching
                .into_iter()
                .skip((page - 1) * per_page)
                .take(per_page)
                .cloned()
                .collect(),
            page,
            total_count,
            total_pages,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::Seed;

    fn catalog() -> Catalog {
        Seed::from_yaml(include_str!("../../seeds/catalog.yaml"))
            .unwrap()
            .catalog
    }

    fn params() -> SearchParams {
        SearchParams {
            keywords: None,
            taxon: None,
            page: 1,
            per_page: 50,
            current_user: None,
            now: Utc::now(),
        }
    }

    #[test]
    fn test_hides_unavailable_products_from_shoppers() {
        let catalog = catalog();
        let results = CatalogSearcher.search(&catalog, &params());
        assert!(results.products.iter().all(|p| p.is_available(Utc::now())));
        assert!(results.total_count < catalog.products.len());
    }

    #[test]
    fn test_admin_sees_unavailable_products() {
        let seed = Seed::from_yaml(include_str!("../../seeds/catalog.yaml")).unwrap();
        let admin = seed.users.iter().find(|u| u.is_admin()).cloned();
        let results = CatalogSearcher.search(
            &seed.catalog,
            &SearchParams {
                current_user: admin,
                ..params()
            },
        );
        assert_eq!(results.total_count, seed.catalog.products.len());
    }

    #[test]
    fn test_taxon_includes_descendants() {
        let catalog = catalog();
        let root = catalog.taxon_by_permalink("categories").unwrap().id;
        let clothing = catalog.taxon_by_permalink("categories/clothing").unwrap().id;

        let all = CatalogSearcher.search(
            &catalog,
            &SearchParams {
                taxon: Some(root),
                ..params()
            },
        );
        let some = CatalogSearcher.search(
            &catalog,
            &SearchParams {
                taxon: Some(clothing),
                ..params()
            },
        );
        assert!(all.total_count > some.total_count);
        assert!(some.total_count > 0);
    }

    #[test]
    fn test_keywords_and_pagination() {
        let catalog = catalog();
        let mug = CatalogSearcher.search(
            &catalog,
            &SearchParams {
                keywords: Some("MUG".to_string()),
                ..params()
            },
        );
        assert_eq!(mug.total_count, 1);

        let paged = CatalogSearcher.search(
            &catalog,
            &SearchParams {
                per_page: 1,
                page: 99,
                ..params()
            },
        );
        assert_eq!(paged.products.len(), 1);
        assert_eq!(paged.page, paged.total_pages);
    }
}
