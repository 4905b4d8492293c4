//! Catalog records: products, variants, stock, taxons, shipping and payment
//! methods.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use corner_shop_core::order::LineItemSpec;
use corner_shop_core::payment::PaymentMethodKind;
use corner_shop_core::{
    PaymentMethodId, ProductId, ShippingMethodId, TaxonId, VariantId,
};

/// A sellable product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    /// Not available before this time. `None` means never available.
    pub available_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub discontinue_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub taxon_ids: Vec<TaxonId>,
    pub variants: Vec<Variant>,
}

impl Product {
    /// Whether shoppers may see the product at `now`.
    #[must_use]
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        let started = self.available_on.is_some_and(|on| on <= now);
        let discontinued = self.discontinue_on.is_some_and(|on| on <= now);
        started && !discontinued
    }

    /// The variant shown by default.
    #[must_use]
    pub fn master(&self) -> Option<&Variant> {
        self.variants.first()
    }

    /// Lowest variant price.
    #[must_use]
    pub fn price(&self) -> Option<Decimal> {
        self.variants.iter().map(|v| v.price).min()
    }
}

/// A purchasable variant of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub sku: String,
    pub price: Decimal,
    #[serde(default = "default_true")]
    pub shippable: bool,
    #[serde(default = "default_true")]
    pub track_inventory: bool,
    #[serde(default)]
    pub stock: StockItem,
}

/// Stock for a variant at the single stock location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub count_on_hand: i64,
    #[serde(default)]
    pub backorderable: bool,
}

impl Default for StockItem {
    fn default() -> Self {
        Self {
            count_on_hand: 10,
            backorderable: false,
        }
    }
}

impl StockItem {
    /// Whether `quantity` units can be sold.
    #[must_use]
    pub fn can_supply(&self, quantity: u32) -> bool {
        self.backorderable || self.count_on_hand >= i64::from(quantity)
    }
}

/// A category node, addressed by its slash-separated permalink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxon {
    pub id: TaxonId,
    pub name: String,
    pub permalink: String,
    #[serde(default)]
    pub parent_id: Option<TaxonId>,
}

/// A way to ship to a set of countries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub id: ShippingMethodId,
    pub name: String,
    pub cost: Decimal,
    /// ISO country codes of the method's zone.
    pub zone_countries: Vec<String>,
    #[serde(default = "default_true")]
    pub available_to_users: bool,
}

impl ShippingMethod {
    #[must_use]
    pub fn ships_to(&self, country_iso: &str) -> bool {
        self.zone_countries
            .iter()
            .any(|c| c.eq_ignore_ascii_case(country_iso))
    }
}

/// A configured payment method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub name: String,
    pub kind: PaymentMethodKind,
    #[serde(default = "default_true")]
    pub available_to_users: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl PaymentMethod {
    /// Whether shoppers may pick this method on the payment step.
    #[must_use]
    pub const fn is_selectable(&self) -> bool {
        self.active && self.available_to_users
    }
}

const fn default_true() -> bool {
    true
}

/// The whole catalog kept in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub taxons: Vec<Taxon>,
    #[serde(default)]
    pub shipping_methods: Vec<ShippingMethod>,
    #[serde(default)]
    pub payment_methods: Vec<PaymentMethod>,
}

impl Catalog {
    #[must_use]
    pub fn product_by_slug(&self, slug: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.slug == slug)
    }

    /// Find a variant and the product it belongs to.
    #[must_use]
    pub fn variant(&self, id: VariantId) -> Option<(&Product, &Variant)> {
        self.products.iter().find_map(|product| {
            product
                .variants
                .iter()
                .find(|v| v.id == id)
                .map(|variant| (product, variant))
        })
    }

    /// The fields a line item copies from a variant.
    #[must_use]
    pub fn line_item_spec(&self, id: VariantId) -> Option<LineItemSpec> {
        self.variant(id).map(|(product, variant)| LineItemSpec {
            variant_id: variant.id,
            name: product.name.clone(),
            sku: variant.sku.clone(),
            price: variant.price,
            shippable: variant.shippable,
        })
    }

    #[must_use]
    pub fn taxon_by_permalink(&self, permalink: &str) -> Option<&Taxon> {
        let permalink = permalink.trim_matches('/');
        self.taxons.iter().find(|t| t.permalink == permalink)
    }

    #[must_use]
    pub fn taxon(&self, id: TaxonId) -> Option<&Taxon> {
        self.taxons.iter().find(|t| t.id == id)
    }

    /// A taxon followed by all of its descendants.
    #[must_use]
    pub fn self_and_descendants(&self, root: TaxonId) -> Vec<TaxonId> {
        let mut ids = vec![root];
        let mut index = 0;
        while let Some(&current) = ids.get(index) {
            let children: Vec<TaxonId> = self
                .taxons
                .iter()
                .filter(|t| t.parent_id == Some(current) && !ids.contains(&t.id))
                .map(|t| t.id)
                .collect();
            ids.extend(children);
            index += 1;
        }
        ids
    }

    /// A taxon's ancestors from the root down, followed by the taxon itself.
    #[must_use]
    pub fn breadcrumbs<'a>(&'a self, taxon: &'a Taxon) -> Vec<&'a Taxon> {
        let mut trail = vec![taxon];
        let mut parent = taxon.parent_id;
        while let Some(id) = parent {
            match self.taxon(id) {
                Some(t) if !trail.iter().any(|seen| seen.id == t.id) => {
                    trail.push(t);
                    parent = t.parent_id;
                }
                _ => break,
            }
        }
        trail.reverse();
        trail
    }

    #[must_use]
    pub fn payment_method(&self, id: PaymentMethodId) -> Option<&PaymentMethod> {
        self.payment_methods.iter().find(|m| m.id == id)
    }

    /// Payment methods a shopper may pick.
    pub fn selectable_payment_methods(&self) -> impl Iterator<Item = &PaymentMethod> {
        self.payment_methods.iter().filter(|m| m.is_selectable())
    }

    /// Decrement stock for sold quantities. Backorders may go negative.
    pub fn unstock(&mut self, sold: &[(VariantId, u32)]) {
        for (id, quantity) in sold {
            for product in &mut self.products {
                for variant in product.variants.iter_mut().filter(|v| v.id == *id) {
                    if variant.track_inventory {
                        variant.stock.count_on_hand -= i64::from(*quantity);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn product(available_on: Option<DateTime<Utc>>) -> Product {
        Product {
            id: ProductId::new(1),
            name: "Amazing Item".to_string(),
            slug: "amazing-item".to_string(),
            description: String::new(),
            available_on,
            discontinue_on: None,
            taxon_ids: vec![],
            variants: vec![Variant {
                id: VariantId::new(1),
                sku: "AMZ-1".to_string(),
                price: Decimal::new(1999, 2),
                shippable: true,
                track_inventory: true,
                stock: StockItem::default(),
            }],
        }
    }

    fn taxon(id: i32, permalink: &str, parent: Option<i32>) -> Taxon {
        Taxon {
            id: TaxonId::new(id),
            name: permalink.rsplit('/').next().unwrap().to_string(),
            permalink: permalink.to_string(),
            parent_id: parent.map(TaxonId::new),
        }
    }

    #[test]
    fn test_product_availability_window() {
        let now = Utc::now();
        assert!(product(Some(now - Duration::days(1))).is_available(now));
        assert!(!product(Some(now + Duration::days(365))).is_available(now));
        assert!(!product(None).is_available(now));

        let mut discontinued = product(Some(now - Duration::days(10)));
        discontinued.discontinue_on = Some(now - Duration::days(1));
        assert!(!discontinued.is_available(now));
    }

    #[test]
    fn test_stock_supply() {
        let stock = StockItem {
            count_on_hand: 2,
            backorderable: false,
        };
        assert!(stock.can_supply(2));
        assert!(!stock.can_supply(3));
        let backorderable = StockItem {
            count_on_hand: 0,
            backorderable: true,
        };
        assert!(backorderable.can_supply(100));
    }

    #[test]
    fn test_taxon_tree() {
        let catalog = Catalog {
            taxons: vec![
                taxon(1, "categories", None),
                taxon(2, "categories/clothing", Some(1)),
                taxon(3, "categories/clothing/shirts", Some(2)),
                taxon(4, "brands", None),
            ],
            ..Catalog::default()
        };

        assert_eq!(
            catalog.self_and_descendants(TaxonId::new(1)),
            vec![TaxonId::new(1), TaxonId::new(2), TaxonId::new(3)]
        );

        let shirts = catalog.taxon_by_permalink("/categories/clothing/shirts/").unwrap();
        let trail: Vec<&str> = catalog
            .breadcrumbs(shirts)
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(trail, ["categories", "clothing", "shirts"]);
    }

    #[test]
    fn test_unstock_decrements_tracked_variants() {
        let mut catalog = Catalog {
            products: vec![product(Some(Utc::now()))],
            ..Catalog::default()
        };
        catalog.unstock(&[(VariantId::new(1), 3)]);
        assert_eq!(catalog.products[0].variants[0].stock.count_on_hand, 7);
    }
}
