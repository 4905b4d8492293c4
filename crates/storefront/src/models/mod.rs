//! Domain models for the storefront.
//!
//! Orders come from `corner_shop_core`; the catalog and users are loaded
//! from the seed file.

pub mod catalog;
pub mod session;
pub mod user;

pub use catalog::{
    Catalog, PaymentMethod, Product, ShippingMethod, StockItem, Taxon, Variant,
};
pub use session::{Flash, keys as session_keys};
pub use user::User;
