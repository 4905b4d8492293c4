//! Business logic services for storefront.
//!
//! # Services
//!
//! - `cart` - Populate and update the shopper's cart, stock checks
//! - `checkout` - Apply step attributes and drive the checkout state machine
//! - `search` - Product listings for the catalog and taxon pages
//! - `forms` - Decoding of bracketed form fields
//! - `flash` - One-shot session messages

pub mod cart;
pub mod checkout;
pub mod flash;
pub mod forms;
pub mod search;
