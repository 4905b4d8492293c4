//! Corner Shop Core - domain types and the checkout state machine.
//!
//! This crate provides the pieces shared by every Corner Shop component:
//! - `storefront` - Public-facing shop (cart, checkout, catalog)
//! - `cli` - Command-line tools for migrations and seed validation
//!
//! # Architecture
//!
//! The core crate contains only types, traits and pure logic - no I/O, no
//! database access, no HTTP. Anything the checkout needs from the outside
//! world (shipping rates, stock levels, payment methods) is asked for through
//! [`checkout::CheckoutHooks`].
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, money, emails, tokens and statuses
//! - [`order`] - The order aggregate: line items, addresses, shipments, payments
//! - [`checkout`] - Checkout steps, the configurable flow and the state machine
//! - [`payment`] - Payment gateway seam and the built-in gateways

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod checkout;
pub mod order;
pub mod payment;
pub mod types;

pub use types::*;
