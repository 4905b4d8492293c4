//! Cart operations: populate, update and stock checks.

use tracing::instrument;

use corner_shop_core::checkout::{CheckoutStateMachine, CheckoutStep};
use corner_shop_core::order::{MAX_QUANTITY, Order};
use corner_shop_core::{Currency, Email, EmailError, VariantId};

use crate::db::{OrderRepository, RepositoryError, ShopperKey};
use crate::models::Catalog;
use crate::services::forms::CartUpdateForm;

/// Why a cart request was refused. `Display` is shown to the shopper.
#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("Please enter a reasonable quantity.")]
    UnreasonableQuantity,

    #[error("The requested item could not be found.")]
    VariantNotFound,

    #[error("Quantity selected of {name} is not available.")]
    InsufficientStock { name: String },

    #[error(transparent)]
    Email(#[from] EmailError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Quantity for adding to the cart. Blank or missing means one.
///
/// # Errors
///
/// Returns `CartError::UnreasonableQuantity` outside `1..=MAX_QUANTITY`.
pub fn parse_quantity(raw: Option<&str>) -> Result<u32, CartError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(1),
        Some(raw) => match parse_line_quantity(raw)? {
            0 => Err(CartError::UnreasonableQuantity),
            quantity => Ok(quantity),
        },
    }
}

/// Quantity for an existing line; zero removes it.
fn parse_line_quantity(raw: &str) -> Result<u32, CartError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|q| u32::try_from(q).ok())
        .filter(|q| *q <= MAX_QUANTITY)
        .ok_or(CartError::UnreasonableQuantity)
}

/// Names of lines whose tracked, non-backorderable stock cannot cover the
/// ordered quantity.
#[must_use]
pub fn stock_shortfalls(catalog: &Catalog, order: &Order, track_inventory: bool) -> Vec<String> {
    if !track_inventory {
        return Vec::new();
    }
    order
        .line_items
        .iter()
        .filter(|item| {
            catalog
                .variant(item.variant_id)
                .is_some_and(|(_, v)| v.track_inventory && !v.stock.can_supply(item.quantity))
        })
        .map(|item| item.name.clone())
        .collect()
}

fn check_stock(
    catalog: &Catalog,
    variant_id: VariantId,
    quantity: u32,
    track_inventory: bool,
) -> Result<(), CartError> {
    let (product, variant) = catalog
        .variant(variant_id)
        .ok_or(CartError::VariantNotFound)?;
    if track_inventory && variant.track_inventory && !variant.stock.can_supply(quantity) {
        return Err(CartError::InsufficientStock {
            name: product.name.clone(),
        });
    }
    Ok(())
}

/// Add a variant to the shopper's current order, creating one if needed.
///
/// # Errors
///
/// Returns a [`CartError`] for a bad quantity, an unknown or unavailable
/// variant, insufficient stock, or a storage failure. Nothing is stored on
/// error.
#[instrument(skip(repo, catalog, machine))]
pub async fn populate(
    repo: &dyn OrderRepository,
    catalog: &Catalog,
    machine: &CheckoutStateMachine,
    shopper: &ShopperKey,
    currency: Currency,
    track_inventory: bool,
    variant_id: &str,
    quantity: Option<&str>,
) -> Result<Order, CartError> {
    let quantity = parse_quantity(quantity)?;
    let variant_id = variant_id
        .trim()
        .parse::<i32>()
        .map(VariantId::new)
        .map_err(|_| CartError::VariantNotFound)?;
    let item = catalog
        .line_item_spec(variant_id)
        .ok_or(CartError::VariantNotFound)?;

    let current = repo
        .current_order_for(shopper)
        .await?
        .and_then(|order| {
            order
                .line_items
                .iter()
                .find(|line| line.variant_id == variant_id)
                .map(|line| line.quantity)
        })
        .unwrap_or(0);
    let total = current
        .checked_add(quantity)
        .filter(|q| *q <= MAX_QUANTITY)
        .ok_or(CartError::UnreasonableQuantity)?;
    check_stock(catalog, variant_id, total, track_inventory)?;

    let order = repo
        .create_or_append(shopper, currency, &item, quantity, machine)
        .await?;
    tracing::info!(order = %order.number, variant_id = %variant_id, quantity, "Cart populated");
    Ok(order)
}

/// Apply the cart form to `order`.
///
/// A cart whose line items change after checkout started goes back to the
/// first checkout step, since its shipments are gone. Leaves `order`
/// partially updated on error; callers discard it.
///
/// # Errors
///
/// Returns a [`CartError`] for an invalid email, a missing email once the
/// address step is done, a bad quantity or insufficient stock.
pub fn apply_update(
    order: &mut Order,
    form: &CartUpdateForm,
    catalog: &Catalog,
    track_inventory: bool,
    machine: &CheckoutStateMachine,
) -> Result<(), CartError> {
    if let Some(raw) = &form.email {
        order.email = if raw.trim().is_empty() {
            None
        } else {
            Some(Email::parse(raw)?)
        };
    }
    let past_address = order.state != CheckoutStep::CART && order.state != CheckoutStep::ADDRESS;
    if past_address && order.email.is_none() {
        return Err(EmailError::Empty.into());
    }

    let mut changed = false;
    for update in &form.line_items {
        let quantity = parse_line_quantity(&update.quantity)?;
        let Some(line) = order.line_items.iter().find(|l| l.id == update.id) else {
            continue;
        };
        if line.quantity == quantity {
            continue;
        }
        if quantity > 0 {
            check_stock(catalog, line.variant_id, quantity, track_inventory)?;
        }
        changed |= order.set_quantity(update.id, quantity);
    }

    if changed && order.state != CheckoutStep::CART && order.checkout_allowed() {
        machine.restart(order);
    }
    order.touch();
    Ok(())
}
