//! The order aggregate.
//!
//! An [`Order`] owns its line items, addresses, shipments and payments. Child
//! ids are allocated from a per-order sequence so the aggregate can be stored
//! as a single document.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::checkout::CheckoutStep;
use crate::payment::CardSource;
use crate::types::{
    AddressId, AddressKind, Currency, Email, GuestToken, LineItemId, Money, OrderId, OrderNumber,
    PaymentId, PaymentMethodId, PaymentState, ShipmentId, ShipmentState, ShippingMethodId, UserId,
    VariantId,
};

/// Largest quantity a single line item may hold.
pub const MAX_QUANTITY: u32 = 2_147_483_647;

/// A postal address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Address {
    #[serde(default)]
    pub id: AddressId,
    pub firstname: String,
    pub lastname: String,
    pub address1: String,
    #[serde(default)]
    pub address2: String,
    pub city: String,
    pub zipcode: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub state_name: String,
    /// ISO 3166-1 alpha-2 country code, uppercase.
    pub country_iso: String,
}

impl Address {
    /// Whether two addresses describe the same place, ignoring ids.
    #[must_use]
    pub fn same_location(&self, other: &Self) -> bool {
        self.firstname == other.firstname
            && self.lastname == other.lastname
            && self.address1 == other.address1
            && self.address2 == other.address2
            && self.city == other.city
            && self.zipcode == other.zipcode
            && self.phone == other.phone
            && self.state_name == other.state_name
            && self.country_iso.eq_ignore_ascii_case(&other.country_iso)
    }

    /// Validate required fields, returning shopper-facing messages.
    #[must_use]
    pub fn validate(&self, kind: AddressKind) -> Vec<String> {
        let required = [
            ("first name", &self.firstname),
            ("last name", &self.lastname),
            ("street address", &self.address1),
            ("city", &self.city),
            ("zip code", &self.zipcode),
        ];

        let mut errors: Vec<String> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| format!("{kind} {field} can't be blank"))
            .collect();

        let iso = self.country_iso.trim();
        if iso.len() != 2 || !iso.chars().all(|c| c.is_ascii_alphabetic()) {
            errors.push(format!("{kind} country is invalid"));
        }

        errors
    }

    /// Full name on the address.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
            .trim()
            .to_owned()
    }
}

/// A variant and quantity on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub variant_id: VariantId,
    pub name: String,
    pub sku: String,
    /// Unit price captured when the item was added.
    pub price: Decimal,
    pub quantity: u32,
    /// Physical goods need an address and a shipment.
    pub shippable: bool,
}

impl LineItem {
    /// Price times quantity.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// The parts of a variant an order needs to create a line item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemSpec {
    pub variant_id: VariantId,
    pub name: String,
    pub sku: String,
    pub price: Decimal,
    pub shippable: bool,
}

/// A shipping option priced for a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRate {
    pub shipping_method_id: ShippingMethodId,
    pub name: String,
    pub cost: Decimal,
    #[serde(default)]
    pub selected: bool,
}

/// A package of shippable line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub number: String,
    pub state: ShipmentState,
    pub variant_ids: Vec<VariantId>,
    pub shipping_rates: Vec<ShippingRate>,
}

impl Shipment {
    /// The rate the shopper picked (or the default selection).
    #[must_use]
    pub fn selected_rate(&self) -> Option<&ShippingRate> {
        self.shipping_rates.iter().find(|rate| rate.selected)
    }

    /// Select the rate for `method`. Returns `false` if the shipment has no such rate.
    pub fn select_rate(&mut self, method: ShippingMethodId) -> bool {
        if !self
            .shipping_rates
            .iter()
            .any(|rate| rate.shipping_method_id == method)
        {
            return false;
        }
        for rate in &mut self.shipping_rates {
            rate.selected = rate.shipping_method_id == method;
        }
        true
    }

    /// Cost of the selected rate, zero if none is selected.
    #[must_use]
    pub fn cost(&self) -> Decimal {
        self.selected_rate().map_or(Decimal::ZERO, |rate| rate.cost)
    }
}

/// A payment attempt against an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub payment_method_id: PaymentMethodId,
    pub amount: Decimal,
    pub state: PaymentState,
    pub source: Option<CardSource>,
    /// Authorization code from a successful capture.
    pub authorization: Option<String>,
    /// Last message returned by the gateway.
    pub response_message: Option<String>,
}

/// A shopper's order, from cart to completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Zero until the repository stores the order.
    pub id: OrderId,
    pub number: OrderNumber,
    pub guest_token: Option<GuestToken>,
    pub user_id: Option<UserId>,
    pub created_by: Option<UserId>,
    pub email: Option<Email>,
    pub state: CheckoutStep,
    pub currency: Currency,
    pub line_items: Vec<LineItem>,
    pub bill_address: Option<Address>,
    pub ship_address: Option<Address>,
    pub shipments: Vec<Shipment>,
    pub payments: Vec<Payment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Last child id handed out by [`Order::next_child_id`].
    #[serde(default)]
    sequence: i32,
}

impl Order {
    /// Build a new, unsaved order in the `cart` state.
    #[must_use]
    pub fn new(user_id: Option<UserId>, guest_token: Option<GuestToken>, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(0),
            number: OrderNumber::generate(),
            guest_token,
            user_id,
            created_by: user_id,
            email: None,
            state: CheckoutStep::CART,
            currency,
            line_items: Vec::new(),
            bill_address: None,
            ship_address: None,
            shipments: Vec::new(),
            payments: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            sequence: 0,
        }
    }

    /// Whether the repository has stored this order.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.id.as_i32() > 0
    }

    /// Whether the order has been completed.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Checkout is only possible with at least one line item.
    #[must_use]
    pub fn checkout_allowed(&self) -> bool {
        !self.line_items.is_empty()
    }

    /// Whether any line item needs shipping.
    #[must_use]
    pub fn requires_shipping(&self) -> bool {
        self.line_items.iter().any(|item| item.shippable)
    }

    /// Names of shippable line items that no shipment carries.
    #[must_use]
    pub fn unshipped_items(&self) -> Vec<String> {
        self.line_items
            .iter()
            .filter(|item| item.shippable)
            .filter(|item| {
                !self
                    .shipments
                    .iter()
                    .any(|s| s.variant_ids.contains(&item.variant_id))
            })
            .map(|item| item.name.clone())
            .collect()
    }

    /// Sum of line item amounts.
    #[must_use]
    pub fn item_total(&self) -> Decimal {
        self.line_items.iter().map(LineItem::amount).sum()
    }

    /// Sum of selected shipping rates.
    #[must_use]
    pub fn shipment_total(&self) -> Decimal {
        self.shipments.iter().map(Shipment::cost).sum()
    }

    /// Amount the shopper owes.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.item_total() + self.shipment_total()
    }

    /// Total as displayable money.
    #[must_use]
    pub fn display_total(&self) -> Money {
        Money::new(self.total(), self.currency)
    }

    /// Total number of units across line items.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.line_items
            .iter()
            .map(|item| u64::from(item.quantity))
            .sum()
    }

    /// An order with nothing to pay skips the payment step.
    #[must_use]
    pub fn payment_required(&self) -> bool {
        self.total() > Decimal::ZERO
    }

    /// Payments that have not failed or been superseded.
    pub fn valid_payments(&self) -> impl Iterator<Item = &Payment> {
        self.payments.iter().filter(|p| p.state.is_valid())
    }

    /// Whether at least one valid payment exists.
    #[must_use]
    pub fn has_valid_payment(&self) -> bool {
        self.valid_payments().next().is_some()
    }

    /// Sum of captured payments.
    #[must_use]
    pub fn payment_total(&self) -> Decimal {
        self.payments
            .iter()
            .filter(|p| p.state == PaymentState::Completed)
            .map(|p| p.amount)
            .sum()
    }

    /// Total minus captured payments.
    #[must_use]
    pub fn outstanding_balance(&self) -> Decimal {
        self.total() - self.payment_total()
    }

    /// Allocate an id for a new child record.
    pub fn next_child_id(&mut self) -> i32 {
        self.sequence += 1;
        self.sequence
    }

    /// Add `quantity` units of a variant, merging with an existing line.
    ///
    /// Proposed shipments no longer cover the order and are dropped.
    /// Returns the resulting line item, or `None` if the merged quantity
    /// would exceed [`MAX_QUANTITY`].
    pub fn add_line_item(&mut self, spec: &LineItemSpec, quantity: u32) -> Option<&LineItem> {
        if let Some(index) = self
            .line_items
            .iter()
            .position(|item| item.variant_id == spec.variant_id)
        {
            let item = self.line_items.get_mut(index)?;
            let merged = item.quantity.checked_add(quantity)?;
            if merged > MAX_QUANTITY {
                return None;
            }
            item.quantity = merged;
        } else {
            let id = LineItemId::new(self.next_child_id());
            self.line_items.push(LineItem {
                id,
                variant_id: spec.variant_id,
                name: spec.name.clone(),
                sku: spec.sku.clone(),
                price: spec.price,
                quantity,
                shippable: spec.shippable,
            });
        }
        self.shipments.clear();
        self.touch();
        self.line_items
            .iter()
            .find(|item| item.variant_id == spec.variant_id)
    }

    /// Set a line item's quantity. Zero removes the line.
    ///
    /// Returns `false` if the order has no such line item.
    pub fn set_quantity(&mut self, line_item: LineItemId, quantity: u32) -> bool {
        let Some(index) = self.line_items.iter().position(|item| item.id == line_item) else {
            return false;
        };
        if quantity == 0 {
            self.line_items.remove(index);
        } else if let Some(item) = self.line_items.get_mut(index) {
            item.quantity = quantity;
        }
        self.shipments.clear();
        self.touch();
        true
    }

    /// Remove every line item, shipment and payment.
    pub fn empty(&mut self) {
        self.line_items.clear();
        self.shipments.clear();
        self.payments.clear();
        self.touch();
    }

    /// Set an address, keeping the current id when nothing changed.
    pub fn assign_address(&mut self, kind: AddressKind, mut address: Address) {
        let current = match kind {
            AddressKind::Bill => self.bill_address.as_ref(),
            AddressKind::Ship => self.ship_address.as_ref(),
        };

        match current {
            Some(existing) if existing.same_location(&address) => return,
            _ => address.id = AddressId::new(self.next_child_id()),
        }

        address.country_iso = address.country_iso.trim().to_ascii_uppercase();
        match kind {
            AddressKind::Bill => self.bill_address = Some(address),
            AddressKind::Ship => self.ship_address = Some(address),
        }
        self.touch();
    }

    /// Add a payment in the `checkout` state, invalidating any older
    /// payments that were never processed.
    pub fn add_payment(
        &mut self,
        payment_method_id: PaymentMethodId,
        amount: Decimal,
        source: Option<CardSource>,
    ) -> PaymentId {
        for payment in &mut self.payments {
            if payment.state == PaymentState::Checkout {
                payment.state = PaymentState::Invalid;
            }
        }
        let id = PaymentId::new(self.next_child_id());
        self.payments.push(Payment {
            id,
            payment_method_id,
            amount,
            state: PaymentState::Checkout,
            source,
            authorization: None,
            response_message: None,
        });
        self.touch();
        id
    }

    /// Replace the order's shipments with one proposed shipment carrying
    /// every shippable line item and the given rates. The cheapest rate is
    /// pre-selected.
    pub fn propose_shipment(&mut self, mut rates: Vec<ShippingRate>) {
        self.shipments.clear();
        if !self.requires_shipping() {
            return;
        }

        rates.sort_by(|a, b| a.cost.cmp(&b.cost));
        for (index, rate) in rates.iter_mut().enumerate() {
            rate.selected = index == 0;
        }

        let id = ShipmentId::new(self.next_child_id());
        let variant_ids = self
            .line_items
            .iter()
            .filter(|item| item.shippable)
            .map(|item| item.variant_id)
            .collect();

        self.shipments.push(Shipment {
            id,
            number: format!("H{}{:03}", self.number.as_str().trim_start_matches('R'), id.as_i32()),
            state: ShipmentState::Pending,
            variant_ids,
            shipping_rates: rates,
        });
        self.touch();
    }

    /// Bump `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
