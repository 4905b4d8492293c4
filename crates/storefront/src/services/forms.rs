//! Bracketed form field decoding.
//!
//! Cart and checkout forms post nested attributes such as
//! `order[bill_address_attributes][city]` and
//! `order[line_items_attributes][0][quantity]`. Handlers take the raw pairs
//! with `Form<Vec<(String, String)>>` and decode them here.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use corner_shop_core::order::Address;
use corner_shop_core::payment::CardDetails;
use corner_shop_core::{LineItemId, ShipmentId, ShippingMethodId};

/// `order[line_items_attributes][N][id|quantity]`
static LINE_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^order\[line_items_attributes\]\[(\d+)\]\[(id|quantity)\]$")
        .expect("Invalid regex")
});

/// `order[shipments_attributes][N][id|selected_shipping_rate_id]`
static SHIPMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^order\[shipments_attributes\]\[(\d+)\]\[(id|selected_shipping_rate_id)\]$")
        .expect("Invalid regex")
});

/// `order[bill_address_attributes][field]` and the ship equivalent.
static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^order\[(bill|ship)_address_attributes\]\[(\w+)\]$").expect("Invalid regex")
});

/// `order[payments_attributes][][source_attributes][field]`
static CARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^order\[payments_attributes\]\[\]\[source_attributes\]\[(\w+)\]$")
        .expect("Invalid regex")
});

const PAYMENT_METHOD_KEY: &str = "order[payments_attributes][][payment_method_id]";

/// Raw `key=value` pairs of a submitted form, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields(Vec<(String, String)>);

impl From<Vec<(String, String)>> for FormFields {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }
}

impl FormFields {
    /// First value submitted for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    fn truthy(&self, key: &str) -> bool {
        self.get(key)
            .is_some_and(|v| matches!(v, "1" | "true" | "on" | "yes"))
    }

    /// Decode the cart update form.
    #[must_use]
    pub fn cart_update(&self) -> CartUpdateForm {
        let mut rows: BTreeMap<u32, (Option<&str>, Option<&str>)> = BTreeMap::new();
        for (key, value) in &self.0 {
            let Some(caps) = LINE_ITEM_RE.captures(key) else {
                continue;
            };
            let (Some(index), Some(field)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let Ok(index) = index.as_str().parse::<u32>() else {
                continue;
            };
            let row = rows.entry(index).or_default();
            match field.as_str() {
                "id" => row.0 = Some(value.as_str()),
                _ => row.1 = Some(value.as_str()),
            }
        }

        let line_items = rows
            .into_values()
            .filter_map(|(id, quantity)| {
                let id = id?.trim().parse::<i32>().ok()?;
                Some(LineItemUpdate {
                    id: LineItemId::new(id),
                    quantity: quantity.unwrap_or_default().to_owned(),
                })
            })
            .collect();

        CartUpdateForm {
            email: self.get("order[email]").map(str::to_owned),
            line_items,
            checkout: self.contains("checkout"),
        }
    }

    /// Decode the checkout step form.
    #[must_use]
    pub fn checkout_update(&self) -> CheckoutForm {
        let mut bill: Option<Address> = None;
        let mut ship: Option<Address> = None;
        let mut shipments: BTreeMap<u32, (Option<i32>, Option<i32>)> = BTreeMap::new();
        let mut payments: Vec<PaymentForm> = Vec::new();

        for (key, value) in &self.0 {
            if key == PAYMENT_METHOD_KEY {
                payments.push(PaymentForm {
                    payment_method_id: value.trim().to_owned(),
                    card: CardDetails::default(),
                });
            } else if let Some(caps) = CARD_RE.captures(key) {
                if let (Some(field), Some(payment)) = (caps.get(1), payments.last_mut()) {
                    set_card_field(&mut payment.card, field.as_str(), value);
                }
            } else if let Some(caps) = ADDRESS_RE.captures(key) {
                let (Some(kind), Some(field)) = (caps.get(1), caps.get(2)) else {
                    continue;
                };
                let target = if kind.as_str() == "bill" {
                    &mut bill
                } else {
                    &mut ship
                };
                set_address_field(target.get_or_insert_with(Address::default), field.as_str(), value);
            } else if let Some(caps) = SHIPMENT_RE.captures(key) {
                let (Some(index), Some(field)) = (caps.get(1), caps.get(2)) else {
                    continue;
                };
                let Ok(index) = index.as_str().parse::<u32>() else {
                    continue;
                };
                let parsed = value.trim().parse::<i32>().ok();
                let row = shipments.entry(index).or_default();
                match field.as_str() {
                    "id" => row.0 = parsed,
                    _ => row.1 = parsed,
                }
            }
        }

        let shipping_rates = shipments
            .into_values()
            .filter_map(|(shipment, method)| {
                Some(RateSelection {
                    shipment_id: shipment.map(ShipmentId::new),
                    shipping_method_id: ShippingMethodId::new(method?),
                })
            })
            .collect();

        CheckoutForm {
            email: self.get("order[email]").map(str::to_owned),
            bill_address: bill,
            ship_address: ship,
            use_billing: self.truthy("order[use_billing]"),
            save_user_address: self.contains("save_user_address"),
            shipping_rates,
            payments,
        }
    }
}

fn set_address_field(address: &mut Address, field: &str, value: &str) {
    let value = value.trim().to_owned();
    match field {
        "firstname" => address.firstname = value,
        "lastname" => address.lastname = value,
        "address1" => address.address1 = value,
        "address2" => address.address2 = value,
        "city" => address.city = value,
        "zipcode" => address.zipcode = value,
        "phone" => address.phone = value,
        "state_name" => address.state_name = value,
        "country_iso" => address.country_iso = value,
        _ => {}
    }
}

fn set_card_field(card: &mut CardDetails, field: &str, value: &str) {
    let value = value.to_owned();
    match field {
        "name" => card.name = value,
        "number" => card.number = value,
        "month" => card.month = value,
        "year" => card.year = value,
        "verification_value" => card.verification_value = value,
        _ => {}
    }
}

/// A submitted line item row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemUpdate {
    pub id: LineItemId,
    /// Unparsed; validated by the cart service.
    pub quantity: String,
}

/// The cart page form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartUpdateForm {
    pub email: Option<String>,
    pub line_items: Vec<LineItemUpdate>,
    /// The shopper pressed "Checkout".
    pub checkout: bool,
}

/// A shipping rate picked for a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSelection {
    pub shipment_id: Option<ShipmentId>,
    pub shipping_method_id: ShippingMethodId,
}

/// A payment submitted on the payment step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentForm {
    /// Unparsed; an unknown id is a not-found condition.
    pub payment_method_id: String,
    pub card: CardDetails,
}

/// Attributes a checkout step may submit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutForm {
    pub email: Option<String>,
    pub bill_address: Option<Address>,
    pub ship_address: Option<Address>,
    /// Ship to the bill address.
    pub use_billing: bool,
    pub save_user_address: bool,
    pub shipping_rates: Vec<RateSelection>,
    pub payments: Vec<PaymentForm>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> FormFields {
        FormFields::from(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_cart_update_pairs_ids_with_quantities() {
        let form = fields(&[
            ("order[line_items_attributes][1][quantity]", "0"),
            ("order[line_items_attributes][0][id]", "4"),
            ("order[line_items_attributes][0][quantity]", "3"),
            ("order[line_items_attributes][1][id]", "7"),
            ("checkout", ""),
        ])
        .cart_update();

        assert_eq!(form.line_items.len(), 2);
        assert_eq!(form.line_items[0].id, LineItemId::new(4));
        assert_eq!(form.line_items[0].quantity, "3");
        assert_eq!(form.line_items[1].quantity, "0");
        assert!(form.checkout);
        assert!(form.email.is_none());
    }

    #[test]
    fn test_checkout_update_builds_addresses() {
        let form = fields(&[
            ("order[email]", "guest@example.com"),
            ("order[bill_address_attributes][firstname]", " John "),
            ("order[bill_address_attributes][country_iso]", "us"),
            ("order[ship_address_attributes][city]", "Herndon"),
            ("order[use_billing]", "1"),
            ("save_user_address", "1"),
        ])
        .checkout_update();

        let bill = form.bill_address.as_ref().unwrap();
        assert_eq!(bill.firstname, "John");
        assert_eq!(bill.country_iso, "us");
        assert_eq!(form.ship_address.unwrap().city, "Herndon");
        assert!(form.use_billing);
        assert!(form.save_user_address);
    }

    #[test]
    fn test_card_fields_attach_to_latest_payment() {
        let form = fields(&[
            ("order[payments_attributes][][payment_method_id]", "1"),
            ("order[payments_attributes][][payment_method_id]", "2"),
            ("order[payments_attributes][][source_attributes][number]", "4111111111111111"),
            ("order[payments_attributes][][source_attributes][name]", "John Doe"),
        ])
        .checkout_update();

        assert_eq!(form.payments.len(), 2);
        assert_eq!(form.payments[0].card, CardDetails::default());
        assert_eq!(form.payments[1].payment_method_id, "2");
        assert_eq!(form.payments[1].card.name, "John Doe");
    }

    #[test]
    fn test_card_fields_without_payment_are_ignored() {
        let form = fields(&[(
            "order[payments_attributes][][source_attributes][number]",
            "4111111111111111",
        )])
        .checkout_update();
        assert!(form.payments.is_empty());
    }

    #[test]
    fn test_shipping_rate_selection() {
        let form = fields(&[
            ("order[shipments_attributes][0][id]", "3"),
            ("order[shipments_attributes][0][selected_shipping_rate_id]", "2"),
        ])
        .checkout_update();

        assert_eq!(
            form.shipping_rates,
            vec![RateSelection {
                shipment_id: Some(ShipmentId::new(3)),
                shipping_method_id: ShippingMethodId::new(2),
            }]
        );
    }
}
