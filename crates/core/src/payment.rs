//! Payment methods and the gateway seam.
//!
//! Real gateway integrations are out of scope; the storefront ships a
//! check method that always captures and a bogus card gateway whose outcome
//! is decided by the card number. Both run synchronously so the checkout
//! state machine can drive them without I/O.

use chrono::{Datelike, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Error raised by a payment gateway. The message is shown to the shopper.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct GatewayError(pub String);

/// Successful gateway response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    /// Authorization code returned by the gateway.
    pub authorization: String,
}

/// Card details as submitted on the payment step. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardDetails {
    pub name: String,
    pub number: String,
    pub month: String,
    pub year: String,
    pub verification_value: String,
}

impl CardDetails {
    /// Card number with spaces and dashes removed.
    #[must_use]
    pub fn normalized_number(&self) -> String {
        self.number
            .chars()
            .filter(|c| !matches!(c, ' ' | '-'))
            .collect()
    }

    /// Validate the card fields, returning shopper-facing messages.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let number = self.normalized_number();

        if self.name.trim().is_empty() {
            errors.push("Card name can't be blank".to_owned());
        }
        if number.is_empty() {
            errors.push("Card number can't be blank".to_owned());
        } else if !number.chars().all(|c| c.is_ascii_digit()) {
            errors.push("Card number is invalid".to_owned());
        }

        match (self.month.trim().parse::<u32>(), self.year.trim().parse::<i32>()) {
            (Ok(month), Ok(year)) if (1..=12).contains(&month) => {
                let today = Utc::now().date_naive();
                if (year, month) < (today.year(), today.month()) {
                    errors.push("Card has expired".to_owned());
                }
            }
            _ => errors.push("Card expiration is invalid".to_owned()),
        }

        errors
    }

    /// Last four digits of the card number.
    #[must_use]
    pub fn last_digits(&self) -> String {
        let number = self.normalized_number();
        let skip = number.chars().count().saturating_sub(4);
        number.chars().skip(skip).collect()
    }
}

/// Card data kept on a payment after the payment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSource {
    pub name: String,
    pub last_digits: String,
    pub month: String,
    pub year: String,
    /// Profile stored at the gateway in place of the full card number.
    pub gateway_profile_id: Option<String>,
}

/// A payment gateway.
pub trait PaymentGateway: Send + Sync {
    /// Store the card at the gateway and return a profile reference.
    ///
    /// # Errors
    ///
    /// Returns a `GatewayError` if the gateway refuses the card.
    fn create_profile(&self, card: &CardDetails) -> Result<Option<String>, GatewayError>;

    /// Capture `amount` against `source`.
    ///
    /// # Errors
    ///
    /// Returns a `GatewayError` if the capture is declined.
    fn purchase(
        &self,
        amount: Decimal,
        source: Option<&CardSource>,
    ) -> Result<GatewayResponse, GatewayError>;
}

/// Kind of a configured payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodKind {
    /// Offline payment; always captures.
    Check,
    /// Test card gateway.
    BogusCreditCard,
}

impl PaymentMethodKind {
    /// Whether the method needs card details on the payment step.
    #[must_use]
    pub const fn source_required(self) -> bool {
        matches!(self, Self::BogusCreditCard)
    }

    /// The gateway that processes this method.
    #[must_use]
    pub fn gateway(self) -> &'static dyn PaymentGateway {
        match self {
            Self::Check => &CheckGateway,
            Self::BogusCreditCard => &BogusGateway,
        }
    }
}

/// Gateway behind [`PaymentMethodKind::Check`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckGateway;

impl PaymentGateway for CheckGateway {
    fn create_profile(&self, _card: &CardDetails) -> Result<Option<String>, GatewayError> {
        Ok(None)
    }

    fn purchase(
        &self,
        _amount: Decimal,
        _source: Option<&CardSource>,
    ) -> Result<GatewayResponse, GatewayError> {
        Ok(GatewayResponse {
            authorization: "check".to_owned(),
        })
    }
}

/// Test gateway: the card numbers in [`BogusGateway::VALID_CARDS`] succeed,
/// everything else is declined at capture time.
#[derive(Debug, Clone, Copy, Default)]
pub struct BogusGateway;

impl BogusGateway {
    /// Card numbers that the bogus gateway accepts.
    pub const VALID_CARDS: &'static [&'static str] = &[
        "1",
        "4111111111111111",
        "4012888888881881",
        "4222222222222",
    ];

    const SUCCESS_PREFIX: &'static str = "BGS-";
    const FAILURE_PREFIX: &'static str = "FAIL-";
}

impl PaymentGateway for BogusGateway {
    fn create_profile(&self, card: &CardDetails) -> Result<Option<String>, GatewayError> {
        let number = card.normalized_number();
        let prefix = if Self::VALID_CARDS.contains(&number.as_str()) {
            Self::SUCCESS_PREFIX
        } else {
            Self::FAILURE_PREFIX
        };
        let suffix: u32 = rand::rng().random();
        Ok(Some(format!("{prefix}{suffix:08x}")))
    }

    fn purchase(
        &self,
        _amount: Decimal,
        source: Option<&CardSource>,
    ) -> Result<GatewayResponse, GatewayError> {
        let accepted = source
            .and_then(|s| s.gateway_profile_id.as_deref())
            .is_some_and(|profile| profile.starts_with(Self::SUCCESS_PREFIX));

        if accepted {
            Ok(GatewayResponse {
                authorization: "12345".to_owned(),
            })
        } else {
            Err(GatewayError("Bogus Gateway: Forced failure".to_owned()))
        }
    }
}
