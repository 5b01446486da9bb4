use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Conversion table into a single reference currency.
///
/// Each rate is the number of units of that currency worth one reference unit,
/// so `reference = amount / rate`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyTable {
    reference: String,
    rates: BTreeMap<String, Decimal>,
}

impl Default for CurrencyTable {
    fn default() -> Self {
        let mut rates = BTreeMap::new();
        rates.insert("USD".to_owned(), Decimal::ONE);
        rates.insert("CNY".to_owned(), Decimal::new(72, 1));
        rates.insert("EUR".to_owned(), Decimal::new(92, 2));
        Self { reference: "USD".to_owned(), rates }
    }
}

impl CurrencyTable {
    pub fn new(
        reference: impl Into<String>,
        rates: BTreeMap<String, Decimal>,
    ) -> Result<Self, DomainError> {
        let reference = normalize_code(&reference.into());
        let mut normalized = BTreeMap::new();
        for (code, rate) in rates {
            if rate <= Decimal::ZERO {
                return Err(DomainError::InvalidWeight {
                    field: format!("currency.rates.{code}"),
                    value: rate.to_string(),
                });
            }
            normalized.insert(normalize_code(&code), rate);
        }
        normalized.entry(reference.clone()).or_insert(Decimal::ONE);

        Ok(Self { reference, rates: normalized })
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn to_reference(&self, amount: Decimal, currency: &str) -> Result<Decimal, DomainError> {
        let code = normalize_code(currency);
        let rate = self.rates.get(&code).ok_or_else(|| DomainError::UnknownCurrency(code.clone()))?;
        amount
            .checked_div(*rate)
            .map(|converted| converted.round_dp(2))
            .ok_or_else(|| DomainError::ConversionOverflow { amount: amount.to_string(), currency: code })
    }

    /// Lenient variant for catalog prices: an unconvertible price is an unknown price.
    pub fn reference_price(&self, amount: Option<Decimal>, currency: &str) -> Option<Decimal> {
        let amount = amount.filter(|value| *value >= Decimal::ZERO)?;
        self.to_reference(amount, currency).ok()
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
