use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::variant::ItemCode;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceList(pub String);

impl fmt::Display for PriceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceEntryId(pub String);

/// Rate of one item under one price list. Unique per (item, price list).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub id: PriceEntryId,
    pub item_code: ItemCode,
    pub price_list: PriceList,
    pub rate: Decimal,
    pub currency: String,
    pub uom: String,
    pub selling: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPriceEntry {
    pub item_code: ItemCode,
    pub price_list: PriceList,
    pub rate: Decimal,
    pub currency: String,
    pub uom: String,
    pub selling: bool,
}

impl NewPriceEntry {
    pub fn into_entry(self, id: PriceEntryId) -> PriceEntry {
        PriceEntry {
            id,
            item_code: self.item_code,
            price_list: self.price_list,
            rate: self.rate,
            currency: self.currency,
            uom: self.uom,
            selling: self.selling,
        }
    }
}

/// What the pricing calculator returned. `price` is optional because callers may omit it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceResponse {
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    #[serde(default)]
    pub breakdown: Vec<String>,
}

/// Currency-prefixed amount with two decimals, e.g. `USD 1,234.50`.
pub fn format_amount(amount: Decimal, currency: &str) -> String {
    let rounded = amount.round_dp(2);
    let text = format!("{rounded:.2}");
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, ch) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{currency} {sign}{grouped}.{fraction}")
}
