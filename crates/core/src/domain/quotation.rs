use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::price::PriceList;
use crate::domain::variant::ItemCode;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotationId(pub String);

impl fmt::Display for QuotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// 1-based row position.
    pub idx: u32,
    pub item_code: Option<ItemCode>,
    pub item_name: Option<String>,
    pub description: Option<String>,
    pub qty: Decimal,
    pub uom: Option<String>,
    pub rate: Decimal,
    pub amount: Decimal,
}

impl LineItem {
    pub fn blank(idx: u32) -> Self {
        Self {
            idx,
            item_code: None,
            item_name: None,
            description: None,
            qty: Decimal::ZERO,
            uom: None,
            rate: Decimal::ZERO,
            amount: Decimal::ZERO,
        }
    }

    /// A row with no item, no name and no description.
    pub fn is_blank(&self) -> bool {
        fn empty(value: &Option<String>) -> bool {
            value.as_deref().map(str::trim).map_or(true, str::is_empty)
        }

        self.item_code.as_ref().map_or(true, |code| code.0.trim().is_empty())
            && empty(&self.item_name)
            && empty(&self.description)
    }
}

/// Where `append_line_item` put the line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineSlot {
    Reused(usize),
    Appended(usize),
}

impl LineSlot {
    pub fn index(self) -> usize {
        match self {
            Self::Reused(index) | Self::Appended(index) => index,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLine {
    pub item_code: ItemCode,
    pub item_name: Option<String>,
    pub qty: Decimal,
    pub uom: String,
    pub rate: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quotation {
    pub id: QuotationId,
    pub customer: Option<String>,
    pub selling_price_list: Option<PriceList>,
    pub currency: Option<String>,
    pub items: Vec<LineItem>,
    pub total_qty: Decimal,
    pub grand_total: Decimal,
    pub modified: DateTime<Utc>,
}

impl Quotation {
    pub fn new(id: QuotationId) -> Self {
        Self {
            id,
            customer: None,
            selling_price_list: None,
            currency: None,
            items: Vec::new(),
            total_qty: Decimal::ZERO,
            grand_total: Decimal::ZERO,
            modified: Utc::now(),
        }
    }

    /// Reuses a blank trailing row or appends a new one, then fills it in and refreshes totals.
    /// Leaves the quotation untouched when the amount or a total would overflow.
    pub fn append_line_item(&mut self, line: NewLine) -> Result<LineSlot, DomainError> {
        let amount = line.qty.checked_mul(line.rate).ok_or_else(|| {
            DomainError::OutOfRange(format!("line amount for `{}`", line.item_code))
        })?;

        let (slot, mut row) = match self.items.last() {
            Some(last) if last.is_blank() => (LineSlot::Reused(self.items.len() - 1), last.clone()),
            _ => {
                let idx = u32::try_from(self.items.len() + 1).unwrap_or(u32::MAX);
                (LineSlot::Appended(self.items.len()), LineItem::blank(idx))
            }
        };
        row.item_code = Some(line.item_code);
        row.item_name = line.item_name;
        row.qty = line.qty;
        row.uom = Some(line.uom);
        row.rate = line.rate;
        row.amount = amount;

        let (total_qty, grand_total) =
            sum_totals(self.items[..slot.index()].iter().chain(std::iter::once(&row)))?;
        match slot {
            LineSlot::Reused(index) => self.items[index] = row,
            LineSlot::Appended(_) => self.items.push(row),
        }
        self.total_qty = total_qty;
        self.grand_total = grand_total;
        Ok(slot)
    }

    pub fn calculate_totals(&mut self) -> Result<(), DomainError> {
        let (total_qty, grand_total) = sum_totals(self.items.iter())?;
        self.total_qty = total_qty;
        self.grand_total = grand_total;
        Ok(())
    }
}

fn sum_totals<'a>(
    mut rows: impl Iterator<Item = &'a LineItem>,
) -> Result<(Decimal, Decimal), DomainError> {
    rows.try_fold((Decimal::ZERO, Decimal::ZERO), |(qty, amount), row| {
        Some((qty.checked_add(row.qty)?, amount.checked_add(row.amount)?))
    })
    .ok_or_else(|| DomainError::OutOfRange("quotation total".to_owned()))
}
