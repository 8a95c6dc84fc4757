//! Fabrication cost model for built signs.
//!
//! Instead of attribute rules, the price is rolled up from what it takes to build the sign:
//! material and labour per inch of perimeter, LEDs, sheet stock and flat-rate options. Lighting
//! and mounting multipliers follow, then the profit margin. The profile contributes its base price
//! as a setup fee and its rounding step; its rules are not consulted.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    price_out_of_range, round_to_step, PricingEngine, PricingOutcome, PricingProfile, PricingStep,
};
use crate::domain::measurement::PERIMETER_ATTRIBUTE;
use crate::domain::selection::{AttributeValue, Selection};
use crate::errors::DomainError;

pub const LED_COUNT_ATTRIBUTE: &str = "LED Count";
pub const SHEET_COUNT_ATTRIBUTE: &str = "Sheet Count";
pub const LIGHTING_ATTRIBUTE: &str = "Lighting Type";
pub const MOUNTING_ATTRIBUTE: &str = "Mounting Type";

/// Shop rate card. Per-inch rates apply to the sign perimeter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostRates {
    pub material_per_inch: Decimal,
    pub bending_labor_per_inch: Decimal,
    pub routing_labor_per_inch: Decimal,
    pub trim_capping_labor_per_inch: Decimal,
    pub led_per_unit: Decimal,
    pub sheet_cost: Decimal,
    pub paint_returns: Decimal,
    pub trim_cap: Decimal,
    pub raceway_backer: Decimal,
    pub vinyl_rta_per_inch: Decimal,
    pub printed_vinyl_per_inch: Decimal,
    pub crating_fee: Decimal,
    pub face_lit_multiplier: Decimal,
    pub reverse_halo_multiplier: Decimal,
    pub dual_lit_multiplier: Decimal,
    pub raceway_multiplier: Decimal,
    pub wireway_multiplier: Decimal,
    pub flush_multiplier: Decimal,
    /// Fraction added on top of cost, `0.3` for 30%.
    pub profit_margin: Decimal,
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            material_per_inch: Decimal::new(5, 1),
            bending_labor_per_inch: Decimal::new(3, 1),
            routing_labor_per_inch: Decimal::new(2, 1),
            trim_capping_labor_per_inch: Decimal::new(25, 2),
            led_per_unit: Decimal::new(15, 1),
            sheet_cost: Decimal::from(85),
            paint_returns: Decimal::from(45),
            trim_cap: Decimal::from(35),
            raceway_backer: Decimal::from(75),
            vinyl_rta_per_inch: Decimal::new(15, 2),
            printed_vinyl_per_inch: Decimal::new(25, 2),
            crating_fee: Decimal::from(120),
            face_lit_multiplier: Decimal::ONE,
            reverse_halo_multiplier: Decimal::new(12, 1),
            dual_lit_multiplier: Decimal::new(15, 1),
            raceway_multiplier: Decimal::new(11, 1),
            wireway_multiplier: Decimal::new(115, 2),
            flush_multiplier: Decimal::new(105, 2),
            profit_margin: Decimal::new(3, 1),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignCostEngine {
    pub rates: CostRates,
}

impl SignCostEngine {
    pub fn new(rates: CostRates) -> Self {
        Self { rates }
    }

    fn lighting_multiplier(&self, lighting: &str) -> Option<Decimal> {
        match lighting {
            "Face-lit" => Some(self.rates.face_lit_multiplier),
            "Reverse halo" => Some(self.rates.reverse_halo_multiplier),
            "Dual Lit" => Some(self.rates.dual_lit_multiplier),
            _ => None,
        }
    }

    fn mounting_multiplier(&self, mounting: &str) -> Option<Decimal> {
        match mounting {
            "Raceway" => Some(self.rates.raceway_multiplier),
            "Wireway/Backer" => Some(self.rates.wireway_multiplier),
            "Flush" => Some(self.rates.flush_multiplier),
            _ => None,
        }
    }
}

impl PricingEngine for SignCostEngine {
    fn price(
        &self,
        profile: &PricingProfile,
        selection: &Selection,
        currency: &str,
    ) -> Result<PricingOutcome, DomainError> {
        let rates = &self.rates;
        let perimeter = quantity(selection, PERIMETER_ATTRIBUTE)?;
        let led_count = quantity(selection, LED_COUNT_ATTRIBUTE)?;
        let sheet_count = quantity(selection, SHEET_COUNT_ATTRIBUTE)?;
        let mut tally = Tally::new(profile.base_price);

        let labor_per_inch = rates
            .bending_labor_per_inch
            .checked_add(rates.routing_labor_per_inch)
            .and_then(|rate| rate.checked_add(rates.trim_capping_labor_per_inch))
            .ok_or_else(|| price_out_of_range("Fabrication labor"))?;
        tally.per_unit("Material", perimeter, rates.material_per_inch)?;
        tally.per_unit("Fabrication labor", perimeter, labor_per_inch)?;
        tally.per_unit("LEDs", led_count, rates.led_per_unit)?;
        tally.per_unit("Sheets", sheet_count, rates.sheet_cost)?;

        for (option, label, flat) in [
            ("Paint Returns", "Paint returns", rates.paint_returns),
            ("Trim Cap", "Trim cap", rates.trim_cap),
            ("Raceway/Wireway Backer", "Raceway/wireway backer", rates.raceway_backer),
            ("Crating Fee", "Crating", rates.crating_fee),
        ] {
            if is_chosen(selection, option) {
                tally.add(label, Some(flat))?;
            }
        }
        for (option, label, per_inch) in [
            ("Vinyl RTA", "Vinyl RTA", rates.vinyl_rta_per_inch),
            ("Vinyl Printed", "Printed vinyl", rates.printed_vinyl_per_inch),
        ] {
            if is_chosen(selection, option) {
                tally.per_unit(label, perimeter, per_inch)?;
            }
        }

        if let Some((lighting, factor)) = text(selection, LIGHTING_ATTRIBUTE)
            .and_then(|lighting| Some((lighting, self.lighting_multiplier(lighting)?)))
        {
            tally.scale(&format!("Lighting: {lighting}"), factor)?;
        }
        if let Some((mounting, factor)) = text(selection, MOUNTING_ATTRIBUTE)
            .and_then(|mounting| Some((mounting, self.mounting_multiplier(mounting)?)))
        {
            tally.scale(&format!("Mounting: {mounting}"), factor)?;
        }
        tally.markup("Profit margin", rates.profit_margin)?;

        let price = round_to_step(tally.subtotal, profile.rounding)
            .ok_or_else(|| price_out_of_range("rounding"))?;
        Ok(PricingOutcome {
            profile: profile.name.clone(),
            price,
            currency: currency.to_owned(),
            steps: tally.steps,
        })
    }
}

struct Tally {
    subtotal: Decimal,
    steps: Vec<PricingStep>,
}

impl Tally {
    fn new(base: Decimal) -> Self {
        Self { subtotal: base, steps: Vec::new() }
    }

    fn add(&mut self, label: &str, delta: Option<Decimal>) -> Result<(), DomainError> {
        let delta = delta.ok_or_else(|| price_out_of_range(label))?;
        self.subtotal =
            self.subtotal.checked_add(delta).ok_or_else(|| price_out_of_range(label))?;
        if !delta.is_zero() {
            self.steps.push(PricingStep { label: label.to_owned(), delta, subtotal: self.subtotal });
        }
        Ok(())
    }

    fn per_unit(&mut self, label: &str, units: Decimal, rate: Decimal) -> Result<(), DomainError> {
        if units.is_zero() {
            return Ok(());
        }
        self.add(label, units.checked_mul(rate))
    }

    fn scale(&mut self, label: &str, factor: Decimal) -> Result<(), DomainError> {
        let delta = factor
            .checked_sub(Decimal::ONE)
            .and_then(|fraction| self.subtotal.checked_mul(fraction));
        self.add(label, delta)
    }

    fn markup(&mut self, label: &str, fraction: Decimal) -> Result<(), DomainError> {
        self.add(label, self.subtotal.checked_mul(fraction))
    }
}

/// Numeric attribute value; absent or blank counts as zero, negatives are rejected.
fn quantity(selection: &Selection, attribute: &str) -> Result<Decimal, DomainError> {
    let Some(value) = selection.get(attribute) else { return Ok(Decimal::ZERO) };
    let number = value.as_decimal().unwrap_or(Decimal::ZERO);
    if number.is_sign_negative() && !number.is_zero() {
        return Err(DomainError::OutOfRange(format!("`{attribute}` value `{number}`")));
    }
    Ok(number)
}

fn text<'a>(selection: &'a Selection, attribute: &str) -> Option<&'a str> {
    match selection.get(attribute)? {
        AttributeValue::Text(text) => Some(text.trim()),
        AttributeValue::Number(_) => None,
    }
}

fn is_chosen(selection: &Selection, option: &str) -> bool {
    match selection.get(option) {
        Some(AttributeValue::Number(number)) => !number.is_zero(),
        Some(AttributeValue::Text(text)) => {
            matches!(text.trim().to_ascii_lowercase().as_str(), "yes" | "y" | "true" | "1")
        }
        None => false,
    }
}
