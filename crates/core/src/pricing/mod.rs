pub mod cost;

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::price::PriceResponse;
use crate::domain::selection::{AttributeValue, Selection};
use crate::domain::template::TemplateId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    Equals,
    NotEquals,
    Between,
    IsSet,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMode {
    Fixed,
    Percent,
    PerUnit,
}

impl RuleMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Fixed => "Fixed",
            Self::Percent => "Percent",
            Self::PerUnit => "Per Unit",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRule {
    pub attribute: String,
    pub operator: RuleOperator,
    pub value: Option<String>,
    pub min_value: Option<Decimal>,
    pub max_value: Option<Decimal>,
    pub mode: RuleMode,
    /// Used by `Fixed` (currency amount) and `Percent` (percentage points).
    pub amount: Decimal,
    /// Used by `PerUnit`.
    pub rate: Decimal,
    pub active: bool,
    pub notes: Option<String>,
}

impl PricingRule {
    pub fn matches(&self, value: Option<&AttributeValue>) -> bool {
        match self.operator {
            RuleOperator::IsSet => value.is_some_and(|value| !value.is_blank()),
            RuleOperator::Equals => self.equals(value),
            RuleOperator::NotEquals => !self.equals(value),
            RuleOperator::Between => {
                let number = match value {
                    None => Some(Decimal::ZERO),
                    Some(value) => value.as_decimal(),
                };
                let Some(number) = number else { return false };
                self.min_value.map_or(true, |min| number >= min)
                    && self.max_value.map_or(true, |max| number <= max)
            }
        }
    }

    fn equals(&self, value: Option<&AttributeValue>) -> bool {
        let expected = self.value.as_deref().unwrap_or_default().trim();
        let Some(value) = value else { return expected.is_empty() };

        if let (Some(actual), Ok(expected)) = (value.as_decimal(), Decimal::from_str(expected)) {
            return actual.normalize() == expected.normalize();
        }
        value.canonical() == expected
    }

    fn label(&self) -> String {
        match self.notes.as_deref().map(str::trim).filter(|notes| !notes.is_empty()) {
            Some(notes) => notes.to_owned(),
            None => format!("{} {}", self.attribute, self.mode.label()),
        }
    }
}

/// Base price plus ordered attribute rules for one template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingProfile {
    pub name: String,
    pub template: TemplateId,
    pub base_price: Decimal,
    pub rounding: Option<Decimal>,
    pub rules: Vec<PricingRule>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingStep {
    pub label: String,
    pub delta: Decimal,
    pub subtotal: Decimal,
}

impl PricingStep {
    pub fn describe(&self) -> String {
        let sign = if self.delta.is_sign_negative() { "-" } else { "+" };
        format!("{}: {sign}{:.2}", self.label, self.delta.abs().round_dp(2))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingOutcome {
    pub profile: String,
    pub price: Decimal,
    pub currency: String,
    pub steps: Vec<PricingStep>,
}

impl PricingOutcome {
    pub fn breakdown(&self) -> Vec<String> {
        self.steps.iter().map(PricingStep::describe).collect()
    }

    pub fn into_response(self) -> PriceResponse {
        let breakdown = self.breakdown();
        PriceResponse { price: Some(self.price), currency: Some(self.currency), breakdown }
    }
}

pub trait PricingEngine: Send + Sync {
    fn price(
        &self,
        profile: &PricingProfile,
        selection: &Selection,
        currency: &str,
    ) -> Result<PricingOutcome, DomainError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ProfilePricingEngine;

impl PricingEngine for ProfilePricingEngine {
    fn price(
        &self,
        profile: &PricingProfile,
        selection: &Selection,
        currency: &str,
    ) -> Result<PricingOutcome, DomainError> {
        evaluate_profile(profile, selection, currency)
    }
}

/// Which engine the local backend prices with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingModel {
    /// Base price plus attribute rules.
    #[default]
    Profile,
    /// Cost rollup from the shop rate card, see [`cost::SignCostEngine`].
    Fabrication,
}

impl PricingModel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Fabrication => "fabrication",
        }
    }
}

impl fmt::Display for PricingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PricingModel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "profile" => Ok(Self::Profile),
            "fabrication" => Ok(Self::Fabrication),
            other => Err(format!("unknown pricing model `{other}`; expected profile or fabrication")),
        }
    }
}

impl PricingEngine for PricingModel {
    fn price(
        &self,
        profile: &PricingProfile,
        selection: &Selection,
        currency: &str,
    ) -> Result<PricingOutcome, DomainError> {
        match self {
            Self::Profile => evaluate_profile(profile, selection, currency),
            Self::Fabrication => cost::SignCostEngine::default().price(profile, selection, currency),
        }
    }
}

/// Applies the profile's active rules in order. Fails instead of overflowing when an
/// intermediate amount leaves the representable range.
pub fn evaluate_profile(
    profile: &PricingProfile,
    selection: &Selection,
    currency: &str,
) -> Result<PricingOutcome, DomainError> {
    let mut subtotal = profile.base_price;
    let mut steps = Vec::new();

    for rule in profile.rules.iter().filter(|rule| rule.active) {
        let value = selection.get(&rule.attribute);
        if !rule.matches(value) {
            continue;
        }

        let delta = match rule.mode {
            RuleMode::Fixed => Some(rule.amount),
            RuleMode::Percent => subtotal
                .checked_mul(rule.amount)
                .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED)),
            RuleMode::PerUnit => value
                .and_then(AttributeValue::as_decimal)
                .unwrap_or(Decimal::ZERO)
                .checked_mul(rule.rate),
        };
        subtotal = delta
            .and_then(|delta| subtotal.checked_add(delta))
            .ok_or_else(|| price_out_of_range(&rule.label()))?;

        if let Some(delta) = delta.filter(|delta| !delta.is_zero()) {
            steps.push(PricingStep { label: rule.label(), delta, subtotal });
        }
    }

    let price = round_to_step(subtotal, profile.rounding)
        .ok_or_else(|| price_out_of_range("rounding"))?;
    Ok(PricingOutcome { profile: profile.name.clone(), price, currency: currency.to_owned(), steps })
}

pub(crate) fn price_out_of_range(step: &str) -> DomainError {
    DomainError::OutOfRange(format!("price after `{step}`"))
}

/// Rounds to the nearest multiple of `step`; no-op when the step is absent or zero.
/// `None` when the rounded value overflows.
pub fn round_to_step(value: Decimal, step: Option<Decimal>) -> Option<Decimal> {
    match step {
        Some(step) if !step.is_zero() => {
            value.checked_div(step).and_then(|units| units.round().checked_mul(step))
        }
        _ => Some(value),
    }
}
