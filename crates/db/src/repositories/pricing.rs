use async_trait::async_trait;
use signcfg_core::domain::price::PriceResponse;
use signcfg_core::domain::selection::Selection;
use signcfg_core::domain::template::TemplateId;
use signcfg_core::errors::RemoteError;
use signcfg_core::ports::PricingService;
use signcfg_core::pricing::{
    PricingEngine, PricingProfile, PricingRule, ProfilePricingEngine, RuleMode, RuleOperator,
};
use sqlx::{sqlite::SqliteRow, Row};
use tracing::debug;

use super::{parse_decimal, parse_optional_decimal, RepositoryError};
use crate::DbPool;

/// Pricing profiles and the calculator that evaluates them.
pub struct SqlPricingRepository<E = ProfilePricingEngine> {
    pool: DbPool,
    engine: E,
    currency: String,
    profile: Option<String>,
}

impl SqlPricingRepository {
    pub fn new(pool: DbPool, currency: impl Into<String>) -> Self {
        Self { pool, engine: ProfilePricingEngine, currency: currency.into(), profile: None }
    }
}

impl<E: PricingEngine> SqlPricingRepository<E> {
    /// Swaps the calculator while keeping the stored profiles.
    pub fn with_engine<T: PricingEngine>(self, engine: T) -> SqlPricingRepository<T> {
        SqlPricingRepository {
            pool: self.pool,
            engine,
            currency: self.currency,
            profile: self.profile,
        }
    }

    /// Always price with the named profile instead of the template's first one.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub async fn find_profile(
        &self,
        template: &TemplateId,
    ) -> Result<PricingProfile, RepositoryError> {
        let row = match &self.profile {
            Some(name) => {
                sqlx::query(
                    "SELECT name, template, base_price, rounding FROM pricing_profile WHERE name = ?",
                )
                .bind(name)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT name, template, base_price, rounding
                    FROM pricing_profile
                    WHERE template = ?
                    ORDER BY created_at, rowid
                    LIMIT 1
                    "#,
                )
                .bind(&template.0)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        let row = row.ok_or_else(|| {
            RepositoryError::NotFound(format!("pricing profile for template `{template}`"))
        })?;

        let name: String = row.try_get("name")?;
        let rules = sqlx::query(
            r#"
            SELECT attribute_name, operator, value, min_value, max_value, mode, amount, rate, active, notes
            FROM pricing_rule
            WHERE profile = ?
            ORDER BY idx
            "#,
        )
        .bind(&name)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(rule_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(PricingProfile {
            template: TemplateId(row.try_get("template")?),
            base_price: parse_decimal("base_price", &row.try_get::<String, _>("base_price")?)?,
            rounding: parse_optional_decimal("rounding", row.try_get("rounding")?)?,
            name,
            rules,
        })
    }

    /// Inserts or replaces a profile and all of its rules.
    pub async fn save_profile(&self, profile: &PricingProfile) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO pricing_profile (name, template, base_price, rounding)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                template = excluded.template,
                base_price = excluded.base_price,
                rounding = excluded.rounding
            "#,
        )
        .bind(&profile.name)
        .bind(&profile.template.0)
        .bind(profile.base_price.to_string())
        .bind(profile.rounding.map(|step| step.to_string()))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM pricing_rule WHERE profile = ?")
            .bind(&profile.name)
            .execute(&mut *tx)
            .await?;

        for (position, rule) in profile.rules.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO pricing_rule
                    (profile, idx, attribute_name, operator, value, min_value, max_value, mode, amount, rate, active, notes)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&profile.name)
            .bind(i64::try_from(position + 1).unwrap_or(i64::MAX))
            .bind(&rule.attribute)
            .bind(operator_code(rule.operator))
            .bind(rule.value.as_deref())
            .bind(rule.min_value.map(|value| value.to_string()))
            .bind(rule.max_value.map(|value| value.to_string()))
            .bind(mode_code(rule.mode))
            .bind(rule.amount.to_string())
            .bind(rule.rate.to_string())
            .bind(rule.active)
            .bind(rule.notes.as_deref())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn price(
        &self,
        template: &TemplateId,
        selection: &Selection,
    ) -> Result<PriceResponse, RepositoryError> {
        let profile = self.find_profile(template).await?;
        let outcome = self.engine.price(&profile, selection, &self.currency)?;
        debug!(
            event_name = "db.price_evaluated",
            template = %template,
            profile = %outcome.profile,
            price = %outcome.price,
            steps = outcome.steps.len(),
            "pricing profile evaluated"
        );
        Ok(outcome.into_response())
    }
}

#[async_trait]
impl<E: PricingEngine> PricingService for SqlPricingRepository<E> {
    async fn compute_price(
        &self,
        template: &TemplateId,
        selection: &Selection,
    ) -> Result<PriceResponse, RemoteError> {
        self.price(template, selection).await.map_err(|error| error.into_remote("compute_price"))
    }
}

fn rule_from_row(row: &SqliteRow) -> Result<PricingRule, RepositoryError> {
    let operator: String = row.try_get("operator")?;
    let mode: String = row.try_get("mode")?;

    Ok(PricingRule {
        attribute: row.try_get("attribute_name")?,
        operator: parse_operator(&operator)?,
        value: row.try_get("value")?,
        min_value: parse_optional_decimal("min_value", row.try_get("min_value")?)?,
        max_value: parse_optional_decimal("max_value", row.try_get("max_value")?)?,
        mode: parse_mode(&mode)?,
        amount: parse_decimal("amount", &row.try_get::<String, _>("amount")?)?,
        rate: parse_decimal("rate", &row.try_get::<String, _>("rate")?)?,
        active: row.try_get("active")?,
        notes: row.try_get("notes")?,
    })
}

fn operator_code(operator: RuleOperator) -> &'static str {
    match operator {
        RuleOperator::Equals => "equals",
        RuleOperator::NotEquals => "not_equals",
        RuleOperator::Between => "between",
        RuleOperator::IsSet => "is_set",
    }
}

fn parse_operator(value: &str) -> Result<RuleOperator, RepositoryError> {
    match value {
        "equals" => Ok(RuleOperator::Equals),
        "not_equals" => Ok(RuleOperator::NotEquals),
        "between" => Ok(RuleOperator::Between),
        "is_set" => Ok(RuleOperator::IsSet),
        other => Err(RepositoryError::Decode(format!("unknown rule operator `{other}`"))),
    }
}

fn mode_code(mode: RuleMode) -> &'static str {
    match mode {
        RuleMode::Fixed => "fixed",
        RuleMode::Percent => "percent",
        RuleMode::PerUnit => "per_unit",
    }
}

fn parse_mode(value: &str) -> Result<RuleMode, RepositoryError> {
    match value {
        "fixed" => Ok(RuleMode::Fixed),
        "percent" => Ok(RuleMode::Percent),
        "per_unit" => Ok(RuleMode::PerUnit),
        other => Err(RepositoryError::Decode(format!("unknown rule mode `{other}`"))),
    }
}
