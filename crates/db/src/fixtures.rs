use serde::Serialize;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

pub const SEED_TEMPLATE: &str = "LED-SIGN-01";
pub const SEED_PROFILE: &str = "LED Sign Pricing";
pub const SEED_PRICE_LIST: &str = "Standard Selling";
pub const SEED_QUOTATION: &str = "QTN-0001";

/// Rows the seed must leave behind, as `(check label, SQL returning 0 or 1)`.
const SEED_CHECKS: &[(&str, &str)] = &[
    (
        "template",
        "SELECT EXISTS(SELECT 1 FROM item WHERE item_code = 'LED-SIGN-01' AND has_variants = 1)",
    ),
    (
        "template-attributes",
        "SELECT COUNT(1) = 2 FROM template_attribute WHERE item_code = 'LED-SIGN-01'",
    ),
    ("color-values", "SELECT COUNT(1) = 3 FROM item_attribute_value WHERE attribute_name = 'Color'"),
    (
        "pricing-profile",
        "SELECT EXISTS(SELECT 1 FROM pricing_profile WHERE name = 'LED Sign Pricing' AND template = 'LED-SIGN-01')",
    ),
    ("pricing-rules", "SELECT COUNT(1) = 3 FROM pricing_rule WHERE profile = 'LED Sign Pricing'"),
    (
        "price-list",
        "SELECT EXISTS(SELECT 1 FROM price_list WHERE name = 'Standard Selling' AND selling = 1)",
    ),
    ("quotation", "SELECT EXISTS(SELECT 1 FROM quotation WHERE id = 'QTN-0001')"),
];

/// Demo dataset: the `LED-SIGN-01` template with `Color` and `Size`, its pricing profile,
/// the `Standard Selling` price list and draft quotation `QTN-0001`.
pub struct SignSeedDataset;

impl SignSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/led_sign_seed.sql");

    /// Loads the dataset; rows that already exist are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(Self::SQL).execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(SeedResult {
            template: SEED_TEMPLATE,
            pricing_profile: SEED_PROFILE,
            price_list: SEED_PRICE_LIST,
            quotation: SEED_QUOTATION,
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::with_capacity(SEED_CHECKS.len());
        for (label, sql) in SEED_CHECKS {
            let present: i64 = sqlx::query_scalar(sql).fetch_one(pool).await?;
            checks.push((*label, present == 1));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SeedResult {
    pub template: &'static str,
    pub pricing_profile: &'static str,
    pub price_list: &'static str,
    pub quotation: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
