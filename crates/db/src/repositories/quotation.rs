use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use signcfg_core::domain::price::PriceList;
use signcfg_core::domain::quotation::{LineItem, Quotation, QuotationId};
use signcfg_core::domain::variant::ItemCode;
use signcfg_core::errors::RemoteError;
use signcfg_core::ports::QuotationStore;
use sqlx::{sqlite::SqliteRow, Row};

use super::{parse_decimal, RepositoryError};
use crate::DbPool;

/// Quotation documents with their child rows.
///
/// `save` uses the `modified` stamp as an optimistic lock: a document changed after it was
/// loaded is rejected instead of overwritten.
#[derive(Clone)]
pub struct SqlQuotationRepository {
    pool: DbPool,
}

impl SqlQuotationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &QuotationId) -> Result<Option<Quotation>, RepositoryError> {
        let Some(row) = sqlx::query(
            r#"
            SELECT id, customer, selling_price_list, currency, total_qty, grand_total, modified
            FROM quotation
            WHERE id = ?
            "#,
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query(
            r#"
            SELECT idx, item_code, item_name, description, qty, uom, rate, amount
            FROM quotation_item
            WHERE quotation_id = ?
            ORDER BY idx
            "#,
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(line_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Quotation {
            id: QuotationId(row.try_get("id")?),
            customer: row.try_get("customer")?,
            selling_price_list: row
                .try_get::<Option<String>, _>("selling_price_list")?
                .filter(|name| !name.trim().is_empty())
                .map(PriceList),
            currency: row.try_get::<Option<String>, _>("currency")?.filter(|code| !code.is_empty()),
            items,
            total_qty: parse_decimal("total_qty", &row.try_get::<String, _>("total_qty")?)?,
            grand_total: parse_decimal("grand_total", &row.try_get::<String, _>("grand_total")?)?,
            modified: parse_timestamp(&row.try_get::<String, _>("modified")?)?,
        }))
    }

    /// Inserts a new quotation header; fails when the id is taken.
    pub async fn create(&self, quotation: &Quotation) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO quotation
                (id, customer, selling_price_list, currency, total_qty, grand_total, modified)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&quotation.id.0)
        .bind(quotation.customer.as_deref())
        .bind(quotation.selling_price_list.as_ref().map(|list| list.0.as_str()))
        .bind(quotation.currency.as_deref())
        .bind(quotation.total_qty.to_string())
        .bind(quotation.grand_total.to_string())
        .bind(timestamp_text(&quotation.modified))
        .execute(&mut *tx)
        .await?;
        insert_lines(&mut tx, quotation).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn save(&self, quotation: &Quotation) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE quotation
            SET customer = ?, selling_price_list = ?, currency = ?, total_qty = ?,
                grand_total = ?, modified = ?
            WHERE id = ? AND modified = ?
            "#,
        )
        .bind(quotation.customer.as_deref())
        .bind(quotation.selling_price_list.as_ref().map(|list| list.0.as_str()))
        .bind(quotation.currency.as_deref())
        .bind(quotation.total_qty.to_string())
        .bind(quotation.grand_total.to_string())
        .bind(timestamp_text(&Utc::now()))
        .bind(&quotation.id.0)
        .bind(timestamp_text(&quotation.modified))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM quotation WHERE id = ?)")
                .bind(&quotation.id.0)
                .fetch_one(&mut *tx)
                .await?;
            return Err(if exists == 0 {
                RepositoryError::NotFound(format!("quotation `{}`", quotation.id))
            } else {
                RepositoryError::Conflict(format!(
                    "quotation `{}` was modified after it was loaded; reload and try again",
                    quotation.id
                ))
            });
        }

        sqlx::query("DELETE FROM quotation_item WHERE quotation_id = ?")
            .bind(&quotation.id.0)
            .execute(&mut *tx)
            .await?;
        insert_lines(&mut tx, quotation).await?;

        tx.commit().await?;
        Ok(())
    }
}

async fn insert_lines(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    quotation: &Quotation,
) -> Result<(), RepositoryError> {
    for line in &quotation.items {
        sqlx::query(
            r#"
            INSERT INTO quotation_item
                (quotation_id, idx, item_code, item_name, description, qty, uom, rate, amount)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&quotation.id.0)
        .bind(i64::from(line.idx))
        .bind(line.item_code.as_ref().map(|code| code.0.as_str()))
        .bind(line.item_name.as_deref())
        .bind(line.description.as_deref())
        .bind(line.qty.to_string())
        .bind(line.uom.as_deref())
        .bind(line.rate.to_string())
        .bind(line.amount.to_string())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn line_from_row(row: &SqliteRow) -> Result<LineItem, RepositoryError> {
    let idx: i64 = row.try_get("idx")?;
    Ok(LineItem {
        idx: u32::try_from(idx)
            .map_err(|_| RepositoryError::Decode(format!("quotation_item idx `{idx}` is out of range")))?,
        item_code: row
            .try_get::<Option<String>, _>("item_code")?
            .filter(|code| !code.trim().is_empty())
            .map(ItemCode),
        item_name: row.try_get("item_name")?,
        description: row.try_get("description")?,
        qty: parse_decimal("qty", &row.try_get::<String, _>("qty")?)?,
        uom: row.try_get("uom")?,
        rate: parse_decimal("rate", &row.try_get::<String, _>("rate")?)?,
        amount: parse_decimal("amount", &row.try_get::<String, _>("amount")?)?,
    })
}

fn timestamp_text(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("modified `{value}` is not RFC 3339: {error}")))
}

#[async_trait]
impl QuotationStore for SqlQuotationRepository {
    async fn load_quotation(&self, id: &QuotationId) -> Result<Quotation, RemoteError> {
        match self.find_by_id(id).await {
            Ok(Some(quotation)) => Ok(quotation),
            Ok(None) => Err(RemoteError::not_found(format!("quotation `{id}`"))),
            Err(error) => Err(error.into_remote("load_quotation")),
        }
    }

    async fn save_document(&self, quotation: &Quotation) -> Result<(), RemoteError> {
        self.save(quotation).await.map_err(|error| error.into_remote("save_document"))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use signcfg_core::domain::quotation::{NewLine, QuotationId};
    use signcfg_core::domain::variant::ItemCode;
    use signcfg_core::errors::RemoteError;
    use signcfg_core::ports::QuotationStore;

    use super::SqlQuotationRepository;
    use crate::fixtures::SignSeedDataset;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn seeded_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SignSeedDataset::load(&pool).await.expect("seed");
        pool
    }

    fn qtn() -> QuotationId {
        QuotationId("QTN-0001".to_owned())
    }

    fn sign_line() -> NewLine {
        NewLine {
            item_code: ItemCode("LED-SIGN-01".to_owned()),
            item_name: Some("LED Sign".to_owned()),
            qty: Decimal::from(2),
            uom: "Nos".to_owned(),
            rate: Decimal::new(9950, 2),
        }
    }

    #[tokio::test]
    async fn seeded_quotation_loads_with_blank_row() {
        let repo = SqlQuotationRepository::new(seeded_pool().await);

        let quotation = repo.load_quotation(&qtn()).await.expect("load");

        assert_eq!(quotation.items.len(), 1);
        assert!(quotation.items[0].is_blank());
        assert_eq!(quotation.currency.as_deref(), Some("USD"));
    }

    #[tokio::test]
    async fn saved_lines_and_totals_are_reloaded() {
        let repo = SqlQuotationRepository::new(seeded_pool().await);
        let mut quotation = repo.load_quotation(&qtn()).await.expect("load");
        quotation.append_line_item(sign_line()).expect("append");

        repo.save_document(&quotation).await.expect("save");
        let reloaded = repo.load_quotation(&qtn()).await.expect("reload");

        assert_eq!(reloaded.items.len(), 1);
        assert_eq!(reloaded.items[0].item_code, Some(ItemCode("LED-SIGN-01".to_owned())));
        assert_eq!(reloaded.items[0].amount, Decimal::from(199));
        assert_eq!(reloaded.grand_total, Decimal::from(199));
        assert!(reloaded.modified > quotation.modified);
    }

    #[tokio::test]
    async fn stale_document_is_rejected() {
        let repo = SqlQuotationRepository::new(seeded_pool().await);
        let stale = repo.load_quotation(&qtn()).await.expect("load");
        repo.save_document(&stale).await.expect("first save");

        let error = repo.save_document(&stale).await.expect_err("stale save");

        assert!(matches!(error, RemoteError::Rejected { .. }));
    }

    #[tokio::test]
    async fn missing_quotation_is_not_found() {
        let repo = SqlQuotationRepository::new(seeded_pool().await);

        let error =
            repo.load_quotation(&QuotationId("QTN-404".to_owned())).await.expect_err("missing");

        assert!(matches!(error, RemoteError::NotFound { .. }));
    }
}
