use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rust_decimal::Decimal;
use signcfg_core::domain::price::{NewPriceEntry, PriceEntry, PriceEntryId, PriceList};
use signcfg_core::domain::variant::ItemCode;
use signcfg_core::errors::RemoteError;
use signcfg_core::ports::PriceBook;
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use super::{parse_decimal, RepositoryError};
use crate::DbPool;

#[derive(Clone)]
pub struct SqlPriceBookRepository {
    pool: DbPool,
}

impl SqlPriceBookRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find(
        &self,
        item_code: &ItemCode,
        price_list: &PriceList,
    ) -> Result<Option<PriceEntry>, RepositoryError> {
        sqlx::query(
            r#"
            SELECT id, item_code, price_list, price_list_rate, currency, uom, selling
            FROM item_price
            WHERE item_code = ? AND price_list = ?
            "#,
        )
        .bind(&item_code.0)
        .bind(&price_list.0)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(entry_from_row)
        .transpose()
    }

    pub async fn list_for_item(
        &self,
        item_code: &ItemCode,
    ) -> Result<Vec<PriceEntry>, RepositoryError> {
        sqlx::query(
            r#"
            SELECT id, item_code, price_list, price_list_rate, currency, uom, selling
            FROM item_price
            WHERE item_code = ?
            ORDER BY price_list
            "#,
        )
        .bind(&item_code.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(entry_from_row)
        .collect()
    }

    pub async fn update_rate(
        &self,
        entry_id: &PriceEntryId,
        rate: Decimal,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE item_price SET price_list_rate = ?, modified = ? WHERE id = ?")
            .bind(rate.to_string())
            .bind(now_text())
            .bind(&entry_id.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("item price `{}`", entry_id.0)));
        }
        Ok(())
    }

    pub async fn insert(&self, entry: NewPriceEntry) -> Result<PriceEntry, RepositoryError> {
        let entry = entry.into_entry(PriceEntryId(format!("IP-{}", Uuid::new_v4().simple())));
        sqlx::query(
            r#"
            INSERT INTO item_price
                (id, item_code, price_list, price_list_rate, currency, uom, selling, modified)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id.0)
        .bind(&entry.item_code.0)
        .bind(&entry.price_list.0)
        .bind(entry.rate.to_string())
        .bind(&entry.currency)
        .bind(&entry.uom)
        .bind(entry.selling)
        .bind(now_text())
        .execute(&self.pool)
        .await?;
        Ok(entry)
    }
}

fn now_text() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn entry_from_row(row: &SqliteRow) -> Result<PriceEntry, RepositoryError> {
    Ok(PriceEntry {
        id: PriceEntryId(row.try_get("id")?),
        item_code: ItemCode(row.try_get("item_code")?),
        price_list: PriceList(row.try_get("price_list")?),
        rate: parse_decimal("price_list_rate", &row.try_get::<String, _>("price_list_rate")?)?,
        currency: row.try_get("currency")?,
        uom: row.try_get("uom")?,
        selling: row.try_get("selling")?,
    })
}

#[async_trait]
impl PriceBook for SqlPriceBookRepository {
    async fn find_price_entry(
        &self,
        item_code: &ItemCode,
        price_list: &PriceList,
    ) -> Result<Option<PriceEntry>, RemoteError> {
        self.find(item_code, price_list).await.map_err(|error| error.into_remote("find_price_entry"))
    }

    async fn update_price_entry(
        &self,
        entry_id: &PriceEntryId,
        rate: Decimal,
    ) -> Result<(), RemoteError> {
        self.update_rate(entry_id, rate)
            .await
            .map_err(|error| error.into_remote("update_price_entry"))
    }

    async fn insert_price_entry(&self, entry: NewPriceEntry) -> Result<(), RemoteError> {
        self.insert(entry)
            .await
            .map(|_| ())
            .map_err(|error| error.into_remote("insert_price_entry"))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use signcfg_core::domain::price::{NewPriceEntry, PriceEntryId, PriceList};
    use signcfg_core::domain::variant::ItemCode;
    use signcfg_core::errors::RemoteError;
    use signcfg_core::ports::PriceBook;

    use super::SqlPriceBookRepository;
    use crate::fixtures::SignSeedDataset;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn seeded_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SignSeedDataset::load(&pool).await.expect("seed");
        pool
    }

    fn entry(rate: i64) -> NewPriceEntry {
        NewPriceEntry {
            item_code: ItemCode("LED-SIGN-01".to_owned()),
            price_list: PriceList("Standard Selling".to_owned()),
            rate: Decimal::from(rate),
            currency: "USD".to_owned(),
            uom: "Nos".to_owned(),
            selling: true,
        }
    }

    #[tokio::test]
    async fn insert_then_update_keeps_one_entry() {
        let repo = SqlPriceBookRepository::new(seeded_pool().await);
        let item = ItemCode("LED-SIGN-01".to_owned());
        let list = PriceList("Standard Selling".to_owned());

        repo.insert_price_entry(entry(150)).await.expect("insert");
        let found = repo.find_price_entry(&item, &list).await.expect("find").expect("entry");
        repo.update_price_entry(&found.id, Decimal::from(175)).await.expect("update");

        let entries = repo.list_for_item(&item).await.expect("list");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rate, Decimal::from(175));
        assert!(entries[0].selling);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected_by_unique_index() {
        let repo = SqlPriceBookRepository::new(seeded_pool().await);
        repo.insert_price_entry(entry(150)).await.expect("insert");

        let error = repo.insert_price_entry(entry(160)).await.expect_err("duplicate");

        assert!(matches!(error, RemoteError::Rejected { .. }));
    }

    #[tokio::test]
    async fn updating_unknown_entry_is_not_found() {
        let repo = SqlPriceBookRepository::new(seeded_pool().await);

        let error = repo
            .update_price_entry(&PriceEntryId("IP-missing".to_owned()), Decimal::ONE)
            .await
            .expect_err("missing");

        assert!(matches!(error, RemoteError::NotFound { .. }));
    }
}
