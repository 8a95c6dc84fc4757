use async_trait::async_trait;
use signcfg_core::domain::selection::Selection;
use signcfg_core::domain::template::{Attribute, Template, TemplateId};
use signcfg_core::domain::variant::{ItemCode, Variant};
use signcfg_core::errors::RemoteError;
use signcfg_core::ports::{AttributeCatalog, VariantService};
use sqlx::Row;
use tracing::debug;

use super::RepositoryError;
use crate::DbPool;

/// Templates, attributes and variants stored in the `item*` tables.
#[derive(Clone)]
pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_template(&self, id: &TemplateId) -> Result<Template, RepositoryError> {
        let row = sqlx::query(
            "SELECT item_code, item_name, has_variants FROM item WHERE item_code = ? AND variant_of IS NULL",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("template `{id}`")))?;

        let attribute_rows = sqlx::query(
            r#"
            SELECT ta.attribute_name, ia.numeric_values
            FROM template_attribute ta
            JOIN item_attribute ia ON ia.attribute_name = ta.attribute_name
            WHERE ta.item_code = ?
            ORDER BY ta.idx
            "#,
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut attributes = Vec::with_capacity(attribute_rows.len());
        for attribute_row in attribute_rows {
            let name: String = attribute_row.try_get("attribute_name")?;
            let numeric: bool = attribute_row.try_get("numeric_values")?;
            if numeric {
                attributes.push(Attribute::numeric(name));
                continue;
            }

            let values: Vec<String> = sqlx::query_scalar(
                "SELECT attribute_value FROM item_attribute_value WHERE attribute_name = ? ORDER BY idx",
            )
            .bind(&name)
            .fetch_all(&self.pool)
            .await?;
            attributes.push(Attribute::discrete(name, values));
        }

        Ok(Template {
            id: TemplateId(row.try_get("item_code")?),
            item_name: row.try_get("item_name")?,
            has_variants: row.try_get("has_variants")?,
            attributes,
        })
    }

    /// Inserts or replaces a template together with its attribute definitions. An attribute's
    /// permitted values are replaced wholesale.
    pub async fn save_template(&self, template: &Template) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO item (item_code, item_name, has_variants)
            VALUES (?, ?, ?)
            ON CONFLICT(item_code) DO UPDATE SET
                item_name = excluded.item_name,
                has_variants = excluded.has_variants
            "#,
        )
        .bind(&template.id.0)
        .bind(&template.item_name)
        .bind(template.has_variants)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM template_attribute WHERE item_code = ?")
            .bind(&template.id.0)
            .execute(&mut *tx)
            .await?;

        for (position, attribute) in template.attributes.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO item_attribute (attribute_name, numeric_values) VALUES (?, ?)
                ON CONFLICT(attribute_name) DO UPDATE SET numeric_values = excluded.numeric_values
                "#,
            )
            .bind(&attribute.name)
            .bind(attribute.is_numeric())
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM item_attribute_value WHERE attribute_name = ?")
                .bind(&attribute.name)
                .execute(&mut *tx)
                .await?;

            for (value_position, value) in attribute.permitted_values().iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO item_attribute_value (attribute_name, attribute_value, idx)
                    VALUES (?, ?, ?)
                    ON CONFLICT(attribute_name, attribute_value) DO UPDATE SET idx = excluded.idx
                    "#,
                )
                .bind(&attribute.name)
                .bind(value)
                .bind(ordinal(value_position))
                .execute(&mut *tx)
                .await?;
            }

            sqlx::query(
                "INSERT INTO template_attribute (item_code, attribute_name, idx) VALUES (?, ?, ?)",
            )
            .bind(&template.id.0)
            .bind(&attribute.name)
            .bind(ordinal(position))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn find_variant_code(
        &self,
        template: &TemplateId,
        selection: &Selection,
    ) -> Result<Option<ItemCode>, RepositoryError> {
        let code: Option<String> = sqlx::query_scalar(
            "SELECT item_code FROM item WHERE variant_of = ? AND variant_signature = ?",
        )
        .bind(&template.0)
        .bind(selection.signature())
        .fetch_optional(&self.pool)
        .await?;
        Ok(code.map(ItemCode))
    }

    /// Creates the variant, or returns the existing one when the selection was already
    /// materialised. Item codes that are taken by another item get a numeric suffix.
    pub async fn create_variant_item(
        &self,
        template_id: &TemplateId,
        selection: &Selection,
    ) -> Result<ItemCode, RepositoryError> {
        let template = self.find_template(template_id).await?;
        if !template.has_variants {
            return Err(RepositoryError::Conflict(format!(
                "template `{template_id}` does not allow variants"
            )));
        }
        selection
            .validate_against(&template)
            .map_err(|error| RepositoryError::Conflict(error.to_string()))?;

        let variant = Variant::new(&template, selection.clone());
        let signature = selection.signature();
        let mut tx = self.pool.begin().await?;

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT item_code FROM item WHERE variant_of = ? AND variant_signature = ?",
        )
        .bind(&template.id.0)
        .bind(&signature)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(existing) = existing {
            tx.commit().await?;
            return Ok(ItemCode(existing));
        }

        let mut item_code = variant.item_code.0.clone();
        let mut suffix = 1u32;
        loop {
            let taken: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM item WHERE item_code = ?)")
                .bind(&item_code)
                .fetch_one(&mut *tx)
                .await?;
            if taken == 0 {
                break;
            }
            suffix += 1;
            item_code = format!("{}-{suffix}", variant.item_code.0);
        }

        sqlx::query(
            r#"
            INSERT INTO item (item_code, item_name, has_variants, variant_of, variant_signature)
            VALUES (?, ?, 0, ?, ?)
            "#,
        )
        .bind(&item_code)
        .bind(&variant.item_name)
        .bind(&template.id.0)
        .bind(&signature)
        .execute(&mut *tx)
        .await?;

        for (name, value) in selection.iter() {
            sqlx::query(
                "INSERT INTO variant_attribute (item_code, attribute_name, attribute_value) VALUES (?, ?, ?)",
            )
            .bind(&item_code)
            .bind(name)
            .bind(value.canonical())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            event_name = "db.variant_created",
            template = %template.id,
            item_code = %item_code,
            "variant item inserted"
        );
        Ok(ItemCode(item_code))
    }
}

fn ordinal(position: usize) -> i64 {
    i64::try_from(position + 1).unwrap_or(i64::MAX)
}

#[async_trait]
impl AttributeCatalog for SqlCatalogRepository {
    async fn get_attribute_catalog(&self, template: &TemplateId) -> Result<Template, RemoteError> {
        self.find_template(template)
            .await
            .map_err(|error| error.into_remote("get_attribute_catalog"))
    }
}

#[async_trait]
impl VariantService for SqlCatalogRepository {
    async fn find_variant(
        &self,
        template: &TemplateId,
        selection: &Selection,
    ) -> Result<Option<ItemCode>, RemoteError> {
        self.find_variant_code(template, selection)
            .await
            .map_err(|error| error.into_remote("find_variant"))
    }

    async fn create_variant(
        &self,
        template: &TemplateId,
        selection: &Selection,
    ) -> Result<Option<ItemCode>, RemoteError> {
        self.create_variant_item(template, selection)
            .await
            .map(Some)
            .map_err(|error| error.into_remote("create_variant"))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use signcfg_core::domain::selection::Selection;
    use signcfg_core::domain::template::{Attribute, Template, TemplateId};
    use signcfg_core::domain::variant::ItemCode;
    use signcfg_core::errors::RemoteError;
    use signcfg_core::ports::{AttributeCatalog, VariantService};

    use super::SqlCatalogRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn template() -> Template {
        Template {
            id: TemplateId("LED-SIGN-01".to_owned()),
            item_name: "LED Sign".to_owned(),
            has_variants: true,
            attributes: vec![
                Attribute::discrete("Color", ["Red", "Blue"]),
                Attribute::numeric("Size"),
            ],
        }
    }

    fn red(size: i64) -> Selection {
        Selection::new().with("Color", "Red").with("Size", Decimal::from(size))
    }

    #[tokio::test]
    async fn catalog_round_trips_attribute_order_and_values() {
        let repo = SqlCatalogRepository::new(setup_pool().await);
        repo.save_template(&template()).await.expect("save template");

        let loaded = repo.get_attribute_catalog(&template().id).await.expect("load catalog");

        assert_eq!(loaded, template());
    }

    #[tokio::test]
    async fn unknown_template_is_not_found() {
        let repo = SqlCatalogRepository::new(setup_pool().await);

        let error = repo
            .get_attribute_catalog(&TemplateId("NOPE".to_owned()))
            .await
            .expect_err("missing template");

        assert!(matches!(error, RemoteError::NotFound { .. }));
    }

    #[tokio::test]
    async fn create_variant_is_idempotent_per_selection() {
        let repo = SqlCatalogRepository::new(setup_pool().await);
        repo.save_template(&template()).await.expect("save template");

        assert_eq!(repo.find_variant(&template().id, &red(24)).await.expect("find"), None);
        let created = repo.create_variant(&template().id, &red(24)).await.expect("create");
        let again = repo.create_variant(&template().id, &red(24)).await.expect("create again");
        let found = repo.find_variant(&template().id, &red(24)).await.expect("find");

        assert_eq!(created, Some(ItemCode("LED-SIGN-01-RED-24".to_owned())));
        assert_eq!(again, created);
        assert_eq!(found, created);
    }

    #[tokio::test]
    async fn colliding_item_codes_get_a_suffix() {
        let pool = setup_pool().await;
        let repo = SqlCatalogRepository::new(pool.clone());
        repo.save_template(&template()).await.expect("save template");
        sqlx::query("INSERT INTO item (item_code, item_name) VALUES ('LED-SIGN-01-RED-24', 'Legacy')")
            .execute(&pool)
            .await
            .expect("insert legacy item");

        let created = repo.create_variant(&template().id, &red(24)).await.expect("create");

        assert_eq!(created, Some(ItemCode("LED-SIGN-01-RED-24-2".to_owned())));
    }

    #[tokio::test]
    async fn create_variant_rejects_values_outside_the_template() {
        let repo = SqlCatalogRepository::new(setup_pool().await);
        repo.save_template(&template()).await.expect("save template");

        let error = repo
            .create_variant(
                &template().id,
                &Selection::new().with("Color", "Green").with("Size", Decimal::from(24)),
            )
            .await
            .expect_err("green is not permitted");

        assert!(matches!(error, RemoteError::Rejected { .. }));
    }

    #[tokio::test]
    async fn resaving_a_template_drops_removed_values() {
        let repo = SqlCatalogRepository::new(setup_pool().await);
        repo.save_template(&template()).await.expect("save template");

        let mut narrowed = template();
        narrowed.attributes[0] = Attribute::discrete("Color", ["Blue"]);
        repo.save_template(&narrowed).await.expect("save narrowed template");

        let loaded = repo.get_attribute_catalog(&narrowed.id).await.expect("load catalog");
        assert_eq!(loaded.attributes[0].permitted_values().to_vec(), vec!["Blue".to_owned()]);

        let error = repo.create_variant(&narrowed.id, &red(24)).await.expect_err("red was removed");
        assert!(matches!(error, RemoteError::Rejected { .. }));
    }

    #[tokio::test]
    async fn separators_inside_values_keep_variants_apart() {
        let repo = SqlCatalogRepository::new(setup_pool().await);
        let channel = Template {
            id: TemplateId("CHANNEL-01".to_owned()),
            item_name: "Channel Letters".to_owned(),
            has_variants: true,
            attributes: vec![
                Attribute::discrete("Face", ["Acrylic;Trim=Gold", "Acrylic"]),
                Attribute::discrete("Trim", ["Black", "Gold;Trim=Black"]),
            ],
        };
        repo.save_template(&channel).await.expect("save template");
        let first = Selection::new().with("Face", "Acrylic;Trim=Gold").with("Trim", "Black");
        let second = Selection::new().with("Face", "Acrylic").with("Trim", "Gold;Trim=Black");

        let first_code = repo.create_variant(&channel.id, &first).await.expect("create first");
        assert_eq!(repo.find_variant(&channel.id, &second).await.expect("find"), None);
        let second_code = repo.create_variant(&channel.id, &second).await.expect("create second");

        assert_ne!(first_code, second_code);
        assert_eq!(repo.find_variant(&channel.id, &first).await.expect("find"), first_code);
    }
}
