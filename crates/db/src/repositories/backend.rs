use async_trait::async_trait;
use rust_decimal::Decimal;
use signcfg_core::domain::price::{NewPriceEntry, PriceEntry, PriceEntryId, PriceList, PriceResponse};
use signcfg_core::domain::quotation::{Quotation, QuotationId};
use signcfg_core::domain::selection::Selection;
use signcfg_core::domain::template::{Template, TemplateId};
use signcfg_core::domain::variant::ItemCode;
use signcfg_core::errors::RemoteError;
use signcfg_core::ports::{
    AttributeCatalog, PriceBook, PricingService, QuotationStore, VariantService,
};
use signcfg_core::pricing::PricingModel;

use super::{
    SqlCatalogRepository, SqlPriceBookRepository, SqlPricingRepository, SqlQuotationRepository,
};
use crate::DbPool;

/// Every workflow port served from one SQLite database.
pub struct LocalBackend {
    pub catalog: SqlCatalogRepository,
    pub pricing: SqlPricingRepository<PricingModel>,
    pub price_book: SqlPriceBookRepository,
    pub quotations: SqlQuotationRepository,
}

impl LocalBackend {
    pub fn new(pool: DbPool, default_currency: impl Into<String>) -> Self {
        Self {
            catalog: SqlCatalogRepository::new(pool.clone()),
            pricing: SqlPricingRepository::new(pool.clone(), default_currency)
                .with_engine(PricingModel::Profile),
            price_book: SqlPriceBookRepository::new(pool.clone()),
            quotations: SqlQuotationRepository::new(pool),
        }
    }

    pub fn with_pricing_model(self, model: PricingModel) -> Self {
        Self { pricing: self.pricing.with_engine(model), ..self }
    }
}

#[async_trait]
impl AttributeCatalog for LocalBackend {
    async fn get_attribute_catalog(&self, template: &TemplateId) -> Result<Template, RemoteError> {
        self.catalog.get_attribute_catalog(template).await
    }
}

#[async_trait]
impl PricingService for LocalBackend {
    async fn compute_price(
        &self,
        template: &TemplateId,
        selection: &Selection,
    ) -> Result<PriceResponse, RemoteError> {
        self.pricing.compute_price(template, selection).await
    }
}

#[async_trait]
impl VariantService for LocalBackend {
    async fn find_variant(
        &self,
        template: &TemplateId,
        selection: &Selection,
    ) -> Result<Option<ItemCode>, RemoteError> {
        self.catalog.find_variant(template, selection).await
    }

    async fn create_variant(
        &self,
        template: &TemplateId,
        selection: &Selection,
    ) -> Result<Option<ItemCode>, RemoteError> {
        self.catalog.create_variant(template, selection).await
    }
}

#[async_trait]
impl PriceBook for LocalBackend {
    async fn find_price_entry(
        &self,
        item_code: &ItemCode,
        price_list: &PriceList,
    ) -> Result<Option<PriceEntry>, RemoteError> {
        self.price_book.find_price_entry(item_code, price_list).await
    }

    async fn update_price_entry(
        &self,
        entry_id: &PriceEntryId,
        rate: Decimal,
    ) -> Result<(), RemoteError> {
        self.price_book.update_price_entry(entry_id, rate).await
    }

    async fn insert_price_entry(&self, entry: NewPriceEntry) -> Result<(), RemoteError> {
        self.price_book.insert_price_entry(entry).await
    }
}

#[async_trait]
impl QuotationStore for LocalBackend {
    async fn load_quotation(&self, id: &QuotationId) -> Result<Quotation, RemoteError> {
        self.quotations.load_quotation(id).await
    }

    async fn save_document(&self, quotation: &Quotation) -> Result<(), RemoteError> {
        self.quotations.save_document(quotation).await
    }
}
