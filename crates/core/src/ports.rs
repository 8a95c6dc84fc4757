//! Remote operations the configuration workflow depends on.
//!
//! Each trait stands for one group of calls exposed by the business system. `signcfg-db`
//! implements them over SQLite and `signcfg-host` over the host application's HTTP API.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::measurement::PerimeterMeasurement;
use crate::domain::price::{NewPriceEntry, PriceEntry, PriceEntryId, PriceList, PriceResponse};
use crate::domain::quotation::{Quotation, QuotationId};
use crate::domain::selection::Selection;
use crate::domain::template::{Template, TemplateId};
use crate::domain::variant::ItemCode;
use crate::errors::RemoteError;

#[async_trait]
pub trait AttributeCatalog: Send + Sync {
    async fn get_attribute_catalog(&self, template: &TemplateId) -> Result<Template, RemoteError>;
}

#[async_trait]
pub trait PricingService: Send + Sync {
    async fn compute_price(
        &self,
        template: &TemplateId,
        selection: &Selection,
    ) -> Result<PriceResponse, RemoteError>;
}

#[async_trait]
pub trait VariantService: Send + Sync {
    async fn find_variant(
        &self,
        template: &TemplateId,
        selection: &Selection,
    ) -> Result<Option<ItemCode>, RemoteError>;

    async fn create_variant(
        &self,
        template: &TemplateId,
        selection: &Selection,
    ) -> Result<Option<ItemCode>, RemoteError>;
}

#[async_trait]
pub trait PriceBook: Send + Sync {
    async fn find_price_entry(
        &self,
        item_code: &ItemCode,
        price_list: &PriceList,
    ) -> Result<Option<PriceEntry>, RemoteError>;

    async fn update_price_entry(
        &self,
        entry_id: &PriceEntryId,
        rate: Decimal,
    ) -> Result<(), RemoteError>;

    async fn insert_price_entry(&self, entry: NewPriceEntry) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait QuotationStore: Send + Sync {
    async fn load_quotation(&self, id: &QuotationId) -> Result<Quotation, RemoteError>;
    async fn save_document(&self, quotation: &Quotation) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait DesignMeasurement: Send + Sync {
    async fn measure_perimeter(&self, file_url: &str) -> Result<PerimeterMeasurement, RemoteError>;
}

/// Everything the configuration workflow needs from the business system.
pub trait ConfiguratorBackend:
    AttributeCatalog + PricingService + VariantService + PriceBook + QuotationStore
{
}

impl<T> ConfiguratorBackend for T where
    T: AttributeCatalog + PricingService + VariantService + PriceBook + QuotationStore
{
}
