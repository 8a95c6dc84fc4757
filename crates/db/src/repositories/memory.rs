use std::collections::{BTreeSet, HashMap};

use rust_decimal::Decimal;
use signcfg_core::domain::price::{NewPriceEntry, PriceEntry, PriceEntryId, PriceList, PriceResponse};
use signcfg_core::domain::quotation::{Quotation, QuotationId};
use signcfg_core::domain::selection::Selection;
use signcfg_core::domain::template::{Template, TemplateId};
use signcfg_core::domain::variant::{ItemCode, Variant};
use signcfg_core::errors::RemoteError;
use signcfg_core::ports::{
    AttributeCatalog, PriceBook, PricingService, QuotationStore, VariantService,
};
use signcfg_core::pricing::{evaluate_profile, PricingOutcome, PricingProfile};
use tokio::sync::RwLock;

/// Process-local backend with the same semantics as the SQLite repositories.
pub struct InMemoryBackend {
    currency: String,
    templates: RwLock<HashMap<TemplateId, Template>>,
    profiles: RwLock<Vec<PricingProfile>>,
    items: RwLock<BTreeSet<ItemCode>>,
    variants: RwLock<HashMap<(TemplateId, String), ItemCode>>,
    prices: RwLock<HashMap<(ItemCode, PriceList), PriceEntry>>,
    quotations: RwLock<HashMap<QuotationId, Quotation>>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new("USD")
    }
}

impl InMemoryBackend {
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            templates: RwLock::default(),
            profiles: RwLock::default(),
            items: RwLock::default(),
            variants: RwLock::default(),
            prices: RwLock::default(),
            quotations: RwLock::default(),
        }
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.items.get_mut().insert(ItemCode(template.id.0.clone()));
        self.templates.get_mut().insert(template.id.clone(), template);
        self
    }

    pub fn with_profile(mut self, profile: PricingProfile) -> Self {
        self.profiles.get_mut().push(profile);
        self
    }

    pub fn with_quotation(mut self, quotation: Quotation) -> Self {
        self.quotations.get_mut().insert(quotation.id.clone(), quotation);
        self
    }

    pub async fn quotation(&self, id: &QuotationId) -> Option<Quotation> {
        self.quotations.read().await.get(id).cloned()
    }

    pub async fn price_entries(&self) -> Vec<PriceEntry> {
        let mut entries = self.prices.read().await.values().cloned().collect::<Vec<_>>();
        entries.sort_by(|left, right| left.id.0.cmp(&right.id.0));
        entries
    }

    pub async fn variant_count(&self) -> usize {
        self.variants.read().await.len()
    }
}

#[async_trait::async_trait]
impl AttributeCatalog for InMemoryBackend {
    async fn get_attribute_catalog(&self, template: &TemplateId) -> Result<Template, RemoteError> {
        self.templates
            .read()
            .await
            .get(template)
            .cloned()
            .ok_or_else(|| RemoteError::not_found(format!("template `{template}`")))
    }
}

#[async_trait::async_trait]
impl PricingService for InMemoryBackend {
    async fn compute_price(
        &self,
        template: &TemplateId,
        selection: &Selection,
    ) -> Result<PriceResponse, RemoteError> {
        let profiles = self.profiles.read().await;
        let profile = profiles
            .iter()
            .find(|profile| &profile.template == template)
            .ok_or_else(|| {
                RemoteError::not_found(format!("pricing profile for template `{template}`"))
            })?;
        evaluate_profile(profile, selection, &self.currency)
            .map(PricingOutcome::into_response)
            .map_err(|error| RemoteError::rejected("compute_price", error.to_string()))
    }
}

#[async_trait::async_trait]
impl VariantService for InMemoryBackend {
    async fn find_variant(
        &self,
        template: &TemplateId,
        selection: &Selection,
    ) -> Result<Option<ItemCode>, RemoteError> {
        let key = (template.clone(), selection.signature());
        Ok(self.variants.read().await.get(&key).cloned())
    }

    async fn create_variant(
        &self,
        template: &TemplateId,
        selection: &Selection,
    ) -> Result<Option<ItemCode>, RemoteError> {
        let template = self.get_attribute_catalog(template).await?;
        selection
            .validate_against(&template)
            .map_err(|error| RemoteError::rejected("create_variant", error.to_string()))?;

        let key = (template.id.clone(), selection.signature());
        let mut variants = self.variants.write().await;
        if let Some(existing) = variants.get(&key) {
            return Ok(Some(existing.clone()));
        }

        let base = Variant::new(&template, selection.clone()).item_code;
        let mut items = self.items.write().await;
        let mut code = base.clone();
        let mut suffix = 1u32;
        while items.contains(&code) {
            suffix += 1;
            code = ItemCode(format!("{}-{suffix}", base.0));
        }
        items.insert(code.clone());
        variants.insert(key, code.clone());
        Ok(Some(code))
    }
}

#[async_trait::async_trait]
impl PriceBook for InMemoryBackend {
    async fn find_price_entry(
        &self,
        item_code: &ItemCode,
        price_list: &PriceList,
    ) -> Result<Option<PriceEntry>, RemoteError> {
        let key = (item_code.clone(), price_list.clone());
        Ok(self.prices.read().await.get(&key).cloned())
    }

    async fn update_price_entry(
        &self,
        entry_id: &PriceEntryId,
        rate: Decimal,
    ) -> Result<(), RemoteError> {
        let mut prices = self.prices.write().await;
        let entry = prices
            .values_mut()
            .find(|entry| &entry.id == entry_id)
            .ok_or_else(|| RemoteError::not_found(format!("item price `{}`", entry_id.0)))?;
        entry.rate = rate;
        Ok(())
    }

    async fn insert_price_entry(&self, entry: NewPriceEntry) -> Result<(), RemoteError> {
        let mut prices = self.prices.write().await;
        let key = (entry.item_code.clone(), entry.price_list.clone());
        if prices.contains_key(&key) {
            return Err(RemoteError::rejected(
                "insert_price_entry",
                format!("{} already has a price in {}", entry.item_code, entry.price_list),
            ));
        }
        let id = PriceEntryId(format!("IP-{:05}", prices.len() + 1));
        prices.insert(key, entry.into_entry(id));
        Ok(())
    }
}

#[async_trait::async_trait]
impl QuotationStore for InMemoryBackend {
    async fn load_quotation(&self, id: &QuotationId) -> Result<Quotation, RemoteError> {
        self.quotation(id).await.ok_or_else(|| RemoteError::not_found(format!("quotation `{id}`")))
    }

    async fn save_document(&self, quotation: &Quotation) -> Result<(), RemoteError> {
        let mut quotations = self.quotations.write().await;
        let stored = quotations
            .get_mut(&quotation.id)
            .ok_or_else(|| RemoteError::not_found(format!("quotation `{}`", quotation.id)))?;
        if stored.modified != quotation.modified {
            return Err(RemoteError::rejected(
                "save_document",
                format!("quotation `{}` was modified after it was loaded", quotation.id),
            ));
        }
        let mut saved = quotation.clone();
        saved.modified = chrono::Utc::now().max(quotation.modified + chrono::Duration::microseconds(1));
        *stored = saved;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use signcfg_core::domain::price::{NewPriceEntry, PriceList};
    use signcfg_core::domain::quotation::{LineItem, Quotation, QuotationId};
    use signcfg_core::domain::selection::Selection;
    use signcfg_core::domain::template::{Attribute, Template, TemplateId};
    use signcfg_core::domain::variant::ItemCode;
    use signcfg_core::errors::RemoteError;
    use signcfg_core::ports::{PriceBook, QuotationStore, VariantService};

    use super::InMemoryBackend;

    fn backend() -> InMemoryBackend {
        let mut quotation = Quotation::new(QuotationId("QTN-1".to_owned()));
        quotation.items.push(LineItem::blank(1));
        InMemoryBackend::default()
            .with_template(Template {
                id: TemplateId("SIGN".to_owned()),
                item_name: "Sign".to_owned(),
                has_variants: true,
                attributes: vec![Attribute::discrete("Color", ["Red", "Blue"])],
            })
            .with_quotation(quotation)
    }

    #[tokio::test]
    async fn variants_are_created_once_per_selection() {
        let backend = backend();
        let template = TemplateId("SIGN".to_owned());
        let red = Selection::new().with("Color", "Red");

        let first = backend.create_variant(&template, &red).await.expect("create");
        let second = backend.create_variant(&template, &red).await.expect("create again");

        assert_eq!(first, Some(ItemCode("SIGN-RED".to_owned())));
        assert_eq!(first, second);
        assert_eq!(backend.variant_count().await, 1);
    }

    #[tokio::test]
    async fn second_price_insert_for_same_list_is_rejected() {
        let backend = backend();
        let entry = NewPriceEntry {
            item_code: ItemCode("SIGN-RED".to_owned()),
            price_list: PriceList("Standard Selling".to_owned()),
            rate: Decimal::from(10),
            currency: "USD".to_owned(),
            uom: "Nos".to_owned(),
            selling: true,
        };

        backend.insert_price_entry(entry.clone()).await.expect("insert");
        let error = backend.insert_price_entry(entry).await.expect_err("duplicate");

        assert!(matches!(error, RemoteError::Rejected { .. }));
        assert_eq!(backend.price_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn stale_quotation_save_is_rejected() {
        let backend = backend();
        let id = QuotationId("QTN-1".to_owned());
        let stale = backend.load_quotation(&id).await.expect("load");

        backend.save_document(&stale).await.expect("first save");
        let error = backend.save_document(&stale).await.expect_err("stale");

        assert!(matches!(error, RemoteError::Rejected { .. }));
    }
}
