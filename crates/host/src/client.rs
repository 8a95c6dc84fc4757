use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use signcfg_core::config::HostConfig;
use signcfg_core::domain::measurement::PerimeterMeasurement;
use signcfg_core::domain::price::{NewPriceEntry, PriceEntry, PriceEntryId, PriceList, PriceResponse};
use signcfg_core::domain::quotation::{Quotation, QuotationId};
use signcfg_core::domain::selection::Selection;
use signcfg_core::domain::template::{Attribute, Template, TemplateId};
use signcfg_core::domain::variant::ItemCode;
use signcfg_core::errors::RemoteError;
use signcfg_core::ports::{
    AttributeCatalog, DesignMeasurement, PriceBook, PricingService, QuotationStore,
    VariantService,
};
use tracing::{debug, warn};

use crate::error::{error_message, HostError};
use crate::wire;

pub const GET_DOC: &str = "frappe.client.get";
pub const GET_LIST: &str = "frappe.client.get_list";
pub const INSERT_DOC: &str = "frappe.client.insert";
pub const SET_VALUE: &str = "frappe.client.set_value";
pub const SAVE_DOC: &str = "frappe.client.save";
pub const GET_VARIANT: &str = "erpnext.controllers.item_variant.get_variant";
pub const CREATE_VARIANT: &str = "erpnext.controllers.item_variant.create_variant";
pub const PRICE_BY_ATTRIBUTES: &str =
    "silicon_signs.silicon_signs.doctype.sign_pricing_template.api.price_item_by_attributes";
pub const CALCULATE_PERIMETER: &str = "silicon_signs.api.calculate_perimeter";

/// Port implementation over the host application's whitelisted-method HTTP API.
pub struct HostClient {
    http: Client,
    base_url: String,
    authorization: Option<SecretString>,
}

impl std::fmt::Debug for HostClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.authorization.is_some())
            .finish()
    }
}

impl HostClient {
    pub fn from_config(config: &HostConfig) -> Result<Self, HostError> {
        let base_url = config.base_url.as_deref().map(str::trim).filter(|url| !url.is_empty());
        let Some(base_url) = base_url else { return Err(HostError::NotConfigured) };
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(HostError::InvalidBaseUrl(base_url.to_owned()));
        }

        let authorization = match (&config.api_key, &config.api_secret) {
            (Some(key), Some(secret)) => Some(SecretString::from(format!(
                "token {}:{}",
                key.expose_secret(),
                secret.expose_secret()
            ))),
            _ => None,
        };

        let http = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;

        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned(), authorization })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn method_url(&self, method: &str) -> String {
        format!("{}/api/method/{method}", self.base_url)
    }

    /// Calls a whitelisted method and returns its `message`.
    pub async fn call(&self, operation: &str, method: &str, args: Value) -> Result<Value, RemoteError> {
        let started = Instant::now();
        debug!(event_name = "host.call.started", operation, method, "calling host method");

        let result = self.send(method, args).await;
        match &result {
            Ok(_) => debug!(
                event_name = "host.call.completed",
                operation,
                method,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "host method returned"
            ),
            Err(error) => warn!(
                event_name = "host.call.failed",
                operation,
                method,
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %error,
                "host method failed"
            ),
        }
        result.map_err(|error| error.into_remote(operation))
    }

    async fn send(&self, method: &str, args: Value) -> Result<Value, HostError> {
        let mut request =
            self.http.post(self.method_url(method)).header(ACCEPT, "application/json").json(&args);
        if let Some(authorization) = &self.authorization {
            request = request.header(AUTHORIZATION, authorization.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HostError::Status { status: status.as_u16(), message: error_message(&body) });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|error| HostError::shape(format!("response is not JSON: {error}")))?;
        wire::message(body)
    }

    async fn get_doc(&self, operation: &str, doctype: &str, name: &str) -> Result<Value, RemoteError> {
        let doc = self.call(operation, GET_DOC, json!({ "doctype": doctype, "name": name })).await?;
        if doc.is_null() {
            return Err(RemoteError::not_found(format!("{doctype} `{name}`")));
        }
        Ok(doc)
    }

    async fn attribute(&self, name: &str, numeric: bool) -> Result<Attribute, RemoteError> {
        if numeric {
            return Ok(Attribute::numeric(name));
        }
        let doc = self.get_doc("get_attribute_catalog", "Item Attribute", name).await?;
        wire::attribute_from_doc(name, doc).map_err(|error| error.into_remote("get_attribute_catalog"))
    }
}

#[async_trait]
impl AttributeCatalog for HostClient {
    async fn get_attribute_catalog(&self, template: &TemplateId) -> Result<Template, RemoteError> {
        let doc = self.get_doc("get_attribute_catalog", "Item", &template.0).await?;
        let doc = wire::TemplateDoc::parse(doc)
            .map_err(|error| error.into_remote("get_attribute_catalog"))?;

        let mut attributes = Vec::with_capacity(doc.attributes.len());
        for (name, numeric) in doc.attribute_rows() {
            attributes.push(self.attribute(name, numeric).await?);
        }
        Ok(doc.into_template(attributes))
    }
}

#[async_trait]
impl PricingService for HostClient {
    async fn compute_price(
        &self,
        template: &TemplateId,
        selection: &Selection,
    ) -> Result<PriceResponse, RemoteError> {
        let message = self
            .call(
                "compute_price",
                PRICE_BY_ATTRIBUTES,
                json!({ "item_template": template.0, "attributes": selection }),
            )
            .await?;
        wire::price_response(message).map_err(|error| error.into_remote("compute_price"))
    }
}

#[async_trait]
impl VariantService for HostClient {
    async fn find_variant(
        &self,
        template: &TemplateId,
        selection: &Selection,
    ) -> Result<Option<ItemCode>, RemoteError> {
        let message = self
            .call("find_variant", GET_VARIANT, json!({ "template": template.0, "args": selection }))
            .await?;
        wire::found_item_code(&message).map_err(|error| error.into_remote("find_variant"))
    }

    async fn create_variant(
        &self,
        template: &TemplateId,
        selection: &Selection,
    ) -> Result<Option<ItemCode>, RemoteError> {
        let message = self
            .call("create_variant", CREATE_VARIANT, json!({ "item": template.0, "args": selection }))
            .await?;
        if !wire::is_unsaved_doc(&message) {
            return Ok(wire::created_item_code(&message));
        }

        // The builder hands back the variant unsaved; persisting it assigns the final code.
        let saved = self.call("create_variant", INSERT_DOC, json!({ "doc": message })).await?;
        Ok(wire::created_item_code(&saved))
    }
}

#[async_trait]
impl PriceBook for HostClient {
    async fn find_price_entry(
        &self,
        item_code: &ItemCode,
        price_list: &PriceList,
    ) -> Result<Option<PriceEntry>, RemoteError> {
        let message = self
            .call(
                "find_price_entry",
                GET_LIST,
                json!({
                    "doctype": "Item Price",
                    "filters": { "item_code": item_code.0, "price_list": price_list.0 },
                    "fields": wire::PRICE_FIELDS,
                    "limit_page_length": 1,
                }),
            )
            .await?;
        wire::first_price_entry(message, item_code, price_list)
            .map_err(|error| error.into_remote("find_price_entry"))
    }

    async fn update_price_entry(
        &self,
        entry_id: &PriceEntryId,
        rate: Decimal,
    ) -> Result<(), RemoteError> {
        self.call(
            "update_price_entry",
            SET_VALUE,
            json!({
                "doctype": "Item Price",
                "name": entry_id.0,
                "fieldname": "price_list_rate",
                "value": wire::number(rate),
            }),
        )
        .await?;
        Ok(())
    }

    async fn insert_price_entry(&self, entry: NewPriceEntry) -> Result<(), RemoteError> {
        self.call(
            "insert_price_entry",
            INSERT_DOC,
            json!({
                "doc": {
                    "doctype": "Item Price",
                    "item_code": entry.item_code.0,
                    "price_list": entry.price_list.0,
                    "price_list_rate": wire::number(entry.rate),
                    "currency": entry.currency,
                    "uom": entry.uom,
                    "selling": u8::from(entry.selling),
                }
            }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl QuotationStore for HostClient {
    async fn load_quotation(&self, id: &QuotationId) -> Result<Quotation, RemoteError> {
        let doc = self.get_doc("load_quotation", "Quotation", &id.0).await?;
        wire::quotation_from_doc(doc).map_err(|error| error.into_remote("load_quotation"))
    }

    async fn save_document(&self, quotation: &Quotation) -> Result<(), RemoteError> {
        let stored = self.get_doc("save_document", "Quotation", &quotation.id.0).await?;
        let stored_modified =
            wire::modified_of(&stored).map_err(|error| error.into_remote("save_document"))?;
        if stored_modified != quotation.modified {
            return Err(RemoteError::rejected(
                "save_document",
                format!("quotation `{}` was modified after it was loaded", quotation.id),
            ));
        }

        let doc = wire::quotation_for_save(stored, quotation)
            .map_err(|error| error.into_remote("save_document"))?;
        self.call("save_document", SAVE_DOC, json!({ "doc": doc })).await?;
        Ok(())
    }
}

#[async_trait]
impl DesignMeasurement for HostClient {
    async fn measure_perimeter(&self, file_url: &str) -> Result<PerimeterMeasurement, RemoteError> {
        let message = self
            .call("measure_perimeter", CALCULATE_PERIMETER, json!({ "file_url": file_url }))
            .await?;
        wire::perimeter(message).map_err(|error| error.into_remote("measure_perimeter"))
    }
}
