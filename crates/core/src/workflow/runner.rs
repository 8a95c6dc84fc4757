use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink, NoopAuditSink};
use crate::config::WorkflowConfig;
use crate::domain::measurement::{PerimeterMeasurement, PERIMETER_ATTRIBUTE};
use crate::domain::price::{format_amount, NewPriceEntry, PriceList};
use crate::domain::quotation::{LineSlot, NewLine, QuotationId};
use crate::domain::selection::{numeric_limit, Selection};
use crate::domain::template::{Template, TemplateId};
use crate::domain::variant::ItemCode;
use crate::errors::{ApplicationError, DomainError, FailureClass, RemoteError};
use crate::form::{AttributeForm, AttributeFormBuilder, FieldValues, DEFAULT_FIELD_PREFIX};
use crate::ports::{ConfiguratorBackend, DesignMeasurement};
use crate::workflow::engine::WorkflowEngine;
use crate::workflow::notice::Notice;
use crate::workflow::states::{TransitionOutcome, WorkflowEvent, WorkflowState};

/// Fallbacks used when the quotation or the request leaves a value open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub default_price_list: PriceList,
    pub default_uom: String,
    pub default_currency: String,
    pub default_qty: Decimal,
    pub field_prefix: String,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            default_price_list: PriceList("Standard Selling".to_owned()),
            default_uom: "Nos".to_owned(),
            default_currency: "USD".to_owned(),
            default_qty: Decimal::ONE,
            field_prefix: DEFAULT_FIELD_PREFIX.to_owned(),
        }
    }
}

impl From<&WorkflowConfig> for WorkflowSettings {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            default_price_list: PriceList(config.default_price_list.clone()),
            default_uom: config.default_uom.clone(),
            default_currency: config.default_currency.clone(),
            default_qty: config.default_qty,
            field_prefix: DEFAULT_FIELD_PREFIX.to_owned(),
        }
    }
}

/// Dialog state between `open` and `submit`: the template, its generated fields and any
/// values filled in by helpers such as perimeter measurement.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigurationDialog {
    template: Template,
    form: AttributeForm,
    prefilled: FieldValues,
    transitions: Vec<TransitionOutcome>,
}

impl ConfigurationDialog {
    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn form(&self) -> &AttributeForm {
        &self.form
    }

    pub fn prefilled(&self) -> &FieldValues {
        &self.prefilled
    }

    pub fn state(&self) -> WorkflowState {
        WorkflowState::AwaitingInput
    }

    /// Sets the field generated for `attribute`; returns false when the template lacks it.
    pub fn prefill(&mut self, attribute: &str, value: impl Into<String>) -> bool {
        match self.form.field_for_attribute(attribute) {
            Some(fieldname) => {
                let fieldname = fieldname.to_owned();
                self.prefilled.set(fieldname, value);
                true
            }
            None => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitRequest {
    pub quotation_id: QuotationId,
    pub values: FieldValues,
    pub qty: Option<Decimal>,
    pub uom: Option<String>,
}

impl SubmitRequest {
    pub fn new(quotation_id: QuotationId, values: FieldValues) -> Self {
        Self { quotation_id, values, qty: None, uom: None }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceEntryAction {
    Updated,
    Inserted,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorkflowReport {
    pub quotation_id: QuotationId,
    pub template: TemplateId,
    pub selection: Selection,
    pub item_code: ItemCode,
    pub variant_created: bool,
    pub price: Decimal,
    pub currency: String,
    pub price_list: PriceList,
    pub price_entry: PriceEntryAction,
    pub line: LineSlot,
    pub qty: Decimal,
    pub uom: String,
    pub breakdown: Vec<String>,
    pub transitions: Vec<TransitionOutcome>,
}

impl WorkflowReport {
    pub fn state(&self) -> WorkflowState {
        WorkflowState::Saved
    }

    pub fn notice(&self) -> Notice {
        Notice::success(format!(
            "Item Variant {} added with price {}.",
            self.item_code,
            format_amount(self.price, &self.currency)
        ))
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
#[error("configuration failed during {failed_during:?}: {error}")]
pub struct WorkflowFailure {
    /// State after the failure was applied: `Failed`, or the unchanged state when the
    /// failure was a validation problem that keeps the dialog open.
    pub state: WorkflowState,
    pub failed_during: WorkflowState,
    pub error: ApplicationError,
    pub transitions: Vec<TransitionOutcome>,
}

impl WorkflowFailure {
    pub fn notice(&self) -> Notice {
        match self.error.class() {
            FailureClass::Validation => {
                let title = match &self.error {
                    ApplicationError::Domain(DomainError::IncompleteSelection { .. }) => {
                        "Missing Values"
                    }
                    _ => "Invalid Values",
                };
                Notice::warning(title, self.error.to_string())
            }
            FailureClass::MissingData => {
                Notice::warning("Price Unavailable", self.error.to_string())
            }
            FailureClass::Remote => Notice::error(self.error.to_string()),
        }
    }
}

pub struct ConfigurationWorkflow<B, S = NoopAuditSink> {
    backend: B,
    sink: S,
    engine: WorkflowEngine,
    settings: WorkflowSettings,
}

impl<B> ConfigurationWorkflow<B, NoopAuditSink>
where
    B: ConfiguratorBackend,
{
    pub fn new(backend: B, settings: WorkflowSettings) -> Self {
        Self { backend, sink: NoopAuditSink, engine: WorkflowEngine, settings }
    }
}

impl<B, S> ConfigurationWorkflow<B, S>
where
    B: ConfiguratorBackend,
    S: AuditSink,
{
    pub fn with_audit_sink<T: AuditSink>(self, sink: T) -> ConfigurationWorkflow<B, T> {
        ConfigurationWorkflow {
            backend: self.backend,
            sink,
            engine: self.engine,
            settings: self.settings,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Reads the template's attribute catalog and builds the dialog fields.
    pub async fn open(
        &self,
        template: Option<&TemplateId>,
        audit: &AuditContext,
    ) -> Result<ConfigurationDialog, WorkflowFailure> {
        let mut run = Run::new(self.engine, &self.sink, audit);

        let template_id = match template.filter(|id| !id.0.trim().is_empty()) {
            Some(id) => id,
            None => return Err(run.fail(DomainError::MissingTemplate.into())),
        };

        run.advance(WorkflowEvent::DialogOpened)?;
        let template = self
            .backend
            .get_attribute_catalog(template_id)
            .await
            .map_err(|error| run.fail(error.into()))?;
        template.ensure_variant_capable().map_err(|error| run.fail(error.into()))?;

        let form = AttributeFormBuilder::new(self.settings.field_prefix.clone())
            .attributes(&template.attributes)
            .map_err(|error| run.fail(error.into()))?
            .build();
        self.sink.emit(
            audit
                .event("catalog.loaded", AuditCategory::Catalog, AuditOutcome::Success)
                .with_metadata("template", template.id.0.clone())
                .with_metadata("attribute_count", template.attributes.len().to_string()),
        );
        run.advance(WorkflowEvent::FormBuilt)?;

        info!(
            event_name = "workflow.form_built",
            correlation_id = %audit.correlation_id,
            template = %template.id,
            field_count = template.attributes.len(),
            "attribute fields generated"
        );

        Ok(ConfigurationDialog {
            template,
            form,
            prefilled: FieldValues::new(),
            transitions: run.transitions,
        })
    }

    /// Measures the design file and writes the result into the perimeter field.
    pub async fn prefill_perimeter<M>(
        &self,
        dialog: &mut ConfigurationDialog,
        measurer: &M,
        file_url: &str,
    ) -> Result<PerimeterMeasurement, ApplicationError>
    where
        M: DesignMeasurement + ?Sized,
    {
        if file_url.trim().is_empty() {
            return Err(ApplicationError::MissingData(
                "upload a design file before measuring its perimeter".to_owned(),
            ));
        }
        if dialog.form.field_for_attribute(PERIMETER_ATTRIBUTE).is_none() {
            return Err(ApplicationError::MissingData(format!(
                "template `{}` has no `{PERIMETER_ATTRIBUTE}` attribute",
                dialog.template.id
            )));
        }

        let measurement = measurer.measure_perimeter(file_url.trim()).await?;
        if !measurement.is_measurable() {
            return Err(ApplicationError::MissingData(
                "could not calculate a perimeter from the design file".to_owned(),
            ));
        }

        dialog.prefill(PERIMETER_ATTRIBUTE, measurement.perimeter_inches.to_string());
        info!(
            event_name = "workflow.perimeter_prefilled",
            template = %dialog.template.id,
            perimeter_inches = %measurement.perimeter_inches,
            "perimeter measured from design file"
        );
        Ok(measurement)
    }

    /// Prices the selection, resolves the variant, records its price and adds it to the
    /// quotation. Steps run strictly in order and stop at the first failure.
    pub async fn submit(
        &self,
        dialog: &ConfigurationDialog,
        request: SubmitRequest,
        audit: &AuditContext,
    ) -> Result<WorkflowReport, WorkflowFailure> {
        let mut run = Run::resume(
            self.engine,
            &self.sink,
            audit,
            WorkflowState::AwaitingInput,
            dialog.transitions.clone(),
        );
        let template = &dialog.template;

        let mut values = dialog.prefilled.clone();
        values.merge(&request.values);
        let selection = dialog
            .form
            .collect(&values)
            .and_then(|selection| selection.validate_against(template).map(|()| selection))
            .map_err(|error| run.fail(error.into()))?;

        let qty = request.qty.unwrap_or(self.settings.default_qty);
        if qty <= Decimal::ZERO {
            return Err(run.fail(
                DomainError::InvariantViolation("quantity must be greater than zero".to_owned())
                    .into(),
            ));
        }
        if qty > numeric_limit() {
            return Err(run.fail(DomainError::OutOfRange(format!("quantity `{qty}`")).into()));
        }
        let uom = request
            .uom
            .filter(|uom| !uom.trim().is_empty())
            .unwrap_or_else(|| self.settings.default_uom.clone());

        run.advance(WorkflowEvent::Submitted)?;
        let mut quotation = self
            .backend
            .load_quotation(&request.quotation_id)
            .await
            .map_err(|error| run.fail(error.into()))?;

        let response = self
            .backend
            .compute_price(&template.id, &selection)
            .await
            .map_err(|error| run.fail(error.into()))?;
        let Some(price) = response.price else {
            return Err(run.fail(ApplicationError::MissingData(format!(
                "no price was returned for template `{}`",
                template.id
            ))));
        };
        self.sink.emit(
            audit
                .event("pricing.computed", AuditCategory::Pricing, AuditOutcome::Success)
                .with_metadata("template", template.id.0.clone())
                .with_metadata("price", price.to_string()),
        );
        info!(
            event_name = "workflow.price_computed",
            correlation_id = %audit.correlation_id,
            quotation_id = %request.quotation_id,
            template = %template.id,
            price = %price,
            "variant price computed"
        );
        run.advance(WorkflowEvent::PriceComputed)?;

        let (item_code, variant_created) = self
            .resolve_variant(&template.id, &selection)
            .await
            .map_err(|error| run.fail(error))?;
        self.sink.emit(
            audit
                .event("variant.resolved", AuditCategory::Variant, AuditOutcome::Success)
                .with_metadata("item_code", item_code.0.clone())
                .with_metadata("created", variant_created.to_string()),
        );
        info!(
            event_name = "workflow.variant_resolved",
            correlation_id = %audit.correlation_id,
            quotation_id = %request.quotation_id,
            item_code = %item_code,
            created = variant_created,
            "variant resolved"
        );
        run.advance(WorkflowEvent::VariantResolved)?;

        let price_list = quotation
            .selling_price_list
            .clone()
            .unwrap_or_else(|| self.settings.default_price_list.clone());
        let currency = quotation
            .currency
            .clone()
            .or(response.currency)
            .unwrap_or_else(|| self.settings.default_currency.clone());
        let price_entry = self
            .upsert_price(NewPriceEntry {
                item_code: item_code.clone(),
                price_list: price_list.clone(),
                rate: price,
                currency: currency.clone(),
                uom: uom.clone(),
                selling: true,
            })
            .await
            .map_err(|error| run.fail(error.into()))?;
        self.sink.emit(
            audit
                .event("price_book.upserted", AuditCategory::PriceBook, AuditOutcome::Success)
                .with_metadata("price_list", price_list.0.clone())
                .with_metadata("action", format!("{price_entry:?}")),
        );
        run.advance(WorkflowEvent::PriceRecorded)?;

        let line = quotation
            .append_line_item(NewLine {
                item_code: item_code.clone(),
                item_name: None,
                qty,
                uom: uom.clone(),
                rate: price,
            })
            .map_err(|error| run.fail(error.into()))?;
        self.backend.save_document(&quotation).await.map_err(|error| run.fail(error.into()))?;
        self.sink.emit(
            audit
                .event("quotation.saved", AuditCategory::Document, AuditOutcome::Success)
                .with_metadata("line", format!("{line:?}")),
        );
        run.advance(WorkflowEvent::DocumentSaved)?;

        info!(
            event_name = "workflow.saved",
            correlation_id = %audit.correlation_id,
            quotation_id = %request.quotation_id,
            item_code = %item_code,
            "quotation line added and saved"
        );

        Ok(WorkflowReport {
            quotation_id: request.quotation_id,
            template: template.id.clone(),
            selection,
            item_code,
            variant_created,
            price,
            currency,
            price_list,
            price_entry,
            line,
            qty,
            uom,
            breakdown: response.breakdown,
            transitions: run.transitions,
        })
    }

    async fn resolve_variant(
        &self,
        template: &TemplateId,
        selection: &Selection,
    ) -> Result<(ItemCode, bool), ApplicationError> {
        if let Some(existing) = non_empty(self.backend.find_variant(template, selection).await?) {
            return Ok((existing, false));
        }

        match non_empty(self.backend.create_variant(template, selection).await?) {
            Some(created) => Ok((created, true)),
            None => Err(RemoteError::unexpected(
                "create_variant",
                "could not determine the created variant item code",
            )
            .into()),
        }
    }

    async fn upsert_price(&self, entry: NewPriceEntry) -> Result<PriceEntryAction, RemoteError> {
        match self.backend.find_price_entry(&entry.item_code, &entry.price_list).await? {
            Some(existing) => {
                self.backend.update_price_entry(&existing.id, entry.rate).await?;
                Ok(PriceEntryAction::Updated)
            }
            None => {
                self.backend.insert_price_entry(entry).await?;
                Ok(PriceEntryAction::Inserted)
            }
        }
    }
}

fn non_empty(code: Option<ItemCode>) -> Option<ItemCode> {
    code.filter(|code| !code.0.trim().is_empty())
}

struct Run<'a, S: ?Sized> {
    engine: WorkflowEngine,
    sink: &'a S,
    audit: &'a AuditContext,
    state: WorkflowState,
    transitions: Vec<TransitionOutcome>,
}

impl<'a, S> Run<'a, S>
where
    S: AuditSink + ?Sized,
{
    fn new(engine: WorkflowEngine, sink: &'a S, audit: &'a AuditContext) -> Self {
        Self::resume(engine, sink, audit, engine.initial_state(), Vec::new())
    }

    fn resume(
        engine: WorkflowEngine,
        sink: &'a S,
        audit: &'a AuditContext,
        state: WorkflowState,
        transitions: Vec<TransitionOutcome>,
    ) -> Self {
        Self { engine, sink, audit, state, transitions }
    }

    fn advance(&mut self, event: WorkflowEvent) -> Result<(), WorkflowFailure> {
        let outcome = self
            .engine
            .apply_with_audit(self.state, event, self.sink, self.audit)
            .map_err(|error| self.fail(DomainError::from(error).into()))?;
        self.state = outcome.to;
        self.transitions.push(outcome);
        Ok(())
    }

    fn fail(&mut self, error: ApplicationError) -> WorkflowFailure {
        let failed_during = self.state;
        if let Ok(outcome) =
            self.engine.apply_with_audit(self.state, WorkflowEvent::StepFailed, self.sink, self.audit)
        {
            self.state = outcome.to;
            self.transitions.push(outcome);
        }

        warn!(
            event_name = "workflow.failed",
            correlation_id = %self.audit.correlation_id,
            failed_during = ?failed_during,
            error = %error,
            "configuration workflow stopped"
        );

        WorkflowFailure {
            state: self.state,
            failed_during,
            error,
            transitions: self.transitions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{
        ConfigurationWorkflow, PriceEntryAction, SubmitRequest, WorkflowSettings,
    };
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::measurement::{MeasurementSource, PerimeterMeasurement};
    use crate::domain::price::{NewPriceEntry, PriceEntry, PriceEntryId, PriceList, PriceResponse};
    use crate::domain::quotation::{LineItem, LineSlot, Quotation, QuotationId};
    use crate::domain::selection::Selection;
    use crate::domain::template::{Attribute, Template, TemplateId};
    use crate::domain::variant::ItemCode;
    use crate::errors::{ApplicationError, DomainError, FailureClass, RemoteError};
    use crate::form::FieldValues;
    use crate::ports::{
        AttributeCatalog, DesignMeasurement, PriceBook, PricingService, QuotationStore,
        VariantService,
    };
    use crate::workflow::notice::Indicator;
    use crate::workflow::states::WorkflowState;

    struct ScriptedBackend {
        template: Template,
        price: Option<Decimal>,
        existing_variant: Option<ItemCode>,
        created_variant: Option<ItemCode>,
        existing_price: Option<PriceEntry>,
        quotation: Quotation,
        calls: Mutex<Vec<&'static str>>,
        priced: Mutex<Vec<Selection>>,
        saved: Mutex<Option<Quotation>>,
        inserted: Mutex<Vec<NewPriceEntry>>,
        updated: Mutex<Vec<(PriceEntryId, Decimal)>>,
    }

    impl ScriptedBackend {
        fn new() -> Self {
            let mut quotation = Quotation::new(QuotationId("QTN-0001".to_owned()));
            quotation.items.push(LineItem::blank(1));
            Self {
                template: Template {
                    id: TemplateId("LED-SIGN-01".to_owned()),
                    item_name: "LED Sign".to_owned(),
                    has_variants: true,
                    attributes: vec![
                        Attribute::discrete("Color", ["Red", "Blue"]),
                        Attribute::numeric("Size"),
                    ],
                },
                price: Some(Decimal::new(15000, 2)),
                existing_variant: None,
                created_variant: Some(ItemCode("LED-SIGN-01-RED-24".to_owned())),
                existing_price: None,
                quotation,
                calls: Mutex::new(Vec::new()),
                priced: Mutex::new(Vec::new()),
                saved: Mutex::new(None),
                inserted: Mutex::new(Vec::new()),
                updated: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().expect("calls lock").push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl AttributeCatalog for ScriptedBackend {
        async fn get_attribute_catalog(
            &self,
            template: &TemplateId,
        ) -> Result<Template, RemoteError> {
            self.record("get_attribute_catalog");
            if template != &self.template.id {
                return Err(RemoteError::not_found(format!("template `{template}`")));
            }
            Ok(self.template.clone())
        }
    }

    #[async_trait]
    impl PricingService for ScriptedBackend {
        async fn compute_price(
            &self,
            _template: &TemplateId,
            selection: &Selection,
        ) -> Result<PriceResponse, RemoteError> {
            self.record("compute_price");
            self.priced.lock().expect("priced lock").push(selection.clone());
            Ok(PriceResponse {
                price: self.price,
                currency: Some("USD".to_owned()),
                breakdown: vec!["Base: +150.00".to_owned()],
            })
        }
    }

    #[async_trait]
    impl VariantService for ScriptedBackend {
        async fn find_variant(
            &self,
            _template: &TemplateId,
            _selection: &Selection,
        ) -> Result<Option<ItemCode>, RemoteError> {
            self.record("find_variant");
            Ok(self.existing_variant.clone())
        }

        async fn create_variant(
            &self,
            _template: &TemplateId,
            _selection: &Selection,
        ) -> Result<Option<ItemCode>, RemoteError> {
            self.record("create_variant");
            Ok(self.created_variant.clone())
        }
    }

    #[async_trait]
    impl PriceBook for ScriptedBackend {
        async fn find_price_entry(
            &self,
            _item_code: &ItemCode,
            _price_list: &PriceList,
        ) -> Result<Option<PriceEntry>, RemoteError> {
            self.record("find_price_entry");
            Ok(self.existing_price.clone())
        }

        async fn update_price_entry(
            &self,
            entry_id: &PriceEntryId,
            rate: Decimal,
        ) -> Result<(), RemoteError> {
            self.record("update_price_entry");
            self.updated.lock().expect("updated lock").push((entry_id.clone(), rate));
            Ok(())
        }

        async fn insert_price_entry(&self, entry: NewPriceEntry) -> Result<(), RemoteError> {
            self.record("insert_price_entry");
            self.inserted.lock().expect("inserted lock").push(entry);
            Ok(())
        }
    }

    #[async_trait]
    impl QuotationStore for ScriptedBackend {
        async fn load_quotation(&self, id: &QuotationId) -> Result<Quotation, RemoteError> {
            self.record("load_quotation");
            if id != &self.quotation.id {
                return Err(RemoteError::not_found(format!("quotation `{id}`")));
            }
            Ok(self.quotation.clone())
        }

        async fn save_document(&self, quotation: &Quotation) -> Result<(), RemoteError> {
            self.record("save_document");
            *self.saved.lock().expect("saved lock") = Some(quotation.clone());
            Ok(())
        }
    }

    struct FixedMeasurement(Decimal);

    #[async_trait]
    impl DesignMeasurement for FixedMeasurement {
        async fn measure_perimeter(
            &self,
            _file_url: &str,
        ) -> Result<PerimeterMeasurement, RemoteError> {
            Ok(PerimeterMeasurement::from_inches(self.0, MeasurementSource::Drawings))
        }
    }

    fn audit() -> AuditContext {
        AuditContext::new(Some(QuotationId("QTN-0001".to_owned())), "req-1", "tester")
    }

    fn template_id() -> TemplateId {
        TemplateId("LED-SIGN-01".to_owned())
    }

    fn red_24() -> FieldValues {
        FieldValues::new().with("attr__color", "Red").with("attr__size", "24")
    }

    fn request(values: FieldValues) -> SubmitRequest {
        SubmitRequest::new(QuotationId("QTN-0001".to_owned()), values)
    }

    #[tokio::test]
    async fn submit_creates_variant_inserts_price_and_reuses_blank_row() {
        let workflow = ConfigurationWorkflow::new(ScriptedBackend::new(), WorkflowSettings::default());
        let dialog = workflow.open(Some(&template_id()), &audit()).await.expect("open dialog");

        let report =
            workflow.submit(&dialog, request(red_24()), &audit()).await.expect("submit");

        assert_eq!(report.state(), WorkflowState::Saved);
        assert_eq!(report.item_code, ItemCode("LED-SIGN-01-RED-24".to_owned()));
        assert!(report.variant_created);
        assert_eq!(report.price_entry, PriceEntryAction::Inserted);
        assert_eq!(report.line, LineSlot::Reused(0));
        assert_eq!(report.price_list, PriceList("Standard Selling".to_owned()));
        assert_eq!(report.currency, "USD");
        assert_eq!(
            report.notice().message,
            "Item Variant LED-SIGN-01-RED-24 added with price USD 150.00."
        );

        let backend = workflow.backend();
        assert_eq!(
            backend.calls(),
            vec![
                "get_attribute_catalog",
                "load_quotation",
                "compute_price",
                "find_variant",
                "create_variant",
                "find_price_entry",
                "insert_price_entry",
                "save_document",
            ]
        );
        let inserted = backend.inserted.lock().expect("inserted lock").clone();
        assert_eq!(inserted.len(), 1);
        assert!(inserted[0].selling);
        assert_eq!(inserted[0].uom, "Nos");
        assert_eq!(inserted[0].rate, Decimal::new(15000, 2));

        let saved = backend.saved.lock().expect("saved lock").clone().expect("document saved");
        assert_eq!(saved.items.len(), 1);
        assert_eq!(saved.grand_total, Decimal::new(15000, 2));
    }

    #[tokio::test]
    async fn pricing_receives_attribute_names_not_field_ids() {
        let workflow = ConfigurationWorkflow::new(ScriptedBackend::new(), WorkflowSettings::default());
        let dialog = workflow.open(Some(&template_id()), &audit()).await.expect("open dialog");

        workflow.submit(&dialog, request(red_24()), &audit()).await.expect("submit");

        let priced = workflow.backend().priced.lock().expect("priced lock").clone();
        assert_eq!(priced.len(), 1);
        assert_eq!(
            serde_json::to_value(&priced[0]).expect("serialize selection"),
            json!({ "Color": "Red", "Size": 24.0 })
        );
        assert!(priced[0].names().all(|name| !name.starts_with("attr__")));
    }

    #[tokio::test]
    async fn oversized_numbers_are_rejected_before_pricing() {
        let workflow = ConfigurationWorkflow::new(ScriptedBackend::new(), WorkflowSettings::default());
        let dialog = workflow.open(Some(&template_id()), &audit()).await.expect("open dialog");

        let huge_size = FieldValues::new()
            .with("attr__color", "Red")
            .with("attr__size", "79228162514264337593543950335");
        let failure = workflow
            .submit(&dialog, request(huge_size), &audit())
            .await
            .expect_err("size out of range");
        assert!(matches!(failure.error, ApplicationError::Domain(DomainError::OutOfRange(_))));
        assert_eq!(failure.state, WorkflowState::AwaitingInput);
        assert_eq!(failure.notice().title, "Invalid Values");

        let mut huge_qty = request(red_24());
        huge_qty.qty = Some(Decimal::MAX);
        let failure =
            workflow.submit(&dialog, huge_qty, &audit()).await.expect_err("qty out of range");
        assert!(matches!(failure.error, ApplicationError::Domain(DomainError::OutOfRange(_))));

        assert_eq!(workflow.backend().calls(), vec!["get_attribute_catalog"]);
    }

    #[tokio::test]
    async fn overflowing_line_amount_fails_without_saving() {
        let mut backend = ScriptedBackend::new();
        backend.price = Some(Decimal::MAX);
        let workflow = ConfigurationWorkflow::new(backend, WorkflowSettings::default());
        let dialog = workflow.open(Some(&template_id()), &audit()).await.expect("open dialog");

        let mut submit = request(red_24());
        submit.qty = Some(Decimal::from(2));
        let failure = workflow.submit(&dialog, submit, &audit()).await.expect_err("amount overflows");

        assert_eq!(failure.failed_during, WorkflowState::AppendingLine);
        assert_eq!(failure.state, WorkflowState::Failed);
        assert!(matches!(failure.error, ApplicationError::Domain(DomainError::OutOfRange(_))));
        assert!(!workflow.backend().calls().contains(&"save_document"));
    }

    #[tokio::test]
    async fn submit_reuses_existing_variant_and_updates_price() {
        let mut backend = ScriptedBackend::new();
        backend.existing_variant = Some(ItemCode("LED-SIGN-01-RED-24".to_owned()));
        backend.existing_price = Some(PriceEntry {
            id: PriceEntryId("IP-1".to_owned()),
            item_code: ItemCode("LED-SIGN-01-RED-24".to_owned()),
            price_list: PriceList("Standard Selling".to_owned()),
            rate: Decimal::from(99),
            currency: "USD".to_owned(),
            uom: "Nos".to_owned(),
            selling: true,
        });
        let workflow = ConfigurationWorkflow::new(backend, WorkflowSettings::default());
        let dialog = workflow.open(Some(&template_id()), &audit()).await.expect("open dialog");

        let report =
            workflow.submit(&dialog, request(red_24()), &audit()).await.expect("submit");

        assert!(!report.variant_created);
        assert_eq!(report.price_entry, PriceEntryAction::Updated);
        let backend = workflow.backend();
        assert!(!backend.calls().contains(&"create_variant"));
        assert_eq!(
            backend.updated.lock().expect("updated lock").clone(),
            vec![(PriceEntryId("IP-1".to_owned()), Decimal::new(15000, 2))]
        );
    }

    #[tokio::test]
    async fn quotation_price_list_and_currency_take_precedence() {
        let mut backend = ScriptedBackend::new();
        backend.quotation.selling_price_list = Some(PriceList("Wholesale".to_owned()));
        backend.quotation.currency = Some("CAD".to_owned());
        let workflow = ConfigurationWorkflow::new(backend, WorkflowSettings::default());
        let dialog = workflow.open(Some(&template_id()), &audit()).await.expect("open dialog");

        let mut submit = request(red_24());
        submit.qty = Some(Decimal::from(3));
        submit.uom = Some("Box".to_owned());
        let report = workflow.submit(&dialog, submit, &audit()).await.expect("submit");

        assert_eq!(report.price_list, PriceList("Wholesale".to_owned()));
        assert_eq!(report.currency, "CAD");
        let saved = workflow.backend().saved.lock().expect("saved lock").clone().expect("saved");
        assert_eq!(saved.items[0].uom.as_deref(), Some("Box"));
        assert_eq!(saved.total_qty, Decimal::from(3));
    }

    #[tokio::test]
    async fn missing_field_keeps_dialog_open_without_remote_calls() {
        let workflow = ConfigurationWorkflow::new(ScriptedBackend::new(), WorkflowSettings::default());
        let dialog = workflow.open(Some(&template_id()), &audit()).await.expect("open dialog");

        let failure = workflow
            .submit(&dialog, request(FieldValues::new().with("attr__color", "Red")), &audit())
            .await
            .expect_err("size is required");

        assert_eq!(failure.state, WorkflowState::AwaitingInput);
        assert_eq!(
            failure.error,
            ApplicationError::Domain(DomainError::IncompleteSelection {
                missing: vec!["Size".to_owned()]
            })
        );
        assert_eq!(failure.notice().indicator, Indicator::Orange);
        assert_eq!(workflow.backend().calls(), vec!["get_attribute_catalog"]);
    }

    #[tokio::test]
    async fn value_outside_permitted_list_is_rejected() {
        let workflow = ConfigurationWorkflow::new(ScriptedBackend::new(), WorkflowSettings::default());
        let dialog = workflow.open(Some(&template_id()), &audit()).await.expect("open dialog");

        let failure = workflow
            .submit(
                &dialog,
                request(FieldValues::new().with("attr__color", "Green").with("attr__size", "24")),
                &audit(),
            )
            .await
            .expect_err("green is not offered");

        assert_eq!(failure.error.class(), FailureClass::Validation);
        assert_eq!(failure.state, WorkflowState::AwaitingInput);
    }

    #[tokio::test]
    async fn missing_price_stops_before_variant_resolution() {
        let mut backend = ScriptedBackend::new();
        backend.price = None;
        let workflow = ConfigurationWorkflow::new(backend, WorkflowSettings::default());
        let dialog = workflow.open(Some(&template_id()), &audit()).await.expect("open dialog");

        let failure =
            workflow.submit(&dialog, request(red_24()), &audit()).await.expect_err("no price");

        assert_eq!(failure.failed_during, WorkflowState::Pricing);
        assert_eq!(failure.state, WorkflowState::Failed);
        assert_eq!(failure.error.class(), FailureClass::MissingData);
        assert_eq!(failure.notice().indicator, Indicator::Orange);
        assert!(!workflow.backend().calls().contains(&"find_variant"));
    }

    #[tokio::test]
    async fn unresolvable_created_variant_is_fatal() {
        let mut backend = ScriptedBackend::new();
        backend.created_variant = None;
        let workflow = ConfigurationWorkflow::new(backend, WorkflowSettings::default());
        let dialog = workflow.open(Some(&template_id()), &audit()).await.expect("open dialog");

        let failure =
            workflow.submit(&dialog, request(red_24()), &audit()).await.expect_err("no code");

        assert_eq!(failure.failed_during, WorkflowState::ResolvingVariant);
        assert_eq!(failure.notice().indicator, Indicator::Red);
        let calls = workflow.backend().calls();
        assert!(!calls.contains(&"find_price_entry"));
        assert!(!calls.contains(&"save_document"));
    }

    #[tokio::test]
    async fn open_requires_a_template() {
        let workflow = ConfigurationWorkflow::new(ScriptedBackend::new(), WorkflowSettings::default());

        let failure = workflow.open(None, &audit()).await.expect_err("template required");

        assert_eq!(failure.error, ApplicationError::Domain(DomainError::MissingTemplate));
        assert_eq!(failure.state, WorkflowState::Idle);
        assert!(workflow.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn open_rejects_template_without_variants() {
        let mut backend = ScriptedBackend::new();
        backend.template.has_variants = false;
        let workflow = ConfigurationWorkflow::new(backend, WorkflowSettings::default());

        let failure = workflow.open(Some(&template_id()), &audit()).await.expect_err("no variants");

        assert_eq!(failure.failed_during, WorkflowState::BuildingForm);
        assert_eq!(failure.state, WorkflowState::Failed);
        assert!(matches!(
            failure.error,
            ApplicationError::Domain(DomainError::NotVariantCapable(_))
        ));
    }

    #[tokio::test]
    async fn open_rejects_template_with_repeated_attribute() {
        let mut backend = ScriptedBackend::new();
        backend.template.attributes.push(Attribute::numeric("Color"));
        let workflow = ConfigurationWorkflow::new(backend, WorkflowSettings::default());

        let failure = workflow.open(Some(&template_id()), &audit()).await.expect_err("duplicate");

        assert_eq!(failure.failed_during, WorkflowState::BuildingForm);
        assert_eq!(
            failure.error,
            ApplicationError::Domain(DomainError::DuplicateAttribute("Color".to_owned()))
        );
    }

    #[tokio::test]
    async fn perimeter_measurement_prefills_numeric_field() {
        let mut backend = ScriptedBackend::new();
        backend.template.attributes.push(Attribute::numeric("Perimeter Inches"));
        let workflow = ConfigurationWorkflow::new(backend, WorkflowSettings::default());
        let mut dialog = workflow.open(Some(&template_id()), &audit()).await.expect("open dialog");

        let measurement = workflow
            .prefill_perimeter(&mut dialog, &FixedMeasurement(Decimal::new(964, 1)), "/files/logo.svg")
            .await
            .expect("measure");

        assert_eq!(measurement.perimeter_inches, Decimal::new(964, 1));
        assert_eq!(dialog.prefilled().get("attr__perimeter_inches"), Some("96.4"));

        let report =
            workflow.submit(&dialog, request(red_24()), &audit()).await.expect("submit");
        assert_eq!(
            report.selection.get("Perimeter Inches").and_then(|value| value.as_decimal()),
            Some(Decimal::new(964, 1))
        );
    }

    #[tokio::test]
    async fn perimeter_requires_matching_attribute() {
        let workflow = ConfigurationWorkflow::new(ScriptedBackend::new(), WorkflowSettings::default());
        let mut dialog = workflow.open(Some(&template_id()), &audit()).await.expect("open dialog");

        let error = workflow
            .prefill_perimeter(&mut dialog, &FixedMeasurement(Decimal::from(10)), "/files/logo.svg")
            .await
            .expect_err("no perimeter attribute");

        assert!(matches!(error, ApplicationError::MissingData(_)));
    }

    #[tokio::test]
    async fn audit_sink_sees_every_step() {
        let sink = InMemoryAuditSink::default();
        let workflow = ConfigurationWorkflow::new(ScriptedBackend::new(), WorkflowSettings::default())
            .with_audit_sink(sink.clone());
        let dialog = workflow.open(Some(&template_id()), &audit()).await.expect("open dialog");
        workflow.submit(&dialog, request(red_24()), &audit()).await.expect("submit");

        let types = sink.event_types();
        for expected in
            ["catalog.loaded", "pricing.computed", "variant.resolved", "price_book.upserted", "quotation.saved"]
        {
            assert!(types.iter().any(|event| event == expected), "missing {expected}");
        }
        assert_eq!(
            types.iter().filter(|event| *event == "workflow.transition_applied").count(),
            7
        );
    }
}
