pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod form;
pub mod ports;
pub mod pricing;
pub mod workflow;

pub use audit::{
    AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, NoopAuditSink, TracingAuditSink,
};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use domain::measurement::{MeasurementSource, PerimeterMeasurement, PERIMETER_ATTRIBUTE};
pub use domain::price::{NewPriceEntry, PriceEntry, PriceEntryId, PriceList, PriceResponse};
pub use domain::quotation::{LineItem, LineSlot, Quotation, QuotationId};
pub use domain::selection::{AttributeValue, Selection};
pub use domain::template::{Attribute, AttributeKind, Template, TemplateId};
pub use domain::variant::{ItemCode, Variant};
pub use errors::{ApplicationError, DomainError, InterfaceError, RemoteError};
pub use form::{AttributeForm, AttributeFormBuilder, FieldValues};
pub use ports::ConfiguratorBackend;
pub use pricing::{PricingProfile, PricingRule, RuleMode, RuleOperator};
pub use workflow::{ConfigurationWorkflow, SubmitRequest, WorkflowReport, WorkflowSettings};
