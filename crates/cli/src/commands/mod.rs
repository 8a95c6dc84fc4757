pub mod catalog;
pub mod config;
pub mod configure;
pub mod doctor;
pub mod migrate;
pub mod seed;

use serde::Serialize;
use serde_json::{json, Value};
use signcfg_core::audit::TracingAuditSink;
use signcfg_core::errors::{ApplicationError, FailureClass};
use signcfg_core::ports::ConfiguratorBackend;
use signcfg_core::workflow::{ConfigurationWorkflow, WorkflowFailure, WorkflowSettings};

/// Actor recorded on audit events raised from the command line.
pub const CLI_ACTOR: &str = "signcfg-cli";

pub fn correlation_id() -> String {
    format!("cli-{}", uuid::Uuid::new_v4().simple())
}

pub type AuditedWorkflow<B> = ConfigurationWorkflow<B, TracingAuditSink>;

/// Workflow whose audit trail goes to the log.
pub fn audited_workflow<B: ConfiguratorBackend>(
    backend: B,
    settings: WorkflowSettings,
) -> AuditedWorkflow<B> {
    ConfigurationWorkflow::new(backend, settings).with_audit_sink(TracingAuditSink)
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::ok(command, message.into(), None)
    }

    pub fn success_with(command: &str, message: impl Into<String>, details: Value) -> Self {
        Self::ok(command, message.into(), Some(details))
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::error(command, error_class, message.into(), exit_code, None)
    }

    pub fn failure_with(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        details: Value,
    ) -> Self {
        Self::error(command, error_class, message.into(), exit_code, Some(details))
    }

    /// Maps a stopped workflow to its failure class: validation 7, missing data 8, remote 9.
    pub fn workflow_failure(
        command: &str,
        failure: &WorkflowFailure,
        correlation_id: &str,
    ) -> Self {
        let notice = failure.notice();
        let (error_class, exit_code) = failure_class(&failure.error);
        let interface = failure.error.clone().into_interface(correlation_id);
        Self::failure_with(
            command,
            error_class,
            format!("{}: {}", notice.title, notice.message),
            exit_code,
            json!({
                "indicator": notice.indicator,
                "title": notice.title,
                "state": failure.state,
                "failed_during": failure.failed_during,
                "user_message": interface.user_message(),
                "correlation_id": correlation_id,
            }),
        )
    }

    pub fn application_failure(
        command: &str,
        error: &ApplicationError,
        correlation_id: &str,
    ) -> Self {
        let (error_class, exit_code) = failure_class(error);
        let interface = error.clone().into_interface(correlation_id);
        Self::failure_with(
            command,
            error_class,
            error.to_string(),
            exit_code,
            json!({
                "user_message": interface.user_message(),
                "correlation_id": correlation_id,
            }),
        )
    }

    fn ok(command: &str, message: String, details: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message,
            details,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    fn error(
        command: &str,
        error_class: &str,
        message: String,
        exit_code: u8,
        details: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message,
            details,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn failure_class(error: &ApplicationError) -> (&'static str, u8) {
    match error.class() {
        FailureClass::Validation => ("validation", 7),
        FailureClass::MissingData => ("missing_data", 8),
        FailureClass::Remote => ("remote", 9),
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
