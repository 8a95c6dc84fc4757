use serde_json::json;
use signcfg_core::audit::AuditContext;
use signcfg_core::config::{AppConfig, LoadOptions};
use signcfg_core::domain::quotation::QuotationId;
use signcfg_core::domain::template::TemplateId;
use signcfg_core::errors::{ApplicationError, DomainError};
use signcfg_core::form::FieldValues;
use signcfg_core::ports::{ConfiguratorBackend, DesignMeasurement};
use signcfg_core::workflow::{ConfigurationDialog, SubmitRequest, WorkflowSettings};
use signcfg_db::{connect_with_config, migrations, LocalBackend};
use signcfg_host::HostClient;
use tracing::info;

use crate::commands::{
    audited_workflow, correlation_id, AuditedWorkflow, CommandResult, CLI_ACTOR,
};
use crate::ConfigureArgs;

pub fn run(options: LoadOptions, args: ConfigureArgs) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "configure",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let assignments = match parse_assignments(&args.set) {
        Ok(assignments) => assignments,
        Err(message) => {
            return CommandResult::failure("configure", "invalid_argument", message, 2);
        }
    };
    if args.design_file.is_some() && !args.remote {
        return CommandResult::failure(
            "configure",
            "invalid_argument",
            "--design-file needs --remote; perimeter measurement runs on the host application",
            2,
        );
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "configure",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let quotation = QuotationId(args.quotation.trim().to_owned());
    let plan = Plan {
        template: TemplateId(args.template.trim().to_owned()),
        audit: AuditContext::new(Some(quotation.clone()), correlation_id(), CLI_ACTOR),
        request: SubmitRequest {
            qty: args.qty,
            uom: args.uom.clone(),
            ..SubmitRequest::new(quotation, FieldValues::new())
        },
        assignments,
        design_file: args.design_file.clone(),
    };
    let settings = WorkflowSettings::from(&config.workflow);

    let result = runtime.block_on(async {
        if args.remote {
            let client = HostClient::from_config(&config.host).map_err(|error| {
                CommandResult::failure("configure", "host_config", error.to_string(), 2)
            })?;
            let workflow = audited_workflow(client, settings);
            let measurer: &dyn DesignMeasurement = workflow.backend();
            configure(&workflow, plan, Some(measurer)).await
        } else {
            let pool = connect_with_config(&config.database).await.map_err(|error| {
                CommandResult::failure("configure", "db_connectivity", error.to_string(), 4)
            })?;
            migrations::run_pending(&pool).await.map_err(|error| {
                CommandResult::failure("configure", "migration", error.to_string(), 5)
            })?;

            let backend = LocalBackend::new(pool.clone(), config.workflow.default_currency.clone())
                .with_pricing_model(config.workflow.pricing_model);
            let outcome = configure(&audited_workflow(backend, settings), plan, None).await;
            pool.close().await;
            outcome
        }
    });

    match result {
        Ok(result) | Err(result) => result,
    }
}

struct Plan {
    template: TemplateId,
    audit: AuditContext,
    request: SubmitRequest,
    assignments: Vec<(String, String)>,
    design_file: Option<String>,
}

async fn configure<B: ConfiguratorBackend>(
    workflow: &AuditedWorkflow<B>,
    plan: Plan,
    measurer: Option<&dyn DesignMeasurement>,
) -> Result<CommandResult, CommandResult> {
    let correlation_id = plan.audit.correlation_id.as_str();
    let mut dialog = workflow
        .open(Some(&plan.template), &plan.audit)
        .await
        .map_err(|failure| CommandResult::workflow_failure("configure", &failure, correlation_id))?;

    let mut perimeter = None;
    if let (Some(file_url), Some(measurer)) = (plan.design_file.as_deref(), measurer) {
        let measurement = workflow
            .prefill_perimeter(&mut dialog, measurer, file_url)
            .await
            .map_err(|error| {
                CommandResult::application_failure("configure", &error, correlation_id)
            })?;
        perimeter = Some(measurement);
    }

    // Explicit values win over a measured perimeter.
    apply_assignments(&mut dialog, &plan.assignments)
        .map_err(|error| CommandResult::application_failure("configure", &error, correlation_id))?;

    let report = workflow
        .submit(&dialog, plan.request, &plan.audit)
        .await
        .map_err(|failure| CommandResult::workflow_failure("configure", &failure, correlation_id))?;

    info!(
        event_name = "cli.configure.completed",
        correlation_id = %correlation_id,
        item_code = %report.item_code,
        variant_created = report.variant_created,
        "variant added to quotation"
    );

    let notice = report.notice();
    Ok(CommandResult::success_with(
        "configure",
        notice.message,
        json!({
            "indicator": notice.indicator,
            "quotation": report.quotation_id,
            "item_code": report.item_code,
            "variant_created": report.variant_created,
            "price": report.price,
            "currency": report.currency,
            "price_list": report.price_list,
            "price_entry": report.price_entry,
            "line": report.line,
            "row": report.line.index() + 1,
            "qty": report.qty,
            "uom": report.uom,
            "breakdown": report.breakdown,
            "perimeter": perimeter,
        }),
    ))
}

fn parse_assignments(raw: &[String]) -> Result<Vec<(String, String)>, String> {
    raw.iter()
        .map(|entry| match entry.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_owned(), value.trim().to_owned()))
            }
            _ => Err(format!("expected --set NAME=VALUE, got `{entry}`")),
        })
        .collect()
}

/// Attribute names match exactly first, then case-insensitively; a generated field name
/// is accepted as a last resort.
fn apply_assignments(
    dialog: &mut ConfigurationDialog,
    assignments: &[(String, String)],
) -> Result<(), ApplicationError> {
    for (name, value) in assignments {
        if dialog.prefill(name, value.clone()) {
            continue;
        }

        let attribute = dialog
            .template()
            .attributes
            .iter()
            .find(|attribute| attribute.name.eq_ignore_ascii_case(name))
            .map(|attribute| attribute.name.clone())
            .or_else(|| dialog.form().key_map.attribute_for(name).map(str::to_owned));

        match attribute {
            Some(attribute) if dialog.prefill(&attribute, value.clone()) => {}
            _ => return Err(DomainError::UnknownAttribute(name.clone()).into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::parse_assignments;

    #[test]
    fn assignments_split_on_the_first_equals_sign() {
        let parsed = parse_assignments(&["Color = Red".to_owned(), "Note=a=b".to_owned()])
            .expect("valid assignments");

        assert_eq!(
            parsed,
            vec![
                ("Color".to_owned(), "Red".to_owned()),
                ("Note".to_owned(), "a=b".to_owned())
            ]
        );
    }

    #[test]
    fn assignments_without_a_name_are_rejected() {
        let error = parse_assignments(&["=Red".to_owned()]).expect_err("missing name");
        assert!(error.contains("`=Red`"));

        assert!(parse_assignments(&["Color".to_owned()]).is_err());
    }
}
