use serde_json::json;
use signcfg_core::audit::AuditContext;
use signcfg_core::config::{AppConfig, LoadOptions};
use signcfg_core::domain::template::TemplateId;
use signcfg_core::ports::ConfiguratorBackend;
use signcfg_core::workflow::WorkflowSettings;
use signcfg_db::{connect_with_config, migrations, LocalBackend};
use signcfg_host::HostClient;

use crate::commands::{
    audited_workflow, correlation_id, AuditedWorkflow, CommandResult, CLI_ACTOR,
};

pub fn run(options: LoadOptions, template: &str, remote: bool) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "catalog",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "catalog",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let template = TemplateId(template.trim().to_owned());
    let settings = WorkflowSettings::from(&config.workflow);
    let audit = AuditContext::new(None, correlation_id(), CLI_ACTOR);

    let result = runtime.block_on(async {
        if remote {
            let client = HostClient::from_config(&config.host).map_err(|error| {
                CommandResult::failure("catalog", "host_config", error.to_string(), 2)
            })?;
            describe(&audited_workflow(client, settings), &template, &audit).await
        } else {
            let pool = connect_with_config(&config.database).await.map_err(|error| {
                CommandResult::failure("catalog", "db_connectivity", error.to_string(), 4)
            })?;
            migrations::run_pending(&pool).await.map_err(|error| {
                CommandResult::failure("catalog", "migration", error.to_string(), 5)
            })?;

            let backend = LocalBackend::new(pool.clone(), config.workflow.default_currency.clone())
                .with_pricing_model(config.workflow.pricing_model);
            let outcome = describe(&audited_workflow(backend, settings), &template, &audit).await;
            pool.close().await;
            outcome
        }
    });

    match result {
        Ok(result) | Err(result) => result,
    }
}

async fn describe<B: ConfiguratorBackend>(
    workflow: &AuditedWorkflow<B>,
    template: &TemplateId,
    audit: &AuditContext,
) -> Result<CommandResult, CommandResult> {
    let dialog = workflow
        .open(Some(template), audit)
        .await
        .map_err(|failure| {
            CommandResult::workflow_failure("catalog", &failure, &audit.correlation_id)
        })?;

    let form = dialog.form();
    let rows = form
        .rows()
        .iter()
        .map(|row| row.iter().map(|field| field.fieldname.clone()).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    let message = format!(
        "{template}: {} attribute field(s) in {} row(s)",
        form.fields().count(),
        rows.len()
    );

    Ok(CommandResult::success_with(
        "catalog",
        message,
        json!({
            "template": dialog.template(),
            "elements": form.elements,
            "rows": rows,
        }),
    ))
}
