use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::workflow::states::{TransitionOutcome, WorkflowAction, WorkflowEvent, WorkflowState};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: WorkflowState, event: WorkflowEvent },
}

/// Linear configuration workflow: every step either advances or fails, nothing loops.
#[derive(Clone, Copy, Debug, Default)]
pub struct WorkflowEngine;

impl WorkflowEngine {
    pub fn initial_state(&self) -> WorkflowState {
        WorkflowState::Idle
    }

    pub fn apply(
        &self,
        current: WorkflowState,
        event: WorkflowEvent,
    ) -> Result<TransitionOutcome, WorkflowTransitionError> {
        transition(current, event)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: WorkflowState,
        event: WorkflowEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, WorkflowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(outcome) => sink.emit(
                audit
                    .event(
                        "workflow.transition_applied",
                        AuditCategory::Workflow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
            ),
            Err(error) => sink.emit(
                audit
                    .event(
                        "workflow.transition_rejected",
                        AuditCategory::Workflow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
            ),
        }
        result
    }
}

fn transition(
    current: WorkflowState,
    event: WorkflowEvent,
) -> Result<TransitionOutcome, WorkflowTransitionError> {
    use WorkflowAction::{
        AppendLineAndSave, ComputePrice, LoadAttributeCatalog, RenderFields, ReportError,
        ResolveVariant, ShowSuccess, UpsertPrice,
    };
    use WorkflowEvent::{
        DialogOpened, DocumentSaved, FormBuilt, PriceComputed, PriceRecorded, StepFailed,
        Submitted, VariantResolved,
    };
    use WorkflowState::{
        AppendingLine, AwaitingInput, BuildingForm, Failed, Idle, Pricing, ResolvingVariant, Saved,
        UpsertingPrice,
    };

    let (to, actions) = match (current, event) {
        (Idle, DialogOpened) => (BuildingForm, vec![LoadAttributeCatalog]),
        (BuildingForm, FormBuilt) => (AwaitingInput, vec![RenderFields]),
        (AwaitingInput, Submitted) => (Pricing, vec![ComputePrice]),
        (Pricing, PriceComputed) => (ResolvingVariant, vec![ResolveVariant]),
        (ResolvingVariant, VariantResolved) => (UpsertingPrice, vec![UpsertPrice]),
        (UpsertingPrice, PriceRecorded) => (AppendingLine, vec![AppendLineAndSave]),
        (AppendingLine, DocumentSaved) => (Saved, vec![ShowSuccess]),
        (BuildingForm | Pricing | ResolvingVariant | UpsertingPrice | AppendingLine, StepFailed) => {
            (Failed, vec![ReportError])
        }
        _ => return Err(WorkflowTransitionError::InvalidTransition { state: current, event }),
    };

    Ok(TransitionOutcome { from: current, to, event, actions })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::quotation::QuotationId;
    use crate::workflow::engine::{WorkflowEngine, WorkflowTransitionError};
    use crate::workflow::states::{WorkflowAction, WorkflowEvent, WorkflowState};

    const HAPPY_PATH: [WorkflowEvent; 7] = [
        WorkflowEvent::DialogOpened,
        WorkflowEvent::FormBuilt,
        WorkflowEvent::Submitted,
        WorkflowEvent::PriceComputed,
        WorkflowEvent::VariantResolved,
        WorkflowEvent::PriceRecorded,
        WorkflowEvent::DocumentSaved,
    ];

    #[test]
    fn happy_path_visits_every_state_in_order() {
        let engine = WorkflowEngine;
        let mut state = engine.initial_state();
        let mut visited = vec![state];

        for event in HAPPY_PATH {
            state = engine.apply(state, event).expect("advance").to;
            visited.push(state);
        }

        assert_eq!(
            visited,
            vec![
                WorkflowState::Idle,
                WorkflowState::BuildingForm,
                WorkflowState::AwaitingInput,
                WorkflowState::Pricing,
                WorkflowState::ResolvingVariant,
                WorkflowState::UpsertingPrice,
                WorkflowState::AppendingLine,
                WorkflowState::Saved,
            ]
        );
    }

    #[test]
    fn any_running_step_can_fail() {
        let engine = WorkflowEngine;
        for state in [
            WorkflowState::BuildingForm,
            WorkflowState::Pricing,
            WorkflowState::ResolvingVariant,
            WorkflowState::UpsertingPrice,
            WorkflowState::AppendingLine,
        ] {
            let outcome = engine
                .apply(state, WorkflowEvent::StepFailed)
                .expect("step failure is always accepted");
            assert_eq!(outcome.to, WorkflowState::Failed);
            assert_eq!(outcome.actions, vec![WorkflowAction::ReportError]);
        }
    }

    #[test]
    fn terminal_states_accept_no_events() {
        let engine = WorkflowEngine;
        for state in [WorkflowState::Saved, WorkflowState::Failed] {
            assert!(state.is_terminal());
            for event in HAPPY_PATH.into_iter().chain([WorkflowEvent::StepFailed]) {
                assert!(engine.apply(state, event).is_err());
            }
        }
    }

    #[test]
    fn steps_cannot_be_skipped() {
        let error = WorkflowEngine
            .apply(WorkflowState::Pricing, WorkflowEvent::PriceRecorded)
            .expect_err("pricing cannot jump to appending");

        assert_eq!(
            error,
            WorkflowTransitionError::InvalidTransition {
                state: WorkflowState::Pricing,
                event: WorkflowEvent::PriceRecorded,
            }
        );
    }

    #[test]
    fn submission_can_only_happen_while_awaiting_input() {
        let outcome = WorkflowEngine
            .apply(WorkflowState::AwaitingInput, WorkflowEvent::Submitted)
            .expect("submit from the open dialog");
        assert_eq!(outcome.to, WorkflowState::Pricing);
        assert_eq!(outcome.actions, vec![WorkflowAction::ComputePrice]);

        assert!(WorkflowEngine.apply(WorkflowState::BuildingForm, WorkflowEvent::Submitted).is_err());
    }

    #[test]
    fn transition_emits_audit_event() {
        let sink = InMemoryAuditSink::default();

        WorkflowEngine
            .apply_with_audit(
                WorkflowState::Idle,
                WorkflowEvent::DialogOpened,
                &sink,
                &AuditContext::new(Some(QuotationId("QTN-0009".to_owned())), "req-42", "tester"),
            )
            .expect("transition should succeed");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "req-42");
        assert_eq!(events[0].event_type, "workflow.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("BuildingForm"));
    }
}
