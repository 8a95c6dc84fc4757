use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    BuildingForm,
    AwaitingInput,
    Pricing,
    ResolvingVariant,
    UpsertingPrice,
    AppendingLine,
    Saved,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Saved | Self::Failed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEvent {
    DialogOpened,
    FormBuilt,
    Submitted,
    PriceComputed,
    VariantResolved,
    PriceRecorded,
    DocumentSaved,
    StepFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    LoadAttributeCatalog,
    RenderFields,
    ComputePrice,
    ResolveVariant,
    UpsertPrice,
    AppendLineAndSave,
    ShowSuccess,
    ReportError,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub event: WorkflowEvent,
    pub actions: Vec<WorkflowAction>,
}
