pub mod engine;
pub mod notice;
pub mod runner;
pub mod states;

pub use engine::{WorkflowEngine, WorkflowTransitionError};
pub use notice::{Indicator, Notice};
pub use runner::{
    ConfigurationDialog, ConfigurationWorkflow, PriceEntryAction, SubmitRequest, WorkflowFailure,
    WorkflowReport, WorkflowSettings,
};
pub use states::{TransitionOutcome, WorkflowAction, WorkflowEvent, WorkflowState};
