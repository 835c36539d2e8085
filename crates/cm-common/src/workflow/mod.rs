pub mod orchestrator;
pub mod state;
pub mod store;

pub use orchestrator::{run_iteration, IterationOutcome, WorkflowError};
pub use state::{
    candidate_count_for_iteration, is_final_iteration, StateUpdate, WorkflowPhase, WorkflowState,
    CANDIDATES_PER_ITERATION, FINAL_ITERATION_CANDIDATES, MAX_ITERATIONS,
};
pub use store::{IterationSummary, MemoryStore, StoreError, WorkflowStore};
