pub mod analysis;
pub mod decision;
pub mod generation;
pub mod refinement;

pub use analysis::{analyze_feedback, AnalysisError, FeedbackAnalysis};
pub use decision::{calculate_feedback_impact, should_refine, FeedbackImpact};
pub use generation::{generate_candidates, GenerationError};
pub use refinement::{refine_criteria, seed_initial_criteria, RefinementError};
