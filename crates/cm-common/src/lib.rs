pub mod candidates;
pub mod criteria;
pub mod db;
pub mod engine;
pub mod jobs;
pub mod llm;
pub mod logging;
pub mod skills;
pub mod workflow;
