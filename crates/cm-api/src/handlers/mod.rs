pub mod feedback;
pub mod generate;
pub mod health;
pub mod workflows;
