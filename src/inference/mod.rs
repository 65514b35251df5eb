pub mod classifier;
pub mod prediction;
pub mod types;
