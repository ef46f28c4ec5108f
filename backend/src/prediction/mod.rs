pub mod normalizer;
pub mod orchestrator;
