//! Context pipeline: raw payloads to a ranked `ContextBundle`

pub mod combiner;
pub mod normalizer;

pub use combiner::ResponseCombiner;
pub use normalizer::ContextNormalizer;
