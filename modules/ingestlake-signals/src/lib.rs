//! Signal evaluator (C8): the DSL (v1) and the reconciliation loop that
//! turns `GraphStore` rows into `SignalInstance` rows via `SignalStore`.
//! Persistence itself lives in `ingestlake_catalog`; this crate only
//! interprets `definitionSpec` and drives the sweep.

pub mod dsl;
pub mod evaluator;

pub use evaluator::{evaluate_signals, DefinitionOutcome, EvaluateOptions, EvaluationReport};
