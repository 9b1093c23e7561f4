pub mod evaluator;

pub use evaluator::{allowed, Action, Decision, ResourceKind};
