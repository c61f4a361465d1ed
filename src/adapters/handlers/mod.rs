//! Step handler implementations.

pub mod http;
pub mod mock;

pub use http::{parse_plan, ChatMode, HttpPlanner, HttpStepHandler, InferenceClient};
pub use mock::MockStepHandler;
