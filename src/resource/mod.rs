//! Resource transfer expectation tracking.

mod cache;

pub use cache::{Expectation, ExpectationCache};
