//! Action execution against the live browser

mod executor;

pub use executor::{ActionExecutor, Execution};
