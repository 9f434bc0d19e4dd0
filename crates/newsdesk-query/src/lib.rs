//! Query DSL and execution for newsdesk search.

pub mod executor;
pub mod parser;

pub use executor::QueryExecutor;
pub use parser::{ParsedQuery, QueryParser};
