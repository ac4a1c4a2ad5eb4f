//! Query execution: requests, compilation onto storage selections and
//! result materialization

mod engine;
mod materialize;
mod request;
mod result;

pub use engine::QueryEngine;
pub use materialize::{FromQueryRow, QueryRow, Record, ResultKind, Tuple};
pub use request::{QueryRequest, QuerySource};
pub use result::QueryResult;
