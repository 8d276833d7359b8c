//! qorch: query orchestration service
//!
//! A user query is decomposed into sub-queries, each sub-query is classified
//! into a category (`OFD`, `TKG`, `CAUSAL`), dispatched in parallel to that
//! category's HTTP endpoint, and the results are aggregated into one answer.
//!
//! This library provides:
//! - Route table built from configuration
//! - Task executor for category endpoints
//! - LLM-backed decomposition and classification
//! - Pipeline coordinator with a bounded, always-terminating run loop
//! - HTTP server exposing `POST /user_query`

pub mod analysis;
pub mod config;
pub mod executor;
pub mod llm;
pub mod pipeline;
pub mod routing;
pub mod transport;

pub use config::Config;
pub use pipeline::{PipelineCoordinator, PipelineRun, Query, SubQuery};
pub use routing::{Category, RouteTable};
