//! Call graph over indexed code entities.
//!
//! Edges are derived from each entity's `calls` list. The graph is built once
//! from a consistent store snapshot and is immutable afterwards, so it can be
//! shared across concurrent queries behind an `Arc`.
//!
//! # Example
//!
//! ```
//! use faultline_call_graph::CallGraph;
//! use faultline_entity_store::{CodeEntity, EntityType};
//!
//! let entities = vec![
//!     CodeEntity::new("p", "processPayment", "processPayment", EntityType::Function, "pay.py", 1, 9)
//!         .with_calls(["validate"]),
//!     CodeEntity::new("v", "validate", "validate", EntityType::Function, "pay.py", 11, 20),
//! ];
//!
//! let graph = CallGraph::build(&entities, 1);
//! let expanded = graph.expand(["v"], 2, 10);
//! assert_eq!(expanded[0].id, "p");
//! assert_eq!(expanded[0].depth, 1);
//! ```

mod graph;
mod resolve;

pub use graph::{BuildStats, CallGraph, Expansion};
