//! The node/edge graph accepted by the compiler.
//!
//! - [`Graph`], [`Node`] and [`Edge`] documents with JSON loading
//! - Typed port parsing for edge handles
//! - [`GraphIndex`], the adjacency index used for ordering

mod handles;
mod index;
mod model;

pub use handles::{SourcePort, TargetPort};
pub use index::GraphIndex;
pub use model::{Edge, Graph, Node, NodeKind};
