//! The narrow surface the metric-construction core requires from its
//! surrounding mesh subsystem. Mesh I/O, renumbering policy, adaptation
//! operators and parallel halo exchange are all external collaborators;
//! this crate defines only the trait they must satisfy, plus an
//! [`in_memory::InMemoryMesh`] reference implementation used by tests and
//! the demo CLI.

mod in_memory;

pub use in_memory::{InMemoryMesh, MeshError};
pub use metric_tensor::Dim;

/// The mesh-side interface the metric-field core depends on. A production
/// mesh container (with its own node-patch queries, boundary
/// classification, and renumbering map) implements this trait directly;
/// nothing about its storage layout leaks into the core.
///
/// `expand_patch` returns neighbours of `i` *excluding* `i` itself — the
/// caller (Hessian recovery) adds the node's own sample once, explicitly,
/// rather than relying on the patch to include it. This resolves the
/// "is `i` double-counted" ambiguity by construction.
pub trait MeshAdapter: Send + Sync {
    fn num_nodes(&self) -> usize;
    fn num_elements(&self) -> usize;
    fn dimension(&self) -> Dim;
    /// Coordinates of node `i`, length `dimension().n()`.
    fn coords(&self, i: usize) -> &[f64];
    /// The `d+1` node ids making up element `e`.
    fn element(&self, e: usize) -> &[usize];
    /// Breadth-first expansion of node adjacency starting at (but
    /// excluding) `i`, returning at least `min_required` node ids when the
    /// mesh has that many reachable neighbours.
    fn expand_patch(&self, i: usize, min_required: usize) -> Vec<usize>;
    fn on_boundary(&self, i: usize) -> bool;
    /// Maps an internal node id to its index in the caller's original
    /// ordering.
    fn new2old(&self, i: usize) -> usize;
}
