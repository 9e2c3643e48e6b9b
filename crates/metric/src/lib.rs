//! Public entry point for downstream adaptation drivers: re-exports the
//! metric-construction pipeline's types so consumers take a single
//! dependency rather than reaching into each leaf crate directly.

pub use hessian_recovery::{HessianError, RecoveryConfig, RecoveryDiagnostics};
pub use mesh_adapter::{InMemoryMesh, MeshAdapter, MeshError};
pub use metric_field::{Diagnostics, MetricError, MetricField};
pub use metric_geometry::{area, volume};
pub use metric_tensor::{Dim, Eigen, IntersectMode, Tensor, TensorError, EPS_ABS};
