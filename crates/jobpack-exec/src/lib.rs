//! Concrete execution backends.
//!
//! - [`ClusterBackend`]: submits each batch as one Slurm job and polls `sacct` for its state.
//! - [`LocalParallelBackend`]: pipes each batch into a local GNU `parallel` process.

mod util;

#[cfg(feature = "slurm")]
pub mod slurm;
#[cfg(feature = "slurm")]
pub use slurm::{ClusterBackend, ClusterConfig, ResourceShape};

#[cfg(feature = "parallel")]
pub mod parallel;
#[cfg(feature = "parallel")]
pub use parallel::{LocalConfig, LocalParallelBackend};

pub mod prelude {
    #[cfg(feature = "parallel")]
    pub use crate::{LocalConfig, LocalParallelBackend};
    #[cfg(feature = "slurm")]
    pub use crate::{ClusterBackend, ClusterConfig};
    pub use jobpack_core::{Backend, BackendError};
}
