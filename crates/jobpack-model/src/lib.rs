//! Data types shared by the jobpack core, its backends and the submission gateway.

mod domain;
pub use domain::*;
