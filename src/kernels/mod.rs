//! One tester per routine family. Each fills its operands with values whose
//! correct result has a closed form, or is cheap to recompute on the host.

mod axpy;
mod copy;
mod dot;
mod extremum;
mod gemm;
mod gemv;
mod gesv;

pub use axpy::*;
pub use copy::*;
pub use dot::*;
pub use extremum::*;
pub use gemm::*;
pub use gemv::*;
pub use gesv::*;
