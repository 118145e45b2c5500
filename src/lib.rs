pub mod buffer;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod kernels;
pub mod logging;
pub mod scalar;
pub mod sections;
pub mod stream;
pub mod tester;
pub mod view;

pub use error::{Error, Result};

#[cfg(test)]
mod tests;

pub mod prelude {
    pub use crate::buffer::*;
    pub use crate::config::*;
    pub use crate::context::*;
    pub use crate::device::{
        sim::{FaultPoint, SimDevice},
        BlasRoutines, Device, DeviceMemory, LibraryHandle, QueueId, SolverRoutines,
    };
    pub use crate::error::*;
    pub use crate::kernels::*;
    pub use crate::scalar::*;
    pub use crate::sections::*;
    pub use crate::stream::*;
    pub use crate::tester::*;
    pub use crate::view::*;
}
