pub mod annotations;
pub mod fork;
pub mod hierarchy;
pub mod service;
pub mod versions;

#[cfg(test)]
pub(crate) mod testing;

pub use annotations::*;
pub use fork::*;
pub use hierarchy::*;
pub use service::*;
pub use versions::*;
