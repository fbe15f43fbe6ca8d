pub mod annotation;
pub mod common;
pub mod entity;
pub mod fork;
pub mod repository;
pub mod user_context;
pub mod version;

pub use annotation::*;
pub use common::*;
pub use entity::*;
pub use fork::*;
pub use repository::*;
pub use user_context::*;
pub use version::*;
