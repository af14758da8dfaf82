pub mod api;
pub mod models;
pub mod summary;

pub use api::*;
pub use models::*;
pub use summary::*;
