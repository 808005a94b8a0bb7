//! HTTP API handlers

pub mod health;
pub mod model_status;
pub mod root;
pub mod separate;

pub use health::health_routes;
pub use model_status::model_status_routes;
pub use root::root_routes;
pub use separate::separate_routes;
