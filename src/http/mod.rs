//! HTTP routes for arena control and health

pub mod routes;

pub use routes::build_router;
