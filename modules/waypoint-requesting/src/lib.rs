//! Request handling on top of the synchronization engine: the Requesting
//! concept, the passthrough route table, and the gateway that starts runs.

pub mod concept;
pub mod config;
pub mod gateway;
pub mod routes;

pub use concept::Requesting;
pub use config::RequestingConfig;
pub use gateway::{Gateway, GatewayResponse, RouteKind, SessionResolver};
pub use routes::{operation_for, route_for, PassthroughRoutes};
