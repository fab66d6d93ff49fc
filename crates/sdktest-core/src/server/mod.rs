//! The mock HTTP endpoint.
//!
//! - [`MockServer`] - A hyper server bound to one route, recording every request it serves
//! - [`ResponseGenerator`] - Produces the body for each matching request

pub mod mock_server;

pub use mock_server::{route_matches, MockServer, ResponseGenerator};
