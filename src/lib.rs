//! Pantry Path — request-path rewriting middleware for Pantry storage backends.
//!
//! Reads the Pantry ID from a header, picks the basket out of the request path
//! and forwards the request as `/apiv1/pantry/{id}[/basket/{basket}]`.

pub mod config;
pub mod errors;
pub mod middleware;
