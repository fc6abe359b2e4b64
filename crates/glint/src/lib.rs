#![forbid(unsafe_code)]

//! Glint public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub mod prelude {
    pub use glint_query as query;
    pub use glint_reactive as reactive;

    pub use glint_query::{QueryClient, QueryKey, QueryOptions, create_query};
    pub use glint_reactive::{Observable, Scope, batch};
}
