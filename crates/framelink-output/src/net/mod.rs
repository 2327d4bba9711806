//! Network plumbing: name resolution and the receiver connection.

pub mod connection;
pub mod resolve;

pub use connection::{establish, ConnectionSlot, ConnectionState};
pub use resolve::{ResolveError, Resolver, SystemResolver};
