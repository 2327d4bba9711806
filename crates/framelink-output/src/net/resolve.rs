//! Name resolution behind a trait, so sessions can be driven by a scripted
//! resolver in tests.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

/// Outcome of a failed lookup.
#[derive(Debug)]
pub enum ResolveError {
    /// The name service is temporarily unavailable; asking again may work.
    Transient(io::Error),
    /// The name cannot be resolved.
    Fatal(io::Error),
}

pub trait Resolver: Send + Sync {
    /// Resolves `host` to socket addresses carrying `port`.
    fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, ResolveError>;
}

/// The operating system resolver (`getaddrinfo` via std).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, ResolveError> {
        match (host, port).to_socket_addrs() {
            Ok(addrs) => Ok(addrs.collect()),
            Err(e) if is_transient(&e) => Err(ResolveError::Transient(e)),
            Err(e) => Err(ResolveError::Fatal(e)),
        }
    }
}

/// std reports `EAI_AGAIN` only through its message text.
fn is_transient(err: &io::Error) -> bool {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => true,
        _ => err
            .to_string()
            .to_ascii_lowercase()
            .contains("temporary failure in name resolution"),
    }
}
