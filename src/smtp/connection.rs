//! Read-only connection metadata handed to message handlers

use std::net::SocketAddr;

/// Connection-level facts a handler may base policy decisions on.
///
/// The underlying transport is never reachable from here.
///
/// The built-in server fills in the hostname, peer address and HELO domain.
/// It never terminates TLS or runs AUTH itself, so [`is_tls`](Self::is_tls)
/// and [`is_authenticated`](Self::is_authenticated) stay false unless an
/// embedder that handles those upstream sets them with
/// [`with_tls`](Self::with_tls) and
/// [`with_authenticated_user`](Self::with_authenticated_user).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    hostname: String,
    remote_addr: Option<SocketAddr>,
    client_domain: Option<String>,
    tls: bool,
    authenticated_user: Option<String>,
}

impl ConnectionInfo {
    /// Create metadata for a connection accepted by `hostname`
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_owned(),
            remote_addr: None,
            client_domain: None,
            tls: false,
            authenticated_user: None,
        }
    }

    /// Record the peer address of the connection
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Record the domain announced by the client in HELO/EHLO
    pub fn with_client_domain(mut self, domain: &str) -> Self {
        self.client_domain = Some(domain.to_owned());
        self
    }

    /// Mark the connection as encrypted.
    ///
    /// Set this when TLS is terminated in front of the server.
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Record the user the client authenticated as, when AUTH is handled upstream
    pub fn with_authenticated_user(mut self, user: &str) -> Self {
        self.authenticated_user = Some(user.to_owned());
        self
    }

    /// Hostname the server announced in its greeting
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Address of the connected client, if known
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Domain given with HELO/EHLO
    pub fn client_domain(&self) -> Option<&str> {
        self.client_domain.as_deref()
    }

    /// Whether the connection is encrypted
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// Principal the client authenticated as, if any
    pub fn authenticated_user(&self) -> Option<&str> {
        self.authenticated_user.as_deref()
    }

    /// Whether an authenticated user was recorded
    pub fn is_authenticated(&self) -> bool {
        self.authenticated_user.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_connection_info() {
        let info = ConnectionInfo::new("mx.local");

        assert_eq!(info.hostname(), "mx.local");
        assert!(info.remote_addr().is_none());
        assert!(info.client_domain().is_none());
        assert!(!info.is_tls());
        assert!(!info.is_authenticated());
    }

    #[test]
    fn test_builder_methods() {
        let addr: SocketAddr = "192.0.2.10:41000".parse().unwrap();
        let info = ConnectionInfo::new("mx.local")
            .with_remote_addr(addr)
            .with_client_domain("client.local")
            .with_tls(true)
            .with_authenticated_user("alice");

        assert_eq!(info.remote_addr(), Some(addr));
        assert_eq!(info.client_domain(), Some("client.local"));
        assert!(info.is_tls());
        assert_eq!(info.authenticated_user(), Some("alice"));
        assert!(info.is_authenticated());
    }
}
