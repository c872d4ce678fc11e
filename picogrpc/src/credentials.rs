//! Channel credentials: cleartext or TLS.

use std::sync::Arc;

/// PEM material for TLS channels.
///
/// Empty strings mean "use the defaults": with no `pem_root_certs` the
/// bundled webpki roots are trusted. Client identity fields are carried
/// for API parity; the handshake currently presents no client
/// certificate.
#[derive(Debug, Clone, Default)]
pub struct SslCredentialsOptions {
    pub pem_root_certs: String,
    pub pem_private_key: String,
    pub pem_cert_chain: String,
}

/// How a channel authenticates its transport.
#[derive(Debug)]
pub enum ChannelCredentials {
    Insecure,
    Ssl(SslCredentialsOptions),
}

impl ChannelCredentials {
    /// Credentials for a cleartext (h2c) channel.
    pub fn insecure() -> Arc<Self> {
        Arc::new(ChannelCredentials::Insecure)
    }

    /// Credentials for a TLS channel.
    pub fn ssl(options: SslCredentialsOptions) -> Arc<Self> {
        Arc::new(ChannelCredentials::Ssl(options))
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, ChannelCredentials::Ssl(_))
    }

    pub fn ssl_options(&self) -> Option<&SslCredentialsOptions> {
        match self {
            ChannelCredentials::Ssl(options) => Some(options),
            ChannelCredentials::Insecure => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insecure_is_not_secure() {
        let creds = ChannelCredentials::insecure();
        assert!(!creds.is_secure());
        assert!(creds.ssl_options().is_none());
    }

    #[test]
    fn test_ssl_is_secure() {
        let creds = ChannelCredentials::ssl(SslCredentialsOptions::default());
        assert!(creds.is_secure());
        assert!(creds.ssl_options().is_some());
    }

    #[test]
    fn test_ssl_options_preserved() {
        let creds = ChannelCredentials::ssl(SslCredentialsOptions {
            pem_root_certs: "-----BEGIN CERTIFICATE-----".to_string(),
            ..Default::default()
        });
        let options = creds.ssl_options().unwrap();
        assert!(options.pem_root_certs.starts_with("-----BEGIN"));
        assert!(options.pem_private_key.is_empty());
    }

    #[test]
    fn test_credentials_shareable() {
        let creds = ChannelCredentials::insecure();
        let clone = Arc::clone(&creds);
        assert!(!clone.is_secure());
    }
}
