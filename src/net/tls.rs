//! TLS virtual-host configuration registry.
//!
//! # Responsibilities
//! - Hold one TLS identity configuration per virtual-host name
//! - Resolve an SNI host name to its identity (exact, wildcard, default)
//! - Build rustls server configs from PEM material through a pluggable seam
//!
//! # Design Decisions
//! - Lookups are concurrent and lock-free; mutation happens only in
//!   controlled reconfiguration windows
//! - A rejected add leaves the registry untouched and drops any context
//!   that was built for the rejected entry
//! - Matching is case-sensitive on the stored keys

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reserved virtual-host name the default entry is registered under when no
/// other default is configured.
pub const DEFAULT_TLS_HOST_NAME: &str = "_default_";

/// Result of building a TLS identity for one host entry.
pub type TlsContextResult =
    Result<Arc<rustls::ServerConfig>, Box<dyn std::error::Error + Send + Sync>>;

/// Named TLS identity configuration for one virtual host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsHostConfig {
    /// Virtual-host name, exact (`www.example.com`) or wildcard
    /// (`*.example.com`).
    pub host_name: String,
    /// Path to the certificate chain (PEM).
    pub cert_path: PathBuf,
    /// Path to the private key (PEM).
    pub key_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum TlsRegistryError {
    #[error("TLS host configuration has an empty host name")]
    EmptyHostName,
    #[error("duplicate TLS host configuration for {0:?}")]
    DuplicateHostName(String),
    #[error("failed to build TLS context for host {host:?}")]
    ContextBuild {
        host: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Builds the opaque TLS identity object for a host configuration.
///
/// The handshake itself happens outside the endpoint core; this seam only
/// turns configured key material into something an embedder can hand to its
/// TLS engine.
pub trait TlsContextBuilder: Send + Sync + 'static {
    fn build(&self, config: &TlsHostConfig) -> TlsContextResult;
}

/// Default builder: loads a PEM certificate chain and private key from disk.
#[derive(Debug, Default)]
pub struct PemTlsContextBuilder;

impl TlsContextBuilder for PemTlsContextBuilder {
    fn build(&self, config: &TlsHostConfig) -> TlsContextResult {
        let mut cert_reader = BufReader::new(File::open(&config.cert_path)?);
        let certs = rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;

        let mut key_reader = BufReader::new(File::open(&config.key_path)?);
        let key = rustls_pemfile::private_key(&mut key_reader)?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("no private key found in {}", config.key_path.display()),
            )
        })?;

        let server_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        Ok(Arc::new(server_config))
    }
}

/// One registered virtual host: its configuration plus the identity built
/// from it (present once the endpoint is bound).
#[derive(Debug)]
pub struct TlsHostEntry {
    config: TlsHostConfig,
    context: ArcSwapOption<rustls::ServerConfig>,
}

impl TlsHostEntry {
    pub fn config(&self) -> &TlsHostConfig {
        &self.config
    }

    pub fn context(&self) -> Option<Arc<rustls::ServerConfig>> {
        self.context.load_full()
    }

    pub(crate) fn set_context(&self, context: Arc<rustls::ServerConfig>) {
        self.context.store(Some(context));
    }

    pub(crate) fn clear_context(&self) {
        self.context.store(None);
    }
}

/// Mapping from virtual-host name to TLS identity, with SNI resolution.
#[derive(Debug)]
pub struct TlsConfigRegistry {
    entries: DashMap<String, Arc<TlsHostEntry>>,
    default_name: Mutex<String>,
}

impl TlsConfigRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            default_name: Mutex::new(DEFAULT_TLS_HOST_NAME.to_string()),
        }
    }

    pub fn default_host_name(&self) -> String {
        self.default_name.lock().clone()
    }

    pub fn set_default_host_name(&self, name: impl Into<String>) {
        *self.default_name.lock() = name.into();
    }

    /// Register a host entry, optionally with an already-built context.
    ///
    /// Rejects empty names and duplicates. On rejection the registry is left
    /// exactly as it was; a context passed in for the rejected entry is
    /// dropped here, releasing it.
    pub fn add(
        &self,
        config: TlsHostConfig,
        context: Option<Arc<rustls::ServerConfig>>,
    ) -> Result<(), TlsRegistryError> {
        if config.host_name.is_empty() {
            return Err(TlsRegistryError::EmptyHostName);
        }
        let name = config.host_name.clone();
        let entry = Arc::new(TlsHostEntry {
            config,
            context: ArcSwapOption::from(context),
        });
        match self.entries.entry(name) {
            Entry::Occupied(occupied) => {
                Err(TlsRegistryError::DuplicateHostName(occupied.key().clone()))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(())
            }
        }
    }

    /// Resolve an SNI host name to a registered entry.
    ///
    /// Exact match first; then a single-label wildcard (`*` plus everything
    /// from the first dot); finally the default entry. The default entry is
    /// an initialization invariant, so its absence is a wiring bug rather
    /// than a recoverable condition.
    pub fn resolve(&self, sni_host_name: Option<&str>) -> Arc<TlsHostEntry> {
        if let Some(name) = sni_host_name {
            if let Some(entry) = self.entries.get(name) {
                return Arc::clone(entry.value());
            }
            if let Some(dot) = name.find('.') {
                let wildcard = format!("*{}", &name[dot..]);
                if let Some(entry) = self.entries.get(&wildcard) {
                    return Arc::clone(entry.value());
                }
            }
        }
        let default_name = self.default_host_name();
        match self.entries.get(&default_name) {
            Some(entry) => Arc::clone(entry.value()),
            None => panic!("no TLS host configuration registered for default host {default_name:?}"),
        }
    }

    /// All registered entries, in no particular order.
    pub fn entries(&self) -> Vec<Arc<TlsHostEntry>> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Drop every built context, keeping the configurations. Called when the
    /// endpoint unbinds.
    pub fn clear_contexts(&self) {
        for entry in self.entries.iter() {
            entry.value().clear_context();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TlsConfigRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str) -> TlsHostConfig {
        TlsHostConfig {
            host_name: name.to_string(),
            cert_path: PathBuf::from(format!("/certs/{name}.crt")),
            key_path: PathBuf::from(format!("/certs/{name}.key")),
        }
    }

    fn registry_with(names: &[&str]) -> TlsConfigRegistry {
        let registry = TlsConfigRegistry::new();
        for name in names {
            registry.add(host(name), None).expect("add");
        }
        registry
    }

    #[test]
    fn resolve_prefers_exact_match() {
        let registry = registry_with(&[DEFAULT_TLS_HOST_NAME, "www.example.com", "*.example.com"]);
        let entry = registry.resolve(Some("www.example.com"));
        assert_eq!(entry.config().host_name, "www.example.com");
    }

    #[test]
    fn resolve_falls_back_to_wildcard() {
        let registry = registry_with(&[DEFAULT_TLS_HOST_NAME, "*.example.com"]);
        let entry = registry.resolve(Some("foo.example.com"));
        assert_eq!(entry.config().host_name, "*.example.com");
    }

    #[test]
    fn wildcard_matches_only_from_first_dot() {
        let registry = registry_with(&[DEFAULT_TLS_HOST_NAME, "*.example.com"]);
        // No dot in the name, so there is nothing for the wildcard to match.
        let entry = registry.resolve(Some("example"));
        assert_eq!(entry.config().host_name, DEFAULT_TLS_HOST_NAME);
    }

    #[test]
    fn resolve_none_and_unknown_use_default() {
        let registry = registry_with(&[DEFAULT_TLS_HOST_NAME, "*.example.com"]);
        assert_eq!(
            registry.resolve(None).config().host_name,
            DEFAULT_TLS_HOST_NAME
        );
        assert_eq!(
            registry.resolve(Some("other.test")).config().host_name,
            DEFAULT_TLS_HOST_NAME
        );
    }

    #[test]
    fn configured_default_name_is_honored() {
        let registry = registry_with(&["main.example.com"]);
        registry.set_default_host_name("main.example.com");
        let entry = registry.resolve(Some("unknown.test"));
        assert_eq!(entry.config().host_name, "main.example.com");
    }

    #[test]
    fn duplicate_add_fails_and_keeps_first_entry() {
        let registry = TlsConfigRegistry::new();
        let mut first = host("www.example.com");
        first.cert_path = PathBuf::from("/certs/first.crt");
        registry.add(first, None).expect("first add");

        let mut second = host("www.example.com");
        second.cert_path = PathBuf::from("/certs/second.crt");
        let err = registry.add(second, None).expect_err("duplicate must fail");
        assert!(matches!(err, TlsRegistryError::DuplicateHostName(name) if name == "www.example.com"));

        assert_eq!(registry.len(), 1);
        let entry = registry.resolve(Some("www.example.com"));
        assert_eq!(entry.config().cert_path, PathBuf::from("/certs/first.crt"));
    }

    #[test]
    fn empty_host_name_is_rejected() {
        let registry = TlsConfigRegistry::new();
        let err = registry.add(host(""), None).expect_err("empty name");
        assert!(matches!(err, TlsRegistryError::EmptyHostName));
        assert!(registry.is_empty());
    }

    #[test]
    #[should_panic(expected = "no TLS host configuration registered for default host")]
    fn missing_default_entry_is_fatal() {
        let registry = TlsConfigRegistry::new();
        registry.resolve(Some("anything.example.com"));
    }

    #[test]
    fn pem_builder_rejects_missing_files() {
        let builder = PemTlsContextBuilder;
        let config = TlsHostConfig {
            host_name: "www.example.com".to_string(),
            cert_path: PathBuf::from("/nonexistent/cert.pem"),
            key_path: PathBuf::from("/nonexistent/key.pem"),
        };
        assert!(builder.build(&config).is_err());
    }
}
