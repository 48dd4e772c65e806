use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::ExecutionRef;

const LOCAL_GRPC_HOST: &str = "localhost:7233";
const LOCAL_HTTP_ENDPOINT: &str = "http://localhost:7243";
const LOCAL_WEB_URL: &str = "http://localhost:8233";
const CLOUD_WEB_URL: &str = "https://cloud.temporal.io";

/// One `[namespace.<name>]` table of the credentials file
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NamespaceProfile {
    /// gRPC host:port of the namespace endpoint
    pub temporal_cloud_host: String,

    /// Namespace name on the service
    pub temporal_namespace: String,

    /// PEM private key for mTLS
    #[serde(default)]
    pub temporal_private_key: Option<String>,

    /// PEM client certificate for mTLS
    #[serde(default)]
    pub temporal_public_key: Option<String>,

    /// HTTP API base URL (derived from the host when absent)
    #[serde(default)]
    pub temporal_http_endpoint: Option<String>,
}

/// Root of `~/.config/kairos/credentials`
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Credentials {
    #[serde(default)]
    pub namespace: BTreeMap<String, NamespaceProfile>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("credentials parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("cannot locate the home directory")]
    NoHomeDir,
    #[error("no profile named '{name}' (available: {})", available.join(", "))]
    UnknownProfile { name: String, available: Vec<String> },
    #[error("profile '{profile}': {field} is empty")]
    MissingField { profile: String, field: &'static str },
    #[error("profile '{profile}': mTLS needs both temporal_public_key and temporal_private_key")]
    IncompleteKeyPair { profile: String },
}

/// PEM key material for mutual TLS
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsIdentity {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Resolved connection settings handed to the backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub host: String,
    pub namespace: String,
    pub http_endpoint: String,
    pub tls: Option<TlsIdentity>,
}

impl ConnectionProfile {
    /// Local development server, default namespace, no key material
    pub fn local() -> Self {
        Self {
            host: LOCAL_GRPC_HOST.into(),
            namespace: "default".into(),
            http_endpoint: LOCAL_HTTP_ENDPOINT.into(),
            tls: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.host.contains("localhost") || self.host.starts_with("127.0.0.1")
    }

    /// Links into the web UI for this namespace
    pub fn viewer_links(&self) -> ViewerLinks {
        let base = if self.is_local() {
            LOCAL_WEB_URL
        } else {
            CLOUD_WEB_URL
        };
        ViewerLinks {
            base_url: base.to_string(),
            namespace: self.namespace.clone(),
        }
    }
}

/// Builds web UI URLs for executions
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewerLinks {
    pub base_url: String,
    pub namespace: String,
}

impl ViewerLinks {
    pub fn execution_url(&self, execution: &ExecutionRef) -> String {
        format!(
            "{}/namespaces/{}/workflows/{}/{}/history",
            self.base_url, self.namespace, execution.workflow_id, execution.run_id
        )
    }
}

fn derive_http_endpoint(host: &str) -> String {
    if host.contains("localhost") || host.starts_with("127.0.0.1") {
        return LOCAL_HTTP_ENDPOINT.to_string();
    }
    let bare = host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host);
    format!("https://{}", bare)
}

impl Credentials {
    /// Default location: `~/.config/kairos/credentials`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".config").join("kairos").join("credentials"))
    }

    /// Load credentials from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content)
    }

    /// Parse credentials from a string (useful for testing)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve a named profile into connection settings
    pub fn profile(&self, name: &str) -> Result<ConnectionProfile, ConfigError> {
        let raw = self
            .namespace
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                name: name.to_string(),
                available: self.namespace.keys().cloned().collect(),
            })?;

        if raw.temporal_cloud_host.trim().is_empty() {
            return Err(ConfigError::MissingField {
                profile: name.to_string(),
                field: "temporal_cloud_host",
            });
        }
        if raw.temporal_namespace.trim().is_empty() {
            return Err(ConfigError::MissingField {
                profile: name.to_string(),
                field: "temporal_namespace",
            });
        }

        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
        let tls = match (
            non_empty(&raw.temporal_public_key),
            non_empty(&raw.temporal_private_key),
        ) {
            (Some(cert_pem), Some(key_pem)) => Some(TlsIdentity { cert_pem, key_pem }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::IncompleteKeyPair {
                    profile: name.to_string(),
                });
            }
        };

        Ok(ConnectionProfile {
            host: raw.temporal_cloud_host.clone(),
            namespace: raw.temporal_namespace.clone(),
            http_endpoint: raw
                .temporal_http_endpoint
                .clone()
                .unwrap_or_else(|| derive_http_endpoint(&raw.temporal_cloud_host)),
            tls,
        })
    }
}
