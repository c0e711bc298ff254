use super::DEFAULT_NODE;
use super::error::ConfigError;
use super::node::{Credentials, NodeConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::{debug, warn};

static ENV_LOADER: Once = Once::new();

/// Raw configuration structure for deserialization from YAML
#[derive(Debug, Deserialize, Default)]
struct RawDocument {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    nodes: BTreeMap<String, RawNode>,
}

#[derive(Debug, Deserialize, Default)]
struct RawNode {
    address: Option<String>,
    cert: Option<String>,
    key: Option<String>,
    ca: Option<String>,
}

/// Parsed rnx configuration: every node in it satisfies the credential invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    pub path: PathBuf,
    pub version: Option<String>,
    nodes: BTreeMap<String, NodeConfig>,
}

/// Loads `.env` from the working directory once so `JOBLET_*` variables can live there.
pub fn ensure_env_loaded() {
    ENV_LOADER.call_once(|| {
        let _ = dotenvy::dotenv();
    });
}

/// Expands `~` and `$VAR` references in a user-supplied path.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(err) => {
            warn!(path = raw, %err, "failed to expand config path, using it verbatim");
            PathBuf::from(shellexpand::tilde(raw).as_ref())
        }
    }
}

/// Load the configuration document and pick the node to talk to.
pub fn resolve(
    path: &Path,
    node_override: Option<&str>,
    allow_insecure: bool,
) -> Result<NodeConfig, ConfigError> {
    load_document(path)?.select(node_override, allow_insecure)
}

pub fn load_document(path: &Path) -> Result<ConfigDocument, ConfigError> {
    debug!(path = %path.display(), "Reading rnx configuration file");

    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    ConfigDocument::from_yaml_str(path, &content)
}

impl ConfigDocument {
    pub fn from_yaml_str(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let parsed: RawDocument = if content.trim().is_empty() {
            RawDocument::default()
        } else {
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        };
        validate_and_build(path, parsed)
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeConfig> {
        self.nodes.values()
    }

    pub fn node(&self, name: &str) -> Option<&NodeConfig> {
        self.nodes.get(name)
    }

    /// The named node, or `default` when no name is given.
    pub fn select(
        &self,
        node_override: Option<&str>,
        allow_insecure: bool,
    ) -> Result<NodeConfig, ConfigError> {
        let requested = node_override.map(str::trim).filter(|name| !name.is_empty());
        let node = match requested {
            Some(name) => self.nodes.get(name).ok_or_else(|| ConfigError::NodeNotFound {
                node: name.to_string(),
                available: self.available(),
            })?,
            None => self
                .nodes
                .get(DEFAULT_NODE)
                .ok_or_else(|| ConfigError::NoDefaultNode {
                    available: self.available(),
                })?,
        };

        if node.is_insecure() && !allow_insecure {
            return Err(ConfigError::InsecureNotAllowed {
                node: node.name.clone(),
            });
        }

        debug!(node = %node.name, address = %node.address, "Selected joblet node");
        Ok(node.clone())
    }

    fn available(&self) -> String {
        self.node_names().join(", ")
    }
}

fn validate_and_build(path: &Path, parsed: RawDocument) -> Result<ConfigDocument, ConfigError> {
    if parsed.nodes.is_empty() {
        return Err(ConfigError::NoNodes {
            path: path.to_path_buf(),
        });
    }

    let mut nodes = BTreeMap::new();
    for (name, raw) in parsed.nodes {
        let node = build_node(&name, raw)?;
        nodes.insert(name, node);
    }

    Ok(ConfigDocument {
        path: path.to_path_buf(),
        version: parsed.version,
        nodes,
    })
}

fn build_node(name: &str, raw: RawNode) -> Result<NodeConfig, ConfigError> {
    let address = non_empty(raw.address).ok_or_else(|| ConfigError::MissingAddress {
        node: name.to_string(),
    })?;

    let cert = non_empty(raw.cert);
    let key = non_empty(raw.key);
    let ca = non_empty(raw.ca);

    let credentials = match (cert, key, ca) {
        (Some(cert_pem), Some(key_pem), Some(ca_pem)) => Some(Credentials {
            cert_pem,
            key_pem,
            ca_pem,
        }),
        (None, None, None) => None,
        (cert, key, ca) => {
            let missing = [("cert", cert.is_none()), ("key", key.is_none()), ("ca", ca.is_none())]
                .iter()
                .filter(|(_, absent)| *absent)
                .map(|(field, _)| *field)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ConfigError::PartialCredentials {
                node: name.to_string(),
                missing,
            });
        }
    };

    Ok(NodeConfig {
        name: name.to_string(),
        address,
        credentials,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
