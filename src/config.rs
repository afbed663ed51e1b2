//! Configuration (spec section 6, "Environment configuration"). Layered
//! the way the teacher's CLI does it: a `Config` struct with
//! `serde(default)` loadable from an optional TOML file, then
//! individually overridden by environment variables and finally by CLI
//! flags — `CliOpts::resolve` applies exactly that precedence.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::entity::EntityType;

/// Platform-appropriate default storage root, falling back to `./data`
/// when no home directory can be resolved (e.g. a minimal container).
fn default_storage_root_folder() -> PathBuf {
    ProjectDirs::from("", "", "content-mesh")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
#[serde(default)]
pub struct Config {
    pub storage_root_folder: PathBuf,
    pub server_port: u16,
    pub sync_interval_secs: u64,
    pub request_ttl_backwards_ms: i64,
    pub request_ttl_forward_ms: i64,
    pub max_upload_size_per_type_mb: HashMap<EntityType, u64>,
    pub allow_legacy_entities: bool,
    pub eth_network: String,
    pub dcl_api_url: Option<String>,
    pub ens_owner_provider_url: Option<String>,
    pub dao_address: String,
    pub server_name: String,
    /// Pre-resolved peer base URLs — standing in for the real
    /// `DAO_ADDRESS` on-chain registry lookup (out of scope, section 1).
    pub peers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_root_folder: default_storage_root_folder(),
            server_port: 6969,
            sync_interval_secs: 5,
            request_ttl_backwards_ms: 10 * 60 * 1000,
            request_ttl_forward_ms: 5 * 60 * 1000,
            max_upload_size_per_type_mb: HashMap::new(),
            allow_legacy_entities: false,
            eth_network: "mainnet".to_string(),
            dcl_api_url: None,
            ens_owner_provider_url: None,
            dao_address: String::new(),
            server_name: "content-mesh".to_string(),
            peers: Vec::new(),
        }
    }
}

/// CLI flags, each of which also reads its matching environment variable
/// (spec section 6 names) via `clap`'s `env` feature. A flag only
/// overrides `Config` when explicitly set; otherwise the TOML file or
/// built-in default stands.
#[derive(Parser, Debug)]
#[command(name = "content-mesh-server", about = "Federated content-addressed repository node")]
pub struct CliOpts {
    /// A TOML file containing a full or partial `Config`.
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long, env = "STORAGE_ROOT_FOLDER")]
    pub storage_root_folder: Option<PathBuf>,
    #[arg(long, env = "SERVER_PORT")]
    pub server_port: Option<u16>,
    #[arg(long, env = "SYNC_WITH_SERVERS_INTERVAL")]
    pub sync_with_servers_interval: Option<u64>,
    #[arg(long, env = "REQUEST_TTL_BACKWARDS")]
    pub request_ttl_backwards: Option<i64>,
    #[arg(long, env = "REQUEST_TTL_FORWARDS")]
    pub request_ttl_forwards: Option<i64>,
    #[arg(long, env = "ALLOW_LEGACY_ENTITIES")]
    pub allow_legacy_entities: Option<bool>,
    /// `type=megabytes` pairs separated by commas, e.g.
    /// `scene=20,profile=2`.
    #[arg(long, env = "MAX_UPLOAD_SIZE_PER_TYPE")]
    pub max_upload_size_per_type: Option<String>,
    #[arg(long, env = "ETH_NETWORK")]
    pub eth_network: Option<String>,
    #[arg(long, env = "DCL_API_URL")]
    pub dcl_api_url: Option<String>,
    #[arg(long, env = "ENS_OWNER_PROVIDER_URL")]
    pub ens_owner_provider_url: Option<String>,
    #[arg(long, env = "DAO_ADDRESS")]
    pub dao_address: Option<String>,
    #[arg(long, env = "SERVER_NAME")]
    pub server_name: Option<String>,
}

/// Parses the `MAX_UPLOAD_SIZE_PER_TYPE` `type=megabytes,...` form.
fn parse_upload_size_per_type(raw: &str) -> anyhow::Result<HashMap<EntityType, u64>> {
    raw.split(',')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (ty, mb) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("malformed MAX_UPLOAD_SIZE_PER_TYPE entry {pair:?}, expected type=megabytes"))?;
            Ok((EntityType::from(ty), mb.parse::<u64>()?))
        })
        .collect()
}

impl CliOpts {
    /// Defaults < TOML file < env vars < CLI flags (env/CLI are not
    /// distinguished beyond this point because `clap`'s `env` feature
    /// already resolved that precedence into `self`).
    pub fn resolve(&self) -> anyhow::Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                toml::from_str(&text)?
            }
            None => Config::default(),
        };

        if let Some(v) = &self.storage_root_folder {
            cfg.storage_root_folder = v.clone();
        }
        if let Some(v) = self.server_port {
            cfg.server_port = v;
        }
        if let Some(v) = self.sync_with_servers_interval {
            cfg.sync_interval_secs = v;
        }
        if let Some(v) = self.request_ttl_backwards {
            cfg.request_ttl_backwards_ms = v;
        }
        if let Some(v) = self.request_ttl_forwards {
            cfg.request_ttl_forward_ms = v;
        }
        if let Some(v) = self.allow_legacy_entities {
            cfg.allow_legacy_entities = v;
        }
        if let Some(v) = &self.max_upload_size_per_type {
            cfg.max_upload_size_per_type_mb = parse_upload_size_per_type(v)?;
        }
        if let Some(v) = &self.eth_network {
            cfg.eth_network = v.clone();
        }
        if self.dcl_api_url.is_some() {
            cfg.dcl_api_url = self.dcl_api_url.clone();
        }
        if self.ens_owner_provider_url.is_some() {
            cfg.ens_owner_provider_url = self.ens_owner_provider_url.clone();
        }
        if let Some(v) = &self.dao_address {
            cfg.dao_address = v.clone();
        }
        if let Some(v) = &self.server_name {
            cfg.server_name = v.clone();
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flag_overrides_default() {
        let opts = CliOpts {
            config: None,
            storage_root_folder: None,
            server_port: Some(9000),
            sync_with_servers_interval: None,
            request_ttl_backwards: None,
            request_ttl_forwards: None,
            allow_legacy_entities: None,
            max_upload_size_per_type: None,
            eth_network: None,
            dcl_api_url: None,
            ens_owner_provider_url: None,
            dao_address: None,
            server_name: None,
        };
        let cfg = opts.resolve().unwrap();
        assert_eq!(cfg.server_port, 9000);
        assert_eq!(cfg.sync_interval_secs, Config::default().sync_interval_secs);
    }

    #[test]
    fn max_upload_size_per_type_parses_comma_separated_pairs() {
        let parsed = parse_upload_size_per_type("scene=20,profile=2").unwrap();
        assert_eq!(parsed.get(&EntityType::from("scene")), Some(&20));
        assert_eq!(parsed.get(&EntityType::from("profile")), Some(&2));
    }

    #[test]
    fn max_upload_size_per_type_rejects_malformed_entries() {
        assert!(parse_upload_size_per_type("scene").is_err());
        assert!(parse_upload_size_per_type("scene=notanumber").is_err());
    }
}
