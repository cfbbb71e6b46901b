//! Peer directory client for finding candidate peers from an external source.
//!
//! Candidates come from the Polkachu API:
//! - `api/v2/chains` lists every supported network
//! - `api/v2/chains/{network}` reports whether the live peers service is on
//! - `api/v2/chains/{network}/live_peers` returns a handful of random live
//!   peers as `node_id@ip:port` strings
//!
//! The network list and the service check are fetched once per client. Live
//! peers are fetched on every call since the directory rotates them.

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::{Mutex, OnceCell};

use crate::error::{AppError, DirectoryError};
use crate::types::PeerCandidate;

pub const DEFAULT_DIRECTORY_URL: &str = "https://polkachu.com";

/// Source of candidate peers for a named network.
#[async_trait::async_trait]
pub trait PeerDirectory: Send + Sync {
    async fn fetch_candidates(&self, network: &str) -> Result<Vec<PeerCandidate>, DirectoryError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct LivePeersService {
    pub active: bool,
    #[serde(default)]
    pub details: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolkachuServices {
    pub live_peers: LivePeersService,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainDetails {
    pub network: String,
    pub name: String,
    pub chain_id: String,
    pub polkachu_services: PolkachuServices,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainLivePeers {
    pub network: String,
    /// Polkachu's own state-sync peer. Not handed out as a candidate.
    #[serde(default)]
    pub polkachu_peer: Option<String>,
    pub live_peers: Vec<String>,
}

/// Polkachu-backed directory client
pub struct PolkachuDirectory {
    client: reqwest::Client,
    base_url: String,
    known_networks: OnceCell<Vec<String>>,
    verified: Mutex<HashSet<String>>,
}

impl PolkachuDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("peerscout/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            known_networks: OnceCell::new(),
            verified: Mutex::new(HashSet::new()),
        })
    }

    /// Networks the directory serves. Cached after the first successful fetch.
    pub async fn fetch_valid_chains(&self) -> Result<&[String], DirectoryError> {
        let chains = self
            .known_networks
            .get_or_try_init(|| async {
                let chains: Vec<String> = self
                    .get_json("api/v2/chains")
                    .await?
                    .ok_or_else(|| DirectoryError::Transient("chain list not found".into()))?;
                tracing::debug!("Directory serves {} networks", chains.len());
                Ok::<_, DirectoryError>(chains)
            })
            .await?;
        Ok(chains.as_slice())
    }

    pub async fn fetch_chain_details(&self, network: &str) -> Result<ChainDetails, DirectoryError> {
        let path = format!("api/v2/chains/{}", urlencoding::encode(network));
        self.get_json(&path)
            .await?
            .ok_or_else(|| unknown_network(network, Vec::new()))
    }

    pub async fn fetch_live_peers(&self, network: &str) -> Result<ChainLivePeers, DirectoryError> {
        let path = format!("api/v2/chains/{}/live_peers", urlencoding::encode(network));
        self.get_json(&path)
            .await?
            .ok_or_else(|| unknown_network(network, Vec::new()))
    }

    /// Check the network once: it must be listed and have live peers enabled
    async fn ensure_supported(&self, network: &str) -> Result<(), DirectoryError> {
        if self.verified.lock().await.contains(network) {
            return Ok(());
        }

        let chains = self.fetch_valid_chains().await?;
        if !chains.iter().any(|c| c == network) {
            let suggestions = close_matches(network, chains, 3, 0.6);
            return Err(unknown_network(network, suggestions));
        }

        let details = self.fetch_chain_details(network).await?;
        if !details.polkachu_services.live_peers.active {
            return Err(DirectoryError::ServiceUnavailable {
                network: details.name,
            });
        }
        tracing::debug!(
            "🔍 {} ({}) live peers service is active",
            details.name,
            details.chain_id
        );

        self.verified.lock().await.insert(network.to_string());
        Ok(())
    }

    /// GET a JSON document. `Ok(None)` means the directory answered 404.
    async fn get_json<T: DeserializeOwned + Send>(&self, path: &str) -> Result<Option<T>, DirectoryError> {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DirectoryError::Transient(format!("GET {}: {}", url, e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = response
            .error_for_status()
            .map_err(|e| DirectoryError::Transient(e.to_string()))?;

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| DirectoryError::Transient(format!("bad response from {}: {}", url, e)))
    }
}

#[async_trait::async_trait]
impl PeerDirectory for PolkachuDirectory {
    async fn fetch_candidates(&self, network: &str) -> Result<Vec<PeerCandidate>, DirectoryError> {
        self.ensure_supported(network).await?;

        let live = self.fetch_live_peers(network).await?;
        let candidates = parse_peer_list(&live.live_peers);
        tracing::debug!(
            "Directory returned {} live peers for {} ({} usable)",
            live.live_peers.len(),
            live.network,
            candidates.len()
        );
        Ok(candidates)
    }
}

fn unknown_network(network: &str, suggestions: Vec<String>) -> DirectoryError {
    DirectoryError::UnknownNetwork {
        network: network.to_string(),
        suggestions,
    }
}

/// Parse `node_id@ip:port` entries, dropping malformed and local addresses
pub fn parse_peer_list(peers: &[String]) -> Vec<PeerCandidate> {
    peers
        .iter()
        .filter_map(|peer_str| {
            let peer_str = peer_str.trim();
            if peer_str.is_empty() {
                return None;
            }
            if peer_str.contains("localhost") {
                tracing::info!("Skipping {}: invalid peer", peer_str);
                return None;
            }

            match peer_str.parse::<PeerCandidate>() {
                Ok(peer) if is_invalid_address(&peer.ip) => {
                    tracing::info!("Skipping {}: invalid peer", peer_str);
                    None
                }
                Ok(peer) => Some(peer),
                Err(e) => {
                    tracing::debug!("🚫 {}", e);
                    None
                }
            }
        })
        .collect()
}

/// Loopback and unspecified addresses can never be remote peers
fn is_invalid_address(ip: &IpAddr) -> bool {
    ip.is_loopback() || ip.is_unspecified()
}

/// Names from `options` that look like `word`, best first.
pub fn close_matches(word: &str, options: &[String], n: usize, cutoff: f64) -> Vec<String> {
    let mut scored: Vec<(f64, &String)> = options
        .iter()
        .map(|option| (similarity(word, option), option))
        .filter(|(score, _)| *score >= cutoff)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored.into_iter().take(n).map(|(_, s)| s.clone()).collect()
}

/// 1.0 for identical strings, falling towards 0.0 with edit distance
fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    1.0 - prev[b.len()] as f64 / longest as f64
}
