use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Search failed: {0}")]
    Search(#[from] SearchError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid search criteria: {0}")]
    Criteria(#[from] CriteriaError),

    #[error("search.concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("logging.format must be \"pretty\" or \"json\", got \"{0}\"")]
    UnknownLogFormat(String),

    #[error("logging.output must be \"stderr\" or \"file\", got \"{0}\"")]
    UnknownLogOutput(String),
}

/// Rejected construction of [`crate::types::SearchCriteria`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CriteriaError {
    #[error("at least one target country is required")]
    NoTargetCountries,

    #[error("'{0}' is not a two-letter country code")]
    InvalidCountryCode(String),

    #[error("desired count must be at least 1")]
    ZeroDesiredCount,

    #[error("max attempts must be at least 1")]
    ZeroMaxAttempts,
}

/// Failures of a single directory fetch. The variant decides the retry policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("network '{network}' is not known to the directory{}", did_you_mean(.suggestions))]
    UnknownNetwork {
        network: String,
        suggestions: Vec<String>,
    },

    #[error("live peers service is not available for {network}")]
    ServiceUnavailable { network: String },

    #[error("directory request failed: {0}")]
    Transient(String),
}

/// A directory entry that is not `node_id@ip:port`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid peer endpoint '{0}'")]
pub struct PeerParseError(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeoError {
    #[error("geolocation lookup for {ip} timed out")]
    Timeout { ip: IpAddr },

    #[error("geolocation lookup failed: {0}")]
    Lookup(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("{addr} unreachable: {reason}")]
    Unreachable { addr: SocketAddr, reason: String },
}

/// Errors that end a search without a result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("the network '{network}' is not supported by the directory{}", did_you_mean(.suggestions))]
    InvalidNetwork {
        network: String,
        suggestions: Vec<String>,
    },

    #[error("live peers service not available for {network}")]
    ServiceUnavailable { network: String },
}

fn did_you_mean(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(". Did you mean {}?", suggestions.join(", "))
    }
}
