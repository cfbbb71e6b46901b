//! Core data model shared by the directory adapters, the evaluator and the
//! acquisition loop.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CriteriaError, PeerParseError};

/// Two-letter ISO country code, stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CountryCode {
    type Err = CriteriaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CriteriaError::InvalidCountryCode(s.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }
}

impl TryFrom<String> for CountryCode {
    type Error = CriteriaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a comma separated list such as `"CA, us,DE"`.
pub fn parse_country_list(list: &str) -> Result<BTreeSet<CountryCode>, CriteriaError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(CountryCode::from_str)
        .collect()
}

/// A peer address as handed out by the directory, in `node_id@ip:port` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerCandidate {
    pub id: String,
    pub ip: IpAddr,
    pub port: u16,
}

impl PeerCandidate {
    pub fn new(id: impl Into<String>, ip: IpAddr, port: u16) -> Self {
        Self {
            id: id.into(),
            ip,
            port,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl fmt::Display for PeerCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SocketAddr brackets IPv6 hosts
        write!(f, "{}@{}", self.id, self.socket_addr())
    }
}

impl FromStr for PeerCandidate {
    type Err = PeerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || PeerParseError(s.to_string());

        let (id, address) = s.split_once('@').ok_or_else(invalid)?;
        if id.is_empty() {
            return Err(invalid());
        }
        let addr: SocketAddr = address.parse().map_err(|_| invalid())?;

        Ok(Self::new(id, addr.ip(), addr.port()))
    }
}

/// One candidate enriched with what a single attempt measured about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAssessment {
    pub candidate: PeerCandidate,
    pub country: Option<CountryCode>,
    pub latency: Option<Duration>,
}

impl PeerAssessment {
    pub fn new(candidate: PeerCandidate) -> Self {
        Self {
            candidate,
            country: None,
            latency: None,
        }
    }

    pub fn with_country(mut self, country: Option<CountryCode>) -> Self {
        self.country = country;
        self
    }

    pub fn with_latency(mut self, latency: Option<Duration>) -> Self {
        self.latency = latency;
        self
    }
}

/// What the caller is looking for. Validated on construction and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriteria {
    target_countries: BTreeSet<CountryCode>,
    max_latency: Duration,
    desired_count: usize,
    max_attempts: u32,
}

impl SearchCriteria {
    pub fn new(
        target_countries: impl IntoIterator<Item = CountryCode>,
        max_latency: Duration,
        desired_count: usize,
        max_attempts: u32,
    ) -> Result<Self, CriteriaError> {
        let target_countries: BTreeSet<_> = target_countries.into_iter().collect();
        if target_countries.is_empty() {
            return Err(CriteriaError::NoTargetCountries);
        }
        if desired_count == 0 {
            return Err(CriteriaError::ZeroDesiredCount);
        }
        if max_attempts == 0 {
            return Err(CriteriaError::ZeroMaxAttempts);
        }
        Ok(Self {
            target_countries,
            max_latency,
            desired_count,
            max_attempts,
        })
    }

    pub fn target_countries(&self) -> &BTreeSet<CountryCode> {
        &self.target_countries
    }

    pub fn is_target_country(&self, country: &CountryCode) -> bool {
        self.target_countries.contains(country)
    }

    pub fn max_latency(&self) -> Duration {
        self.max_latency
    }

    pub fn desired_count(&self) -> usize {
        self.desired_count
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Terminal state of a search that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    /// The desired count was reached.
    Succeeded,
    /// The attempt budget ran out first. The result may be empty.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Accepted peers in acceptance order.
    pub peers: Vec<PeerCandidate>,
    pub attempts: u32,
    pub status: SearchStatus,
}

impl SearchResult {
    pub fn target_reached(&self) -> bool {
        self.status == SearchStatus::Succeeded
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_country_code_normalizes_case() {
        let code: CountryCode = " ca ".parse().unwrap();
        assert_eq!(code.as_str(), "CA");
    }

    #[test]
    fn test_country_code_rejects_bad_input() {
        assert!("USA".parse::<CountryCode>().is_err());
        assert!("1A".parse::<CountryCode>().is_err());
        assert!("".parse::<CountryCode>().is_err());
    }

    #[test]
    fn test_parse_country_list() {
        let set = parse_country_list("CA, us,,DE").unwrap();
        let codes: Vec<_> = set.iter().map(CountryCode::as_str).collect();
        assert_eq!(codes, vec!["CA", "DE", "US"]);
    }

    #[test]
    fn test_peer_candidate_parse_v4() {
        let peer: PeerCandidate = "8a675a29f7ef@1.2.3.4:26656".parse().unwrap();
        assert_eq!(peer.id, "8a675a29f7ef");
        assert_eq!(peer.ip, IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)));
        assert_eq!(peer.port, 26656);
        assert_eq!(peer.to_string(), "8a675a29f7ef@1.2.3.4:26656");
    }

    #[test]
    fn test_peer_candidate_parse_v6() {
        let peer: PeerCandidate = "abc@[2001:db8::1]:26656".parse().unwrap();
        assert!(peer.ip.is_ipv6());
        assert_eq!(peer.to_string(), "abc@[2001:db8::1]:26656");
    }

    #[test]
    fn test_peer_candidate_parse_rejects_malformed() {
        assert!("1.2.3.4:26656".parse::<PeerCandidate>().is_err());
        assert!("@1.2.3.4:26656".parse::<PeerCandidate>().is_err());
        assert!("node1@123.456.789.123:8080".parse::<PeerCandidate>().is_err());
        assert!("node1@1.2.3.4".parse::<PeerCandidate>().is_err());

        let err = " garbage ".parse::<PeerCandidate>().unwrap_err();
        assert_eq!(err, PeerParseError("garbage".to_string()));
        assert_eq!(err.to_string(), "invalid peer endpoint 'garbage'");
    }

    #[test]
    fn test_criteria_validation() {
        let us: CountryCode = "US".parse().unwrap();
        let ms = Duration::from_millis(50);

        assert_eq!(
            SearchCriteria::new(Vec::new(), ms, 1, 1),
            Err(CriteriaError::NoTargetCountries)
        );
        assert_eq!(
            SearchCriteria::new(vec![us.clone()], ms, 0, 1),
            Err(CriteriaError::ZeroDesiredCount)
        );
        assert_eq!(
            SearchCriteria::new(vec![us.clone()], ms, 1, 0),
            Err(CriteriaError::ZeroMaxAttempts)
        );

        let criteria = SearchCriteria::new(vec![us.clone()], ms, 3, 2).unwrap();
        assert!(criteria.is_target_country(&us));
        assert_eq!(criteria.desired_count(), 3);
        assert_eq!(criteria.max_attempts(), 2);
    }

    #[test]
    fn test_search_result_serializes_status_lowercase() {
        let result = SearchResult {
            peers: vec![],
            attempts: 5,
            status: SearchStatus::Partial,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "partial");
        assert!(!result.target_reached());
    }
}
