//! Country lookup for peer IPs via the ipinfo.io API.

use std::net::IpAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, GeoError};
use crate::types::CountryCode;

pub const DEFAULT_GEOLOCATION_URL: &str = "https://ipinfo.io";
pub const ACCESS_TOKEN_ENV: &str = "IPINFO_ACCESS_TOKEN";

#[async_trait::async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve_country(&self, ip: IpAddr) -> Result<CountryCode, GeoError>;
}

#[derive(Debug, Deserialize)]
struct IpDetails {
    #[serde(default)]
    country: Option<String>,
    /// Set for private and reserved ranges, which carry no location
    #[serde(default)]
    bogon: bool,
}

pub struct IpInfoResolver {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl IpInfoResolver {
    pub fn new(
        base_url: impl Into<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.filter(|t| !t.is_empty()),
        })
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }
}

#[async_trait::async_trait]
impl GeoResolver for IpInfoResolver {
    async fn resolve_country(&self, ip: IpAddr) -> Result<CountryCode, GeoError> {
        let url = format!("{}/{}/json", self.base_url, ip);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.access_token {
            request = request.query(&[("token", token)]);
        }

        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                GeoError::Timeout { ip }
            } else {
                GeoError::Lookup(format!("{}: {}", ip, e))
            }
        };

        let details: IpDetails = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(map_err)?
            .json()
            .await
            .map_err(map_err)?;

        if details.bogon {
            return Err(GeoError::Lookup(format!("{} is a bogon address", ip)));
        }

        let country = details
            .country
            .ok_or_else(|| GeoError::Lookup(format!("no country for {}", ip)))?;

        country
            .parse()
            .map_err(|e| GeoError::Lookup(format!("{}: {}", ip, e)))
    }
}
