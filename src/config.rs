//! Server configuration, read from the environment (and `.env` via dotenvy).

use anyhow::{Context, Result, bail};
use std::path::PathBuf;

use crate::fetch::BasicClient;
use crate::fetch::auth::{ApiKey, UrlParam};
use crate::schedule::{FeedEndpoint, FeedSource, GtfsFeedClient};

pub const DEFAULT_PORT: u16 = 3001;
pub const DATAMINE_URL: &str = "http://datamine.mta.info/mta_esi.php";
pub const GATEWAY_URL: &str = "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds";

/// How the API key reaches the feed provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedAuth {
    /// `key=` query parameter on the datamine endpoint.
    Param,
    /// `x-api-key` header on the API gateway.
    Header,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub api_key: String,
    pub feed_auth: FeedAuth,
    pub feed_base_url: String,
    pub stops_path: PathBuf,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = get("MTA_API_KEY").context("MTA_API_KEY must be set")?;

        let feed_auth = match get("FEED_AUTH").as_deref() {
            None | Some("param") => FeedAuth::Param,
            Some("header") => FeedAuth::Header,
            Some(other) => bail!("FEED_AUTH must be 'param' or 'header', got '{other}'"),
        };

        let default_base_url = match feed_auth {
            FeedAuth::Param => DATAMINE_URL,
            FeedAuth::Header => GATEWAY_URL,
        };
        let feed_base_url = get("FEED_BASE_URL").unwrap_or_else(|| default_base_url.to_string());

        let port = match get("PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("PORT is not a valid port: '{raw}'"))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            api_key,
            feed_auth,
            feed_base_url,
            stops_path: get("STOPS_PATH")
                .unwrap_or_else(|| "data/stops.txt".to_string())
                .into(),
            port,
        })
    }

    /// Builds the live feed client with credentials attached.
    pub fn feed_source(&self) -> Result<Box<dyn FeedSource>> {
        let base_url = self.feed_base_url.clone();
        Ok(match self.feed_auth {
            FeedAuth::Param => Box::new(GtfsFeedClient::new(
                UrlParam::datamine(BasicClient::new()?, self.api_key.clone()),
                FeedEndpoint::Datamine { base_url },
            )),
            FeedAuth::Header => Box::new(GtfsFeedClient::new(
                ApiKey::mta(BasicClient::new()?, &self.api_key)?,
                FeedEndpoint::Gateway { base_url },
            )),
        })
    }
}
