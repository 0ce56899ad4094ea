//! Nominatim search client.
//!
//! ureq is blocking, so each lookup runs on tokio's blocking pool. An
//! aborted resolution leaves the blocking call to finish on its own; its
//! result is dropped.

use async_trait::async_trait;
use tether_core::config::GeocodeConfig;
use tracing::debug;

use crate::fence::GeoFence;
use crate::geocoder::{Candidate, Geocoder, LookupError};
use crate::strategy::LookupQuery;

#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    endpoint: String,
    country_codes: String,
    accept_language: String,
    user_agent: String,
    agent: ureq::Agent,
}

impl NominatimGeocoder {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        let defaults = GeocodeConfig::default();
        Self {
            endpoint: endpoint.into(),
            country_codes: defaults.country_codes,
            accept_language: defaults.accept_language,
            user_agent: defaults.user_agent,
            agent: ureq::agent(),
        }
    }

    #[must_use]
    pub fn from_config(config: &GeocodeConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            country_codes: config.country_codes.clone(),
            accept_language: config.accept_language.clone(),
            user_agent: config.user_agent.clone(),
            agent: ureq::agent(),
        }
    }

    /// `{endpoint}/search`, tolerating a trailing slash on the endpoint.
    #[must_use]
    pub fn search_url(&self) -> String {
        format!("{}/search", self.endpoint.trim_end_matches('/'))
    }

    /// Query-string pairs for one lookup: the fixed bounded-search
    /// parameters followed by the query fields.
    #[must_use]
    pub fn params(&self, query: &LookupQuery, fence: &GeoFence) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("format", "jsonv2".to_string()),
            ("addressdetails", "1".to_string()),
            ("limit", "1".to_string()),
            ("countrycodes", self.country_codes.clone()),
            ("bounded", "1".to_string()),
            ("viewbox", fence.viewbox()),
        ];
        match query {
            LookupQuery::Structured(fields) => params.extend(
                fields
                    .pairs()
                    .into_iter()
                    .map(|(name, value)| (name, value.to_string())),
            ),
            LookupQuery::FreeText(q) => params.push(("q", q.clone())),
        }
        params
    }

    fn fetch(
        agent: &ureq::Agent,
        url: &str,
        accept_language: &str,
        user_agent: &str,
        params: &[(&'static str, String)],
    ) -> Result<Option<Candidate>, LookupError> {
        let mut request = agent
            .get(url)
            .set("Accept-Language", accept_language)
            .set("User-Agent", user_agent);
        for (name, value) in params {
            request = request.query(name, value);
        }

        let response = request.call().map_err(|err| match err {
            ureq::Error::Status(status, _) => LookupError::Status(status),
            other => LookupError::Transport(other.to_string()),
        })?;

        let hits = response
            .into_json::<Vec<Candidate>>()
            .map_err(|err| LookupError::Decode(err.to_string()))?;
        Ok(hits.into_iter().next())
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn lookup(
        &self,
        query: &LookupQuery,
        fence: &GeoFence,
    ) -> Result<Option<Candidate>, LookupError> {
        let params = self.params(query, fence);
        let url = self.search_url();
        let agent = self.agent.clone();
        let accept_language = self.accept_language.clone();
        let user_agent = self.user_agent.clone();

        debug!(%url, %query, "nominatim lookup");
        tokio::task::spawn_blocking(move || {
            Self::fetch(&agent, &url, &accept_language, &user_agent, &params)
        })
        .await
        .map_err(|err| LookupError::Transport(format!("lookup task failed: {err}")))?
    }
}
