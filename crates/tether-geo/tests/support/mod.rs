//! Scripted geocoder shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tether_geo::{Candidate, GeoFence, Geocoder, LookupError, LookupQuery};

/// Answers lookups from a queue, in order; an empty queue answers "no hit".
pub struct ScriptedGeocoder {
    latency: Duration,
    replies: Mutex<VecDeque<Result<Option<Candidate>, LookupError>>>,
    queries: Mutex<Vec<LookupQuery>>,
}

impl ScriptedGeocoder {
    pub fn new(replies: Vec<Result<Option<Candidate>, LookupError>>) -> Self {
        Self {
            latency: Duration::ZERO,
            replies: Mutex::new(replies.into()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn queries(&self) -> Vec<LookupQuery> {
        self.queries.lock().expect("queries lock").clone()
    }
}

pub fn hit(lat: f64, lon: f64) -> Result<Option<Candidate>, LookupError> {
    Ok(Some(Candidate::new(lat, lon)))
}

pub fn miss() -> Result<Option<Candidate>, LookupError> {
    Ok(None)
}

#[async_trait]
impl Geocoder for ScriptedGeocoder {
    async fn lookup(
        &self,
        query: &LookupQuery,
        _fence: &GeoFence,
    ) -> Result<Option<Candidate>, LookupError> {
        self.queries
            .lock()
            .expect("queries lock")
            .push(query.clone());
        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or(Ok(None));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        reply
    }
}
