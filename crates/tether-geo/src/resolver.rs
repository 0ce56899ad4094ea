//! Cascade resolution: first non-empty, in-fence candidate wins.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::address::AddressFields;
use crate::advisory::Advisory;
use crate::fence::{Coordinate, GeoFence};
use crate::geocoder::Geocoder;
use crate::strategy::Strategy;

/// What one cascade step produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Accepted { coordinate: Coordinate },
    Empty,
    /// Unparsable or non-finite coordinates.
    Garbled,
    OutOfFence { coordinate: Coordinate },
    /// Transport, status or decode failure; treated as empty.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub strategy: Strategy,
    pub query: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Result of one pass over the cascade.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Resolution {
    pub steps: Vec<StepRecord>,
}

impl Resolution {
    #[must_use]
    pub fn coordinate(&self) -> Option<Coordinate> {
        self.steps.iter().find_map(|step| match step.outcome {
            StepOutcome::Accepted { coordinate } => Some(coordinate),
            _ => None,
        })
    }

    /// Strategy that produced the accepted coordinate.
    #[must_use]
    pub fn accepted_by(&self) -> Option<Strategy> {
        self.steps
            .iter()
            .find(|step| matches!(step.outcome, StepOutcome::Accepted { .. }))
            .map(|step| step.strategy)
    }

    #[must_use]
    pub fn out_of_fence_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step.outcome, StepOutcome::OutOfFence { .. }))
            .count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step.outcome, StepOutcome::Failed { .. }))
            .count()
    }

    /// Message for the location form once this resolution is applied.
    #[must_use]
    pub fn advisory(&self) -> Advisory {
        if self.coordinate().is_some() {
            Advisory::CoordinatesSet
        } else if self.out_of_fence_count() > 0 {
            Advisory::OutsideFence
        } else {
            Advisory::NoMatches
        }
    }
}

/// Runs the lookup cascade against a [`Geocoder`].
#[derive(Debug)]
pub struct CandidateResolver<G: ?Sized> {
    geocoder: Arc<G>,
    fence: GeoFence,
    country: String,
}

impl<G: Geocoder + ?Sized> CandidateResolver<G> {
    #[must_use]
    pub fn new(geocoder: Arc<G>, fence: GeoFence, country: impl Into<String>) -> Self {
        Self {
            geocoder,
            fence,
            country: country.into(),
        }
    }

    #[must_use]
    pub const fn fence(&self) -> &GeoFence {
        &self.fence
    }

    /// Run the full cascade.
    pub async fn resolve(&self, fields: &AddressFields) -> Resolution {
        self.resolve_with(&Strategy::CASCADE, fields).await
    }

    /// Run `strategies` in order, stopping at the first accepted candidate.
    pub async fn resolve_with(&self, strategies: &[Strategy], fields: &AddressFields) -> Resolution {
        let mut resolution = Resolution::default();

        for &strategy in strategies {
            let query = strategy.build(fields, &self.country);
            let outcome = match self.geocoder.lookup(&query, &self.fence).await {
                Ok(None) => StepOutcome::Empty,
                Ok(Some(candidate)) => match candidate.coordinate() {
                    None => StepOutcome::Garbled,
                    Some(coordinate) if self.fence.contains(coordinate) => {
                        StepOutcome::Accepted { coordinate }
                    }
                    Some(coordinate) => StepOutcome::OutOfFence { coordinate },
                },
                Err(err) => {
                    warn!(step = strategy.step(), %strategy, code = %err.code(), error = %err, "lookup step failed");
                    StepOutcome::Failed {
                        error: err.to_string(),
                    }
                }
            };
            debug!(step = strategy.step(), %strategy, %query, ?outcome, "lookup step");

            let accepted = matches!(outcome, StepOutcome::Accepted { .. });
            resolution.steps.push(StepRecord {
                strategy,
                query: query.to_string(),
                outcome,
            });
            if accepted {
                break;
            }
        }

        match resolution.coordinate() {
            Some(coordinate) => info!(%coordinate, strategy = ?resolution.accepted_by(), "coordinates resolved"),
            None => debug!(
                out_of_fence = resolution.out_of_fence_count(),
                failed = resolution.failed_count(),
                "cascade exhausted"
            ),
        }
        resolution
    }
}
