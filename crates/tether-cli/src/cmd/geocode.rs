//! `tether geocode`: run the fenced lookup cascade for one address.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use serde::Serialize;
use tether_core::ErrorCode;
use tether_core::config::load_project_config;
use tether_geo::{
    AddressFields, CandidateResolver, Coordinate, GeoFence, NominatimGeocoder, Resolution,
    StepOutcome, Strategy,
};
use tracing::info;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct GeocodeArgs {
    /// Street / house line.
    #[arg(long)]
    pub address_line: Option<String>,

    #[arg(long)]
    pub barangay: Option<String>,

    /// City or municipality.
    #[arg(long)]
    pub city: Option<String>,

    #[arg(long)]
    pub province: Option<String>,

    #[arg(long)]
    pub region: Option<String>,

    /// Override the configured geocoding endpoint.
    #[arg(long)]
    pub endpoint: Option<String>,
}

impl GeocodeArgs {
    fn fields(&self) -> AddressFields {
        AddressFields {
            address_line: self.address_line.clone(),
            barangay: self.barangay.clone(),
            city: self.city.clone(),
            province: self.province.clone(),
            region: self.region.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GeocodeOutput {
    coordinate: Option<Coordinate>,
    accepted_by: Option<Strategy>,
    advisory: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'static str>,
    #[serde(flatten)]
    resolution: Resolution,
}

/// Execute `tether geocode`.
///
/// # Errors
///
/// Returns an error if no address part is given or the project config is
/// invalid. Lookup failures are not errors; they show up as steps.
pub fn run_geocode(args: &GeocodeArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let fields = args.fields();
    if !fields.has_any() {
        bail!("give at least one of --address-line, --barangay, --city, --province, --region");
    }

    let mut config = load_project_config(project_root)?.geocode;
    if let Some(endpoint) = &args.endpoint {
        config.endpoint.clone_from(endpoint);
    }

    let resolver = CandidateResolver::new(
        Arc::new(NominatimGeocoder::from_config(&config)),
        GeoFence::from(&config.fence),
        config.country.clone(),
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to build runtime")?;
    let resolution = runtime.block_on(resolver.resolve(&fields));
    let advisory = resolution.advisory();
    info!(advisory = %advisory, steps = resolution.steps.len(), "geocode finished");

    let out = GeocodeOutput {
        coordinate: resolution.coordinate(),
        accepted_by: resolution.accepted_by(),
        advisory: advisory.message(),
        error_code: advisory.code().map(ErrorCode::code),
        hint: advisory.code().and_then(ErrorCode::hint),
        resolution,
    };

    render_mode(
        output,
        &out,
        |o, w| {
            match o.coordinate {
                Some(c) => writeln!(w, "lat={:.6} lng={:.6}", c.lat, c.lng)?,
                None => writeln!(w, "lat=- lng=-")?,
            }
            writeln!(w, "advisory={:?}", o.advisory)?;
            if let Some(code) = o.error_code {
                writeln!(w, "error_code={code}")?;
            }
            for step in &o.resolution.steps {
                writeln!(
                    w,
                    "step strategy={} outcome={}",
                    step.strategy.as_str(),
                    outcome_label(&step.outcome)
                )?;
            }
            Ok(())
        },
        |o, w| {
            pretty_section(w, "Geocode")?;
            pretty_kv(
                w,
                "Coordinates",
                o.coordinate.map_or_else(|| "none".to_string(), |c| c.to_string()),
            )?;
            if let Some(strategy) = o.accepted_by {
                pretty_kv(w, "Strategy", format!("{} ({})", strategy.step(), strategy.as_str()))?;
            }
            pretty_kv(w, "Advisory", o.advisory)?;
            if let (Some(code), Some(hint)) = (o.error_code, o.hint) {
                pretty_kv(w, "Hint", format!("{hint} ({code})"))?;
            }
            writeln!(w)?;
            pretty_section(w, "Cascade")?;
            for step in &o.resolution.steps {
                writeln!(
                    w,
                    "{}. {:<20} {:<13} {}",
                    step.strategy.step(),
                    step.strategy.as_str(),
                    outcome_label(&step.outcome),
                    step.query
                )?;
            }
            Ok(())
        },
    )?;
    Ok(())
}

const fn outcome_label(outcome: &StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::Accepted { .. } => "accepted",
        StepOutcome::Empty => "empty",
        StepOutcome::Garbled => "garbled",
        StepOutcome::OutOfFence { .. } => "out_of_fence",
        StepOutcome::Failed { .. } => "failed",
    }
}
