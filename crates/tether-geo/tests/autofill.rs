//! Debounced coordinate autofill under virtual time (700 ms quiet window).

mod support;

use std::sync::Arc;
use std::time::Duration;

use support::{ScriptedGeocoder, hit, miss};
use tether_core::config::GeocodeConfig;
use tether_geo::{
    AddressFields, Advisory, CandidateResolver, Coordinate, CoordinateAutofill, GeoFence,
};

const QUIET: Duration = Duration::from_millis(700);

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn city(name: &str) -> AddressFields {
    AddressFields {
        city: Some(name.into()),
        ..AddressFields::default()
    }
}

fn autofill(geocoder: &Arc<ScriptedGeocoder>) -> CoordinateAutofill<&'static str, ScriptedGeocoder> {
    CoordinateAutofill::new(
        CandidateResolver::new(Arc::clone(geocoder), GeoFence::PHILIPPINES, "Philippines"),
        QUIET,
    )
}

const MARIKINA: Coordinate = Coordinate::new(14.6507, 121.1029);
const CEBU: Coordinate = Coordinate::new(10.3157, 123.8854);

#[tokio::test(start_paused = true)]
async fn lookup_waits_for_quiet_window_then_sets_coordinates() {
    let geocoder = Arc::new(
        ScriptedGeocoder::new(vec![miss(), miss(), hit(MARIKINA.lat, MARIKINA.lng)])
            .with_latency(ms(200)),
    );
    let autofill = autofill(&geocoder);
    let mut events = autofill.subscribe();

    assert!(autofill.address_changed("crime-form", city("Marikina")));
    tokio::time::sleep(ms(699)).await;
    assert!(geocoder.queries().is_empty());
    assert!(autofill.is_scheduled(&"crime-form"));

    tokio::time::sleep(ms(2)).await;
    assert_eq!(autofill.advisory(&"crime-form"), Some(Advisory::Finding));
    assert_eq!(
        autofill.advisory(&"crime-form").map(Advisory::message),
        Some("Finding coordinates…")
    );

    tokio::time::sleep(ms(700)).await;
    assert_eq!(autofill.coordinate(&"crime-form"), Some(MARIKINA));
    assert_eq!(autofill.advisory(&"crime-form"), Some(Advisory::CoordinatesSet));
    assert_eq!(geocoder.queries().len(), 3);

    let advisories: Vec<Option<Advisory>> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|event| event.advisory)
        .collect();
    assert_eq!(
        advisories,
        vec![Some(Advisory::Finding), Some(Advisory::CoordinatesSet)]
    );
}

#[tokio::test(start_paused = true)]
async fn typing_burst_issues_a_single_cascade() {
    let geocoder = Arc::new(ScriptedGeocoder::new(vec![hit(CEBU.lat, CEBU.lng)]));
    let autofill = autofill(&geocoder);

    for partial in ["C", "Ce", "Ceb", "Cebu", "Cebu City"] {
        autofill.address_changed("crime-form", city(partial));
        tokio::time::sleep(ms(150)).await;
    }
    tokio::time::sleep(QUIET).await;

    let queries = geocoder.queries();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].to_string().contains("Cebu City"));
    assert_eq!(autofill.coordinate(&"crime-form"), Some(CEBU));
}

#[tokio::test(start_paused = true)]
async fn newer_address_supersedes_running_lookup() {
    let geocoder = Arc::new(
        ScriptedGeocoder::new(vec![
            hit(MARIKINA.lat, MARIKINA.lng),
            hit(CEBU.lat, CEBU.lng),
        ])
        .with_latency(ms(1000)),
    );
    let autofill = autofill(&geocoder);

    autofill.address_changed("crime-form", city("Marikina"));
    // t = 800: the Marikina lookup is running until t = 1700. The edit
    // aborts it on the spot.
    tokio::time::sleep(ms(800)).await;
    autofill.address_changed("crime-form", city("Cebu City"));
    assert_eq!(autofill.advisory(&"crime-form"), None);

    // t = 1800: the Cebu lookup began at 1500.
    tokio::time::sleep(ms(1000)).await;
    assert_eq!(autofill.coordinate(&"crime-form"), None);
    assert_eq!(autofill.advisory(&"crime-form"), Some(Advisory::Finding));

    tokio::time::sleep(ms(1000)).await;
    assert_eq!(autofill.coordinate(&"crime-form"), Some(CEBU));
    // Two edits and two lookups.
    assert_eq!(autofill.generation(&"crime-form"), 4);
}

#[tokio::test(start_paused = true)]
async fn lookup_for_replaced_address_never_lands() {
    // Marikina: step 1 hits. Cebu City: every step misses.
    let geocoder = Arc::new(
        ScriptedGeocoder::new(vec![hit(MARIKINA.lat, MARIKINA.lng)]).with_latency(ms(200)),
    );
    let autofill = autofill(&geocoder);

    autofill.address_changed("crime-form", city("Marikina"));
    // t = 800: the Marikina lookup runs from 700 to 900.
    tokio::time::sleep(ms(800)).await;
    autofill.address_changed("crime-form", city("Cebu City"));

    // t = 1000: past the old lookup's finish, inside the new quiet window.
    tokio::time::sleep(ms(200)).await;
    assert_eq!(autofill.coordinate(&"crime-form"), None);
    assert!(autofill.is_scheduled(&"crime-form"));

    tokio::time::sleep(ms(3000)).await;
    assert_eq!(autofill.coordinate(&"crime-form"), None);
    assert_eq!(autofill.advisory(&"crime-form"), Some(Advisory::NoMatches));
}

#[tokio::test(start_paused = true)]
async fn clearing_the_address_aborts_running_lookup() {
    let geocoder = Arc::new(
        ScriptedGeocoder::new(vec![hit(MARIKINA.lat, MARIKINA.lng)]).with_latency(ms(500)),
    );
    let autofill = autofill(&geocoder);

    autofill.address_changed("crime-form", city("Marikina"));
    tokio::time::sleep(ms(800)).await;
    assert_eq!(autofill.advisory(&"crime-form"), Some(Advisory::Finding));

    assert!(!autofill.address_changed("crime-form", AddressFields::default()));
    assert_eq!(autofill.advisory(&"crime-form"), None);

    tokio::time::sleep(ms(2000)).await;
    assert_eq!(autofill.coordinate(&"crime-form"), None);
    assert_eq!(geocoder.queries().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn quiet_window_comes_from_geocode_config() {
    let geocoder = Arc::new(ScriptedGeocoder::new(vec![hit(CEBU.lat, CEBU.lng)]));
    let config = GeocodeConfig {
        quiet_ms: 300,
        ..GeocodeConfig::default()
    };
    let autofill: CoordinateAutofill<&'static str, ScriptedGeocoder> =
        CoordinateAutofill::from_config(
            CandidateResolver::new(Arc::clone(&geocoder), GeoFence::PHILIPPINES, "Philippines"),
            &config,
        );
    assert_eq!(autofill.quiet(), ms(300));

    autofill.address_changed("crime-form", city("Cebu City"));
    tokio::time::sleep(ms(299)).await;
    assert!(geocoder.queries().is_empty());
    tokio::time::sleep(ms(2)).await;
    assert_eq!(autofill.coordinate(&"crime-form"), Some(CEBU));
}

#[tokio::test(start_paused = true)]
async fn marker_placement_wins_over_running_lookup() {
    let geocoder = Arc::new(
        ScriptedGeocoder::new(vec![hit(MARIKINA.lat, MARIKINA.lng)]).with_latency(ms(1000)),
    );
    let autofill = autofill(&geocoder);

    autofill.address_changed("crime-form", city("Marikina"));
    tokio::time::sleep(ms(900)).await;
    assert!(autofill.place_marker("crime-form", CEBU));

    tokio::time::sleep(ms(5000)).await;
    assert_eq!(autofill.coordinate(&"crime-form"), Some(CEBU));
    assert_eq!(autofill.advisory(&"crime-form"), None);
}

#[tokio::test(start_paused = true)]
async fn marker_outside_fence_is_ignored() {
    let geocoder = Arc::new(ScriptedGeocoder::new(vec![]));
    let autofill = autofill(&geocoder);
    autofill.seed(&"crime-form", MARIKINA);

    assert!(!autofill.place_marker("crime-form", Coordinate::new(35.6762, 139.6503)));
    assert_eq!(autofill.coordinate(&"crime-form"), Some(MARIKINA));
}

#[tokio::test(start_paused = true)]
async fn exhaustion_leaves_existing_coordinates_untouched() {
    let geocoder = Arc::new(ScriptedGeocoder::new(vec![]));
    let autofill = autofill(&geocoder);
    autofill.seed(&"crime-form", MARIKINA);

    autofill.address_changed("crime-form", city("Nowhere"));
    tokio::time::sleep(ms(800)).await;

    assert_eq!(autofill.coordinate(&"crime-form"), Some(MARIKINA));
    assert_eq!(autofill.advisory(&"crime-form"), Some(Advisory::NoMatches));
    assert_eq!(geocoder.queries().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn blank_address_drops_pending_lookup() {
    let geocoder = Arc::new(ScriptedGeocoder::new(vec![]));
    let autofill = autofill(&geocoder);

    assert!(autofill.address_changed("crime-form", city("Marikina")));
    tokio::time::sleep(ms(300)).await;
    assert!(!autofill.address_changed("crime-form", AddressFields::default()));
    assert!(!autofill.is_scheduled(&"crime-form"));

    tokio::time::sleep(ms(2000)).await;
    assert!(geocoder.queries().is_empty());
    assert_eq!(autofill.advisory(&"crime-form"), None);
}

#[tokio::test(start_paused = true)]
async fn owners_resolve_independently() {
    let geocoder = Arc::new(ScriptedGeocoder::new(vec![
        hit(MARIKINA.lat, MARIKINA.lng),
        hit(CEBU.lat, CEBU.lng),
    ]));
    let autofill = autofill(&geocoder);

    autofill.address_changed("crime-form", city("Marikina"));
    tokio::time::sleep(ms(100)).await;
    autofill.address_changed("suspect-form", city("Cebu City"));
    tokio::time::sleep(ms(1000)).await;

    assert_eq!(autofill.coordinate(&"crime-form"), Some(MARIKINA));
    assert_eq!(autofill.coordinate(&"suspect-form"), Some(CEBU));
}

#[tokio::test(start_paused = true)]
async fn shutdown_forgets_everything() {
    let geocoder = Arc::new(ScriptedGeocoder::new(vec![]).with_latency(ms(500)));
    let autofill = autofill(&geocoder);
    autofill.address_changed("crime-form", city("Marikina"));
    tokio::time::sleep(ms(800)).await;

    autofill.shutdown();
    tokio::time::sleep(ms(5000)).await;
    assert_eq!(autofill.coordinate(&"crime-form"), None);
    assert_eq!(autofill.advisory(&"crime-form"), None);
    assert_eq!(geocoder.queries().len(), 1);
}
