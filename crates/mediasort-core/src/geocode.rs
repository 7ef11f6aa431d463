use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Best-effort place label for a coordinate. `None` means "no label", never an error.
pub trait Geocoder: Send + Sync {
    fn locate(&self, latitude: f64, longitude: f64) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LocationMode {
    /// No location folder
    #[default]
    Off,
    /// Rounded coordinates, computed offline
    Coords,
    /// Reverse geocoding through OpenStreetMap Nominatim
    Nominatim,
}

pub fn build_geocoder(mode: LocationMode) -> Option<Box<dyn Geocoder>> {
    match mode {
        LocationMode::Off => None,
        LocationMode::Coords => Some(Box::new(CoordinateLabel)),
        LocationMode::Nominatim => Some(Box::new(Nominatim::new())),
    }
}

/// Labels a coordinate as e.g. `48.86N 2.29E`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinateLabel;

impl Geocoder for CoordinateLabel {
    fn locate(&self, latitude: f64, longitude: f64) -> Option<String> {
        let ns = if latitude < 0.0 { 'S' } else { 'N' };
        let ew = if longitude < 0.0 { 'W' } else { 'E' };
        Some(format!(
            "{:.2}{} {:.2}{}",
            latitude.abs(),
            ns,
            longitude.abs(),
            ew
        ))
    }
}

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/reverse";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct ReverseResponse {
    address: Option<Address>,
}

#[derive(Deserialize)]
struct Address {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    county: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

impl Address {
    fn label(self) -> Option<String> {
        let place = self
            .city
            .or(self.town)
            .or(self.village)
            .or(self.municipality)
            .or(self.county)
            .or(self.state);
        match (place, self.country) {
            (Some(p), Some(c)) => Some(format!("{}, {}", p, c)),
            (Some(p), None) => Some(p),
            (None, c) => c,
        }
    }
}

/// Reverse geocoding over HTTP. Lookups are cached per ~1km grid cell so a
/// burst of photos from one place costs one request.
pub struct Nominatim {
    agent: ureq::Agent,
    endpoint: String,
    cache: Mutex<HashMap<(i64, i64), Option<String>>>,
}

impl Default for Nominatim {
    fn default() -> Self {
        Self::new()
    }
}

impl Nominatim {
    pub fn new() -> Self {
        Self::with_endpoint(NOMINATIM_URL)
    }

    pub fn with_endpoint(endpoint: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .user_agent(concat!("mediasort/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            endpoint: endpoint.to_string(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn lookup(&self, latitude: f64, longitude: f64) -> anyhow::Result<Option<String>> {
        let response: ReverseResponse = self
            .agent
            .get(&self.endpoint)
            .query("format", "jsonv2")
            .query("zoom", "10")
            .query("lat", &format!("{:.5}", latitude))
            .query("lon", &format!("{:.5}", longitude))
            .call()?
            .into_json()?;
        Ok(response.address.and_then(Address::label))
    }
}

impl Geocoder for Nominatim {
    fn locate(&self, latitude: f64, longitude: f64) -> Option<String> {
        let key = (
            (latitude * 100.0).round() as i64,
            (longitude * 100.0).round() as i64,
        );
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }

        let label = match self.lookup(latitude, longitude) {
            Ok(label) => label,
            Err(e) => {
                warn!("Reverse geocoding {latitude:.5},{longitude:.5} failed: {e}");
                // Failures are not cached, a later file may succeed
                return None;
            }
        };
        debug!("Reverse geocoded {latitude:.5},{longitude:.5} -> {label:?}");

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, label.clone());
        }
        label
    }
}
