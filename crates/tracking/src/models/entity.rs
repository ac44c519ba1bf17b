//! Public models: what the feed hands in and what readers get back.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The current known state of one aircraft, as served to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEntity {
    /// ICAO 24-bit transponder address; the identity key.
    pub icao24: String,
    /// Group key used to partition queries.
    pub manufacturer: String,
    pub model: Option<String>,
    pub marker: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub velocity: Option<f64>,
    pub heading: Option<f64>,
    pub on_ground: bool,
    pub active: i64,
    /// When the aircraft itself last reported, according to the feed.
    #[serde(with = "time::serde::timestamp::option")]
    pub last_contact: Option<OffsetDateTime>,
    /// When the store last accepted a write for this aircraft.
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
}

/// One position/state record from the upstream feed.
///
/// Field names follow the feed's snake_case JSON. Anything the feed has not
/// fixed yet (position, motion) is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub icao24: String,
    pub manufacturer: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub velocity: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub on_ground: bool,
    /// Defaults to `1` when absent.
    #[serde(default)]
    pub active: Option<i64>,
    #[serde(default, with = "time::serde::timestamp::option")]
    pub last_contact: Option<OffsetDateTime>,
}
impl PositionUpdate {
    pub fn new(icao24: impl Into<String>, manufacturer: impl Into<String>) -> Self {
        Self {
            icao24: icao24.into(),
            manufacturer: manufacturer.into(),
            model: None,
            latitude: None,
            longitude: None,
            altitude: None,
            velocity: None,
            heading: None,
            on_ground: false,
            active: None,
            last_contact: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_position(mut self, latitude: f64, longitude: f64, altitude: Option<f64>) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self.altitude = altitude;
        self
    }

    pub fn with_motion(mut self, velocity: f64, heading: f64) -> Self {
        self.velocity = Some(velocity);
        self.heading = Some(heading);
        self
    }

    pub fn with_on_ground(mut self, on_ground: bool) -> Self {
        self.on_ground = on_ground;
        self
    }

    pub fn with_last_contact(mut self, last_contact: OffsetDateTime) -> Self {
        self.last_contact = Some(last_contact);
        self
    }

    /// Check the record before it is allowed anywhere near the database.
    ///
    /// Returns a short reason for the first problem found.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.icao24.trim().is_empty() {
            return Err("missing icao24");
        }
        if self.manufacturer.trim().is_empty() {
            return Err("missing manufacturer");
        }
        let finite = |v: Option<f64>| v.is_none_or(f64::is_finite);
        if ![self.latitude, self.longitude, self.altitude, self.velocity, self.heading].into_iter().all(finite) {
            return Err("non-finite number");
        }
        if self.latitude.is_some_and(|lat| !(-90.0..=90.0).contains(&lat)) {
            return Err("latitude out of range");
        }
        if self.longitude.is_some_and(|lon| !(-180.0..=180.0).contains(&lon)) {
            return Err("longitude out of range");
        }
        if self.heading.is_some_and(|hdg| !(0.0..=360.0).contains(&hdg)) {
            return Err("heading out of range");
        }
        if self.last_contact.is_some_and(|t| t.unix_timestamp() < 0) {
            return Err("last contact before epoch");
        }
        Ok(())
    }
}

/// Static reference data (from the aircraft registry) joined into upserts by
/// `icao24`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticAttributes {
    pub icao24: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub marker: Option<String>,
}
impl StaticAttributes {
    pub fn new(icao24: impl Into<String>) -> Self {
        Self { icao24: icao24.into(), ..Default::default() }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }
}

/// Per-group counts: every stored row, and the rows that are still live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub manufacturer: String,
    pub count: u64,
    pub active_count: u64,
}
