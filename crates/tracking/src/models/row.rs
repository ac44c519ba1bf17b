use crate::error::{Error, ErrorKind};
use crate::models::{GroupSummary, PositionUpdate, StaticAttributes, TrackedEntity};
use exn::ResultExt;
use time::OffsetDateTime;

const NANOS_PER_MILLI: i128 = 1_000_000;

/// Convert a timestamp into the millisecond resolution `last_seen` is stored at.
pub(crate) fn unix_millis(at: OffsetDateTime) -> crate::error::Result<i64> {
    i64::try_from(at.unix_timestamp_nanos().div_euclid(NANOS_PER_MILLI)).or_raise(|| ErrorKind::InvalidData("timestamp"))
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub(crate) struct EntityRow {
    pub(crate) icao24: String,
    pub(crate) manufacturer: String,
    pub(crate) model: Option<String>,
    pub(crate) marker: Option<String>,
    pub(crate) latitude: Option<f64>,
    pub(crate) longitude: Option<f64>,
    pub(crate) altitude: Option<f64>,
    pub(crate) velocity: Option<f64>,
    pub(crate) heading: Option<f64>,
    pub(crate) on_ground: bool,
    pub(crate) active: i64,
    pub(crate) last_contact: Option<i64>,
    pub(crate) last_seen: i64,
}
impl EntityRow {
    /// Build the row to write for a (validated) feed record.
    ///
    /// The marker always comes from the static record, so an aircraft that
    /// has lost its static record also loses its marker. The model falls back
    /// to the static record when the feed does not carry one.
    ///
    /// `last_seen` is left at zero; the store stamps it once it holds the
    /// writer lock.
    pub(crate) fn ingest(update: &PositionUpdate, attributes: Option<&StaticAttributes>) -> Self {
        Self {
            icao24: update.icao24.clone(),
            manufacturer: update.manufacturer.clone(),
            model: update.model.clone().or_else(|| attributes.and_then(|a| a.model.clone())),
            marker: attributes.and_then(|a| a.marker.clone()),
            latitude: update.latitude,
            longitude: update.longitude,
            altitude: update.altitude,
            velocity: update.velocity,
            heading: update.heading,
            on_ground: update.on_ground,
            active: update.active.unwrap_or(1),
            last_contact: update.last_contact.map(OffsetDateTime::unix_timestamp),
            last_seen: 0,
        }
    }
}
impl TryFrom<EntityRow> for TrackedEntity {
    type Error = Error;
    fn try_from(row: EntityRow) -> Result<Self, Self::Error> {
        Ok(Self {
            icao24: row.icao24,
            manufacturer: row.manufacturer,
            model: row.model,
            marker: row.marker,
            latitude: row.latitude,
            longitude: row.longitude,
            altitude: row.altitude,
            velocity: row.velocity,
            heading: row.heading,
            on_ground: row.on_ground,
            active: row.active,
            last_contact: row
                .last_contact
                .map(|t| OffsetDateTime::from_unix_timestamp(t).or_raise(|| ErrorKind::InvalidData("last contact")))
                .transpose()?,
            last_seen: OffsetDateTime::from_unix_timestamp_nanos(i128::from(row.last_seen) * NANOS_PER_MILLI)
                .or_raise(|| ErrorKind::InvalidData("last seen"))?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct GroupRow {
    manufacturer: String,
    count: i64,
    active_count: i64,
}
impl TryFrom<GroupRow> for GroupSummary {
    type Error = Error;
    fn try_from(row: GroupRow) -> Result<Self, Self::Error> {
        Ok(Self {
            manufacturer: row.manufacturer,
            count: u64::try_from(row.count).or_raise(|| ErrorKind::InvalidData("group count"))?,
            active_count: u64::try_from(row.active_count).or_raise(|| ErrorKind::InvalidData("active count"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_ingest_joins_static_attributes() {
        let update = PositionUpdate::new("a1b2c3", "Cessna");
        let attributes = StaticAttributes::new("a1b2c3").with_model("172 Skyhawk").with_marker("N172SP");
        let row = EntityRow::ingest(&update, Some(&attributes));
        assert_eq!(row.model.as_deref(), Some("172 Skyhawk"));
        assert_eq!(row.marker.as_deref(), Some("N172SP"));
        assert_eq!(row.active, 1);
    }

    #[test]
    fn test_ingest_prefers_feed_model() {
        let update = PositionUpdate::new("a1b2c3", "Cessna").with_model("182 Skylane");
        let attributes = StaticAttributes::new("a1b2c3").with_model("172 Skyhawk");
        let row = EntityRow::ingest(&update, Some(&attributes));
        assert_eq!(row.model.as_deref(), Some("182 Skylane"));
        assert_eq!(row.marker, None);
    }

    #[test]
    fn test_row_to_model() {
        let seen = datetime!(2025-06-01 12:00:00.250 UTC);
        let update = PositionUpdate::new("a1b2c3", "Cessna")
            .with_position(47.45, -122.31, None)
            .with_last_contact(datetime!(2025-06-01 11:59:58 UTC));
        let row = EntityRow { last_seen: unix_millis(seen).unwrap(), ..EntityRow::ingest(&update, None) };
        let model = TrackedEntity::try_from(row).unwrap();
        assert_eq!(model.last_seen, seen);
        assert_eq!(model.last_contact, Some(datetime!(2025-06-01 11:59:58 UTC)));
        assert_eq!(model.latitude, Some(47.45));
        assert_eq!(model.altitude, None);
    }

    #[test]
    fn test_unix_millis_truncates() {
        let at = datetime!(1970-01-01 00:00:01.999_999 UTC);
        assert_eq!(unix_millis(at).unwrap(), 1_999);
    }

    #[test]
    fn test_negative_count_is_invalid() {
        let row = GroupRow { manufacturer: "Cessna".to_string(), count: -1, active_count: 0 };
        let err = GroupSummary::try_from(row).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData(_)));
    }
}
