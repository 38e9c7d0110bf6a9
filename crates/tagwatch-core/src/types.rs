//! Shared data model.
//!
//! Everything that crosses a module boundary lives here: the raw
//! advertisement data handed in by a scan session, the classification
//! enums, and the durable record shapes handed to persistence.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// 128-bit identifiers built on the Bluetooth base UUID carry a 16-bit
/// short form in their first group.
static SHORT_FORM_UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^0000([0-9a-f]{4})(?:-|$)").expect("short-form UUID pattern is valid")
});

/// The 16-bit short form of a service identifier built on the base UUID.
pub(crate) fn short_service_form(id: &str) -> Option<&str> {
    SHORT_FORM_UUID
        .captures(id)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Advertisement data received from one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisementPayload {
    /// Advertised local name, if any.
    pub local_name: Option<String>,

    /// Manufacturer specific data. The first two bytes are the company
    /// identifier in little-endian order.
    pub manufacturer_data: Option<Vec<u8>>,

    /// Advertised service identifiers, as the radio stack renders them.
    pub service_uuids: Vec<String>,

    /// Service data keyed by service identifier.
    pub service_data: HashMap<String, Vec<u8>>,

    /// Received signal strength in dBm.
    pub rssi: i16,
}

impl AdvertisementPayload {
    /// Looks up service data by identifier, ignoring case.
    ///
    /// Keys in the 128-bit base UUID form also match their 16-bit short form.
    #[must_use]
    pub fn service_data_for(&self, service: &str) -> Option<&[u8]> {
        self.service_data
            .iter()
            .find(|(key, _)| {
                key.eq_ignore_ascii_case(service)
                    || short_service_form(key).is_some_and(|short| short.eq_ignore_ascii_case(service))
            })
            .map(|(_, data)| data.as_slice())
    }
}

/// One device as reported by a scan session in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDevice {
    /// Stable opaque identifier assigned by the radio layer.
    pub id: String,

    /// Whether an external allow-list already marked the device as trusted.
    pub is_trusted: bool,

    /// Display name, empty when the device advertises none.
    pub name: String,

    /// Signal strength in dBm.
    pub rssi: i16,

    /// The advertisement that produced this sighting.
    pub payload: AdvertisementPayload,
}

/// Tracker vendor or category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    /// Apple AirTag.
    Airtag,
    /// Apple Find My network accessory.
    FindMy,
    /// Samsung Galaxy SmartTag.
    Smarttag,
    /// Tile.
    Tile,
    /// Chipolo.
    Chipolo,
    /// Google Find My Device network.
    Google,
    /// Pebblebee.
    Pebblebee,
    /// Samsung Find My Mobile.
    FindMyMobile,
    /// A wireless device that matched no vendor signature.
    Generic,
    /// Classification not attempted yet.
    #[default]
    Unknown,
}

impl TrackerKind {
    /// Human-readable label.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Airtag => "Apple AirTag",
            Self::FindMy => "Find My",
            Self::Smarttag => "Samsung SmartTag",
            Self::Tile => "Tile",
            Self::Chipolo => "Chipolo",
            Self::Google => "Google",
            Self::Pebblebee => "Pebblebee",
            Self::FindMyMobile => "Find My Mobile",
            Self::Generic => "Bluetooth",
            Self::Unknown => "Unknown",
        }
    }

    /// Vendor that manufactures this kind of tracker.
    #[must_use]
    pub const fn vendor(self) -> &'static str {
        match self {
            Self::Airtag | Self::FindMy => "Apple",
            Self::Smarttag | Self::FindMyMobile => "Samsung",
            Self::Tile => "Tile",
            Self::Chipolo => "Chipolo",
            Self::Google => "Google",
            Self::Pebblebee => "Pebblebee",
            Self::Generic => "Bluetooth",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether this kind names an actual tracker vendor.
    #[must_use]
    pub const fn is_tracker(self) -> bool {
        !matches!(self, Self::Generic | Self::Unknown)
    }
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// How long the tracker's paired owner device has been out of reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Owner device is connected.
    Connected,
    /// Owner disconnected a short while ago.
    PrematureOffline,
    /// Owner disconnected.
    Offline,
    /// Owner has been disconnected for a long time.
    OvermatureOffline,
    /// Status could not be decoded.
    #[default]
    Unknown,
}

impl ConnectionStatus {
    /// Whether the tracker is broadcasting without its owner nearby.
    ///
    /// `Unknown` counts as tracking mode: a status we cannot read is not
    /// evidence that the owner is present.
    #[must_use]
    pub const fn is_tracking_mode(self) -> bool {
        matches!(self, Self::Offline | Self::OvermatureOffline | Self::Unknown)
    }

    /// Short description for display.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Connected => "Owner connected",
            Self::PrematureOffline => "Owner recently disconnected",
            Self::Offline => "Owner disconnected",
            Self::OvermatureOffline => "Owner long disconnected",
            Self::Unknown => "Status unknown",
        }
    }
}

/// Result of classifying one advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Matched tracker kind.
    pub kind: TrackerKind,

    /// Vendor label, never empty.
    pub vendor: String,

    /// Decoded owner connection status.
    pub connection_status: ConnectionStatus,
}

impl Classification {
    /// Builds a classification whose vendor label is derived from `kind`.
    #[must_use]
    pub fn new(kind: TrackerKind, connection_status: ConnectionStatus) -> Self {
        Self {
            kind,
            vendor: kind.vendor().to_string(),
            connection_status,
        }
    }

    /// The fallback for devices that match no signature.
    #[must_use]
    pub fn generic() -> Self {
        Self::new(TrackerKind::Generic, ConnectionStatus::Unknown)
    }
}

/// Aggregated state for one device id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "5C:4A:1F:00:12:9B",
    "name": "AirTag",
    "first_seen": "2025-01-15T03:30:00Z",
    "last_seen": "2025-01-15T03:31:40Z",
    "signal_strength": -55,
    "is_trusted": false,
    "tracker_kind": "airtag",
    "vendor": "Apple",
    "connection_status": "unknown",
    "event_count": 4
}))]
pub struct DeviceRecord {
    /// Device identifier.
    pub id: String,

    /// Advertised name, possibly empty.
    pub name: String,

    /// When the device was first observed.
    pub first_seen: DateTime<Utc>,

    /// When the device was most recently observed.
    pub last_seen: DateTime<Utc>,

    /// Latest signal strength in dBm.
    pub signal_strength: i16,

    /// Whether the device is on the trust allow-list.
    pub is_trusted: bool,

    /// Classified tracker kind.
    pub tracker_kind: TrackerKind,

    /// Vendor label.
    pub vendor: String,

    /// Decoded owner connection status.
    pub connection_status: ConnectionStatus,

    /// Number of observations.
    pub event_count: u64,
}

impl DeviceRecord {
    /// A device is a potential risk when it is an untrusted, vendor-matched tracker.
    #[must_use]
    pub const fn is_potential_risk(&self) -> bool {
        !self.is_trusted && self.tracker_kind.is_tracker()
    }

    /// Name for display, `Unknown` when the device advertised none.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "Unknown"
        } else {
            &self.name
        }
    }
}

/// One observation of a device, appended to the durable event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeviceEvent {
    /// Generated event id.
    pub id: Uuid,

    /// Device the event belongs to.
    pub device_id: String,

    /// Observation time.
    pub timestamp: DateTime<Utc>,

    /// Signal strength in dBm at observation time.
    pub signal_strength: i16,
}

impl DeviceEvent {
    /// Creates an event with a fresh id.
    #[must_use]
    pub fn new(device_id: impl Into<String>, timestamp: DateTime<Utc>, signal_strength: i16) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id: device_id.into(),
            timestamp,
            signal_strength,
        }
    }
}

/// Power and authorization state reported by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RadioState {
    /// State not reported yet.
    #[default]
    Unknown,
    /// The platform has no usable radio.
    Unsupported,
    /// The process may not use the radio.
    Unauthorized,
    /// The radio is switched off.
    PoweredOff,
    /// The radio is on and usable.
    PoweredOn,
    /// The radio stack is restarting.
    Resetting,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(kind: TrackerKind, trusted: bool) -> DeviceRecord {
        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        DeviceRecord {
            id: "A".to_string(),
            name: String::new(),
            first_seen: now,
            last_seen: now,
            signal_strength: -50,
            is_trusted: trusted,
            tracker_kind: kind,
            vendor: kind.vendor().to_string(),
            connection_status: ConnectionStatus::Unknown,
            event_count: 1,
        }
    }

    #[test]
    fn test_tracking_mode_states() {
        assert!(ConnectionStatus::Offline.is_tracking_mode());
        assert!(ConnectionStatus::OvermatureOffline.is_tracking_mode());
        assert!(ConnectionStatus::Unknown.is_tracking_mode());
        assert!(!ConnectionStatus::Connected.is_tracking_mode());
        assert!(!ConnectionStatus::PrematureOffline.is_tracking_mode());
    }

    #[test]
    fn test_connection_descriptions() {
        assert_eq!(ConnectionStatus::Connected.description(), "Owner connected");
        assert_eq!(
            ConnectionStatus::PrematureOffline.description(),
            "Owner recently disconnected"
        );
        assert_eq!(ConnectionStatus::Offline.description(), "Owner disconnected");
        assert_eq!(
            ConnectionStatus::OvermatureOffline.description(),
            "Owner long disconnected"
        );
        assert_eq!(ConnectionStatus::Unknown.description(), "Status unknown");
    }

    #[test]
    fn test_potential_risk() {
        assert!(record(TrackerKind::Airtag, false).is_potential_risk());
        assert!(!record(TrackerKind::Airtag, true).is_potential_risk());
        assert!(!record(TrackerKind::Generic, false).is_potential_risk());
        assert!(!record(TrackerKind::Unknown, false).is_potential_risk());
    }

    #[test]
    fn test_display_name_falls_back() {
        let mut rec = record(TrackerKind::Tile, false);
        assert_eq!(rec.display_name(), "Unknown");
        rec.name = "Tile Mate".to_string();
        assert_eq!(rec.display_name(), "Tile Mate");
    }

    #[test]
    fn test_vendor_labels_never_empty() {
        for kind in [
            TrackerKind::Airtag,
            TrackerKind::FindMy,
            TrackerKind::Smarttag,
            TrackerKind::Tile,
            TrackerKind::Chipolo,
            TrackerKind::Google,
            TrackerKind::Pebblebee,
            TrackerKind::FindMyMobile,
            TrackerKind::Generic,
            TrackerKind::Unknown,
        ] {
            assert!(!kind.vendor().is_empty());
        }
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&TrackerKind::FindMyMobile).unwrap();
        assert_eq!(json, "\"find_my_mobile\"");
        let json = serde_json::to_string(&ConnectionStatus::OvermatureOffline).unwrap();
        assert_eq!(json, "\"overmature_offline\"");
    }

    #[test]
    fn test_service_data_lookup_ignores_case() {
        let mut payload = AdvertisementPayload::default();
        payload.service_data.insert("FD5A".to_string(), vec![1, 2]);
        assert_eq!(payload.service_data_for("fd5a"), Some(&[1u8, 2][..]));
        assert!(payload.service_data_for("feaa").is_none());
    }

    #[test]
    fn test_service_data_lookup_accepts_full_uuid_key() {
        let mut payload = AdvertisementPayload::default();
        payload
            .service_data
            .insert("0000FD5A-0000-1000-8000-00805F9B34FB".to_string(), vec![3, 4]);
        assert_eq!(payload.service_data_for("fd5a"), Some(&[3u8, 4][..]));
        assert!(payload.service_data_for("fd5b").is_none());
    }
}
