//! # tagwatch-core
//!
//! Core logic for the tagwatch Bluetooth tracker monitor.
//!
//! This crate provides:
//! - Tracker classification from advertisement payloads
//! - A device registry that merges scan batches and counts sightings
//! - Scan session control with automatic stop and event fan-out
//! - Persistent storage for device records and sighting events
//! - Recent / history windowing over stored devices
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`types`] - Shared data model and OpenAPI schemas
//! - [`signature`] - Vendor signature table used for classification
//! - [`classifier`] - Payload classification and connection status decoding
//! - [`trust`] - Trusted device lists
//! - [`store`] - Device and event persistence
//! - [`registry`] - In-memory device registry
//! - [`session`] - Scan controller and scan session abstraction
//! - [`window`] - Recent / history partitioning
//! - [`config`] - Configuration loading, saving, and validation
//! - [`error`] - Unified error type for the crate
//! - `bluez` - BlueZ scan session (feature `bluetooth`)

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

#[cfg(feature = "bluetooth")]
pub mod bluez;
pub mod classifier;
pub mod config;
pub mod error;
pub mod registry;
pub mod session;
pub mod signature;
pub mod store;
pub mod trust;
pub mod types;
pub mod window;

// Re-export primary types for convenience
#[cfg(feature = "bluetooth")]
pub use bluez::{BluezError, BluezScanSession};
pub use classifier::{classify, Classifier, DecodeError};
pub use config::{ConfigError, ConfigResult, TagwatchConfig};
pub use error::{Result, TagwatchError};
pub use registry::{DeviceRegistry, Observation, PendingWrites, RegistryOptions};
pub use session::{
    LocalScanSession, ScanConsumer, ScanController, ScanSession, ScanState, SessionError,
    SessionEvent,
};
pub use signature::{Signature, SignatureTable};
pub use store::{DeviceStore, Storage, StoreError, StoreResult};
pub use trust::{AllowList, TrustList};
pub use types::{
    AdvertisementPayload, Classification, ConnectionStatus, DeviceEvent, DeviceRecord,
    RadioState, RawDevice, TrackerKind,
};
pub use window::{partition, Partition, WindowedView};
