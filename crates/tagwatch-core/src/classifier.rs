//! Advertisement classification and vendor status decoding.
//!
//! [`Classifier::classify`] walks a [`SignatureTable`] in order and returns the
//! first vendor whose name keywords, manufacturer prefix or service prefixes
//! match the payload. Classification is total: malformed or empty payloads
//! resolve to the generic fallback instead of an error.

use std::sync::Arc;
use once_cell::sync::Lazy;

use thiserror::Error;
use tracing::trace;

use crate::signature::SignatureTable;
use crate::types::{short_service_form, AdvertisementPayload, Classification, ConnectionStatus};

/// Decodes a vendor status bit-field from a payload.
pub type StatusDecoder = fn(&AdvertisementPayload) -> Result<ConnectionStatus, DecodeError>;

/// Service identifier carrying SmartTag status data.
pub const SMARTTAG_SERVICE: &str = "fd5a";

const BIT5: u8 = 0b0100;
const BIT6: u8 = 0b0010;
const BIT7: u8 = 0b0001;

/// Why a status bit-field could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The payload carries no service data for the vendor's service.
    #[error("no service data for service {service}")]
    MissingServiceData {
        /// The service identifier that was looked up.
        service: &'static str,
    },

    /// The service data is too short to hold the status byte.
    #[error("service data too short: need {needed} bytes, got {actual}")]
    PayloadTooShort {
        /// Minimum length required.
        needed: usize,
        /// Length received.
        actual: usize,
    },
}

/// Decodes the SmartTag owner connection status from `FD5A` service data.
///
/// # Errors
///
/// Returns [`DecodeError`] when the service data is absent or shorter than
/// two bytes.
pub fn decode_smarttag_status(
    payload: &AdvertisementPayload,
) -> Result<ConnectionStatus, DecodeError> {
    let data = payload
        .service_data_for(SMARTTAG_SERVICE)
        .ok_or(DecodeError::MissingServiceData {
            service: SMARTTAG_SERVICE,
        })?;

    match data.get(1) {
        Some(&status_byte) => Ok(decode_status_bits(status_byte)),
        None => Err(DecodeError::PayloadTooShort {
            needed: 2,
            actual: data.len(),
        }),
    }
}

/// Maps the three status bits of a SmartTag status byte to a connection status.
#[must_use]
pub const fn decode_status_bits(byte: u8) -> ConnectionStatus {
    let bit5 = byte & BIT5 != 0;
    let bit6 = byte & BIT6 != 0;
    let bit7 = byte & BIT7 != 0;

    match (bit5, bit6, bit7) {
        (false, true, true) => ConnectionStatus::OvermatureOffline,
        (false, true, false) => ConnectionStatus::Offline,
        (false, false, true) => ConnectionStatus::PrematureOffline,
        _ => ConnectionStatus::Connected,
    }
}

/// Lower-case hex of the first two manufacturer data bytes.
fn manufacturer_hex(data: &[u8]) -> String {
    data.iter().take(2).map(|b| format!("{b:02x}")).collect()
}

/// Lower-cased service identifiers and service data keys, with 16-bit
/// short forms added for identifiers built on the base UUID.
fn service_identifiers(payload: &AdvertisementPayload) -> Vec<String> {
    let mut identifiers = Vec::with_capacity(payload.service_uuids.len() + payload.service_data.len());
    for id in payload
        .service_uuids
        .iter()
        .chain(payload.service_data.keys())
    {
        let lower = id.to_ascii_lowercase();
        if let Some(short) = short_service_form(&lower) {
            identifiers.push(short.to_string());
        }
        identifiers.push(lower);
    }
    identifiers
}

/// Classifies advertisement payloads against a signature table.
#[derive(Debug, Clone)]
pub struct Classifier {
    table: Arc<SignatureTable>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(SignatureTable::default())
    }
}

impl Classifier {
    /// Creates a classifier over `table`.
    #[must_use]
    pub fn new(table: SignatureTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    /// The table this classifier evaluates.
    #[must_use]
    pub fn table(&self) -> &SignatureTable {
        &self.table
    }

    /// Classifies one payload. Never fails.
    #[must_use]
    pub fn classify(&self, payload: &AdvertisementPayload) -> Classification {
        let lower_name = payload
            .local_name
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        let manufacturer = payload.manufacturer_data.as_deref().map(manufacturer_hex);
        let services = service_identifiers(payload);

        for (kind, signature) in self.table.iter() {
            let matched = signature.matches_name(&lower_name)
                || manufacturer
                    .as_deref()
                    .is_some_and(|hex| signature.matches_manufacturer(hex))
                || signature.matches_service(&services);

            if !matched {
                continue;
            }

            let status = match signature.status_decoder {
                Some(decode) => decode(payload).unwrap_or_else(|err| {
                    trace!(kind = ?kind, error = %err, "status decode failed");
                    ConnectionStatus::Unknown
                }),
                None => ConnectionStatus::Unknown,
            };

            trace!(kind = ?kind, status = ?status, "payload matched signature");
            return Classification::new(*kind, status);
        }

        Classification::generic()
    }
}

/// Classifies `payload` against the built-in signature table.
#[must_use]
pub fn classify(payload: &AdvertisementPayload) -> Classification {
    static DEFAULT: Lazy<Classifier> = Lazy::new(Classifier::default);
    DEFAULT.classify(payload)
}
