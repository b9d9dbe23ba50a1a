//! Semantic validation for decoded events.
//!
//! The parser accepts anything structurally well-formed; this module is
//! the gate that keeps garbage coordinates and inverted lifetimes out of
//! the track store.

use crate::event::{CotEvent, Point};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("latitude {0} outside [-90, 90]")]
    InvalidLatitude(f64),
    #[error("longitude {0} outside [-180, 180]")]
    InvalidLongitude(f64),
    #[error("circular error {0} must be non-negative")]
    InvalidCircularError(f64),
    #[error("linear error {0} must be non-negative")]
    InvalidLinearError(f64),
    #[error("event uid is empty")]
    EmptyUid,
    #[error("event type is empty")]
    EmptyType,
    #[error("stale {stale} is not after start {start}")]
    InvalidTimestampOrder { start: String, stale: String },
}

/// Checks coordinate ranges and accuracy signs.
pub fn validate_point(point: &Point) -> Result<(), ValidationError> {
    if !(-90.0..=90.0).contains(&point.lat) {
        return Err(ValidationError::InvalidLatitude(point.lat));
    }
    if !(-180.0..=180.0).contains(&point.lon) {
        return Err(ValidationError::InvalidLongitude(point.lon));
    }
    if point.ce < 0.0 {
        return Err(ValidationError::InvalidCircularError(point.ce));
    }
    if point.le < 0.0 {
        return Err(ValidationError::InvalidLinearError(point.le));
    }
    Ok(())
}

/// Checks identity fields, the point and timestamp ordering.
pub fn validate_event(event: &CotEvent) -> Result<(), ValidationError> {
    if event.uid.is_empty() {
        return Err(ValidationError::EmptyUid);
    }
    if event.event_type.is_empty() {
        return Err(ValidationError::EmptyType);
    }
    validate_point(&event.point)?;
    if event.stale <= event.start {
        return Err(ValidationError::InvalidTimestampOrder {
            start: event.start.to_rfc3339(),
            stale: event.stale.to_rfc3339(),
        });
    }
    Ok(())
}
