//! Input validation for the line and stop forms.

use crate::config::BoundingBox;
use crate::transit_types::{StopUpdate, TransitStop};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static LINE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9]*$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LineForm {
    #[serde(default)]
    pub id: String,
}

impl LineForm {
    /// Returns the normalized (lowercase) line id.
    pub fn validate(&self) -> Result<String, Vec<FieldError>> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(vec![FieldError::new("id", "Line ID is required")]);
        }
        if !LINE_ID.is_match(id) {
            return Err(vec![FieldError::new(
                "id",
                "Line ID must start with a letter followed by letters or numbers",
            )]);
        }
        Ok(id.to_lowercase())
    }
}

/// Stop form as submitted. Counts are signed so negative input can be reported.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopForm {
    #[serde(default)]
    pub name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(default)]
    pub people_on: i64,
    #[serde(default)]
    pub people_off: i64,
}

/// A stop form that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct StopFields {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub people_on: u32,
    pub people_off: u32,
}

fn count(field: &'static str, label: &str, value: i64, errors: &mut Vec<FieldError>) -> u32 {
    match u32::try_from(value) {
        Ok(v) => v,
        Err(_) if value < 0 => {
            errors.push(FieldError::new(field, format!("{} cannot be negative", label)));
            0
        }
        Err(_) => {
            errors.push(FieldError::new(field, format!("{} is too large", label)));
            0
        }
    }
}

impl StopForm {
    pub fn validate(&self, region: &BoundingBox) -> Result<StopFields, Vec<FieldError>> {
        let mut errors = Vec::new();

        let name = self.name.trim();
        if name.is_empty() {
            errors.push(FieldError::new("name", "Name is required"));
        }

        let lat = match self.lat {
            None => {
                errors.push(FieldError::new("lat", "Latitude is required"));
                0.0
            }
            Some(lat) if !lat.is_finite() || !region.contains_lat(lat) => {
                errors.push(FieldError::new(
                    "lat",
                    format!(
                        "Latitude must be between {} and {}",
                        region.min_lat, region.max_lat
                    ),
                ));
                lat
            }
            Some(lat) => lat,
        };

        let lng = match self.lng {
            None => {
                errors.push(FieldError::new("lng", "Longitude is required"));
                0.0
            }
            Some(lng) if !lng.is_finite() || !region.contains_lng(lng) => {
                errors.push(FieldError::new(
                    "lng",
                    format!(
                        "Longitude must be between {} and {}",
                        region.min_lng, region.max_lng
                    ),
                ));
                lng
            }
            Some(lng) => lng,
        };

        let people_on = count("peopleOn", "People getting on", self.people_on, &mut errors);
        let people_off = count("peopleOff", "People getting off", self.people_off, &mut errors);

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(StopFields {
            name: name.to_string(),
            lat,
            lng,
            people_on,
            people_off,
        })
    }
}

impl StopFields {
    /// A new unlinked stop. Reachability is computed by the backend later.
    pub fn into_new_stop(self) -> TransitStop {
        TransitStop {
            id: uuid::Uuid::new_v4().to_string(),
            name: self.name,
            lat: self.lat,
            lng: self.lng,
            people_on: self.people_on,
            people_off: self.people_off,
            reachable_population_walk: 0,
            reachable_population_bike: 0,
            prev_id: None,
            next_id: None,
        }
    }

    pub fn into_update(self) -> StopUpdate {
        StopUpdate {
            name: Some(self.name),
            lat: Some(self.lat),
            lng: Some(self.lng),
            people_on: Some(self.people_on),
            people_off: Some(self.people_off),
            ..Default::default()
        }
    }
}
