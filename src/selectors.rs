//! Derived view model: everything the map and the detail panel render is computed
//! here from `TransitLinesState`, without side effects.

use crate::colors;
use crate::ordering;
use crate::state::TransitLinesState;
use crate::transit_types::{TransitLine, TransitStop, VisualizationProperty};
use geojson::{Feature, FeatureCollection, Geometry, Value, feature::Id};
use serde::Serialize;
use serde_json::json;

/// A map source document, as handed to the map library's `addSource`/`setData`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoJsonSource {
    #[serde(rename = "type")]
    pub source_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promote_id: Option<&'static str>,
    pub data: FeatureCollection,
}

impl GeoJsonSource {
    fn new(features: Vec<Feature>, promote_id: Option<&'static str>) -> Self {
        Self {
            source_type: "geojson",
            promote_id,
            data: FeatureCollection {
                bbox: None,
                features,
                foreign_members: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaxStopValues {
    pub off: u32,
    pub people_on: u32,
    pub people_off: u32,
    pub reachable_population_walk: u32,
    pub reachable_population_bike: u32,
}

impl MaxStopValues {
    pub fn get(&self, property: VisualizationProperty) -> u32 {
        match property {
            VisualizationProperty::Off => self.off,
            VisualizationProperty::PeopleOn => self.people_on,
            VisualizationProperty::PeopleOff => self.people_off,
            VisualizationProperty::ReachablePopulationWalk => self.reachable_population_walk,
            VisualizationProperty::ReachablePopulationBike => self.reachable_population_bike,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationValue {
    pub label: &'static str,
    pub value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    Medium,
    High,
}

impl Level {
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 80.0 {
            Level::High
        } else if percentage >= 40.0 {
            Level::Medium
        } else {
            Level::Low
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Level::Low => colors::LOW,
            Level::Medium => colors::MEDIUM,
            Level::High => colors::HIGH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDetail {
    pub property: VisualizationProperty,
    pub label: &'static str,
    pub value: u32,
    pub max: u32,
    pub percentage: f64,
    pub level: Level,
    pub color: &'static str,
}

/// Detail panel for the selected stop.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopDetail {
    pub name: String,
    pub line_id: Option<String>,
    pub stop: Option<TransitStop>,
    pub metrics: Vec<MetricDetail>,
    pub visualization: VisualizationValue,
}

pub fn select_all(state: &TransitLinesState) -> Vec<&TransitLine> {
    state
        .ids
        .iter()
        .filter_map(|id| state.entities.get(id))
        .collect()
}

pub fn all_stops(state: &TransitLinesState) -> Vec<&TransitStop> {
    select_all(state)
        .into_iter()
        .flat_map(|line| line.stops.iter())
        .collect()
}

pub fn selected_stop(state: &TransitLinesState) -> Option<&TransitStop> {
    let selected = state.selected_stop_id.as_deref()?;
    all_stops(state).into_iter().find(|s| s.id == selected)
}

/// Stops passing the current filter. The backend's answer wins once it has arrived.
pub fn visible_stops(state: &TransitLinesState) -> Vec<&TransitStop> {
    let stops = all_stops(state);
    if state.current_filter.is_empty() {
        return stops;
    }
    match &state.filtered_stop_ids {
        Some(ids) => stops.into_iter().filter(|s| ids.contains(&s.id)).collect(),
        None => stops
            .into_iter()
            .filter(|s| state.current_filter.matches(s))
            .collect(),
    }
}

pub fn max_stop_values(state: &TransitLinesState) -> MaxStopValues {
    let stops = all_stops(state);
    let max = |f: fn(&TransitStop) -> u32| stops.iter().map(|s| f(s)).max().unwrap_or(0);
    MaxStopValues {
        off: 0,
        people_on: max(|s| s.people_on),
        people_off: max(|s| s.people_off),
        reachable_population_walk: max(|s| s.reachable_population_walk),
        reachable_population_bike: max(|s| s.reachable_population_bike),
    }
}

pub fn percentage(value: u32, max: u32) -> f64 {
    if max == 0 {
        return 0.0;
    }
    f64::from(value) / f64::from(max) * 100.0
}

/// Base marker radius: 6 when off, otherwise linear from 6 at 0 to 20 at 1000 (clamped).
pub fn marker_radius(property: VisualizationProperty, value: u32) -> f64 {
    if property == VisualizationProperty::Off {
        return 6.0;
    }
    let t = (f64::from(value) / 1000.0).min(1.0);
    6.0 + t * 14.0
}

pub fn stop_visualization_value(state: &TransitLinesState) -> VisualizationValue {
    let property = state.visualization_property;
    match selected_stop(state) {
        Some(stop) if property != VisualizationProperty::Off => VisualizationValue {
            label: property.label(),
            value: stop.metric(property),
        },
        _ => VisualizationValue { label: "", value: 0 },
    }
}

fn point(stop: &TransitStop) -> Geometry {
    Geometry::new(Value::Point(vec![stop.lng, stop.lat]))
}

fn stop_feature(stop: &TransitStop) -> Feature {
    let mut feature = Feature {
        bbox: None,
        geometry: Some(point(stop)),
        id: Some(Id::String(stop.id.clone())),
        properties: None,
        foreign_members: None,
    };
    feature.set_property("_id", stop.id.clone());
    feature.set_property("name", stop.name.clone());
    feature.set_property("peopleOn", stop.people_on);
    feature.set_property("peopleOff", stop.people_off);
    feature.set_property("reachablePopulationWalk", stop.reachable_population_walk);
    feature.set_property("reachablePopulationBike", stop.reachable_population_bike);
    feature
}

/// Stops source with everything the circle layer's paint expressions read.
pub fn stops_point_source(state: &TransitLinesState) -> GeoJsonSource {
    let property = state.visualization_property;
    let max = max_stop_values(state).get(property);

    let features = visible_stops(state)
        .into_iter()
        .map(|stop| {
            let value = stop.metric(property);
            let level = Level::from_percentage(percentage(value, max));
            let mut feature = stop_feature(stop);
            feature.set_property("selectedStopId", json!(state.selected_stop_id));
            feature.set_property("visualizationProperty", property.key());
            feature.set_property("visualizationColor", colors::property_color(property));
            feature.set_property("levelColor", level.color());
            feature.set_property("radius", marker_radius(property, value));
            feature
        })
        .collect();

    GeoJsonSource::new(features, Some("_id"))
}

/// Plain stops source without visualization state.
pub fn stops_source(state: &TransitLinesState) -> GeoJsonSource {
    let features = all_stops(state).into_iter().map(stop_feature).collect();
    GeoJsonSource::new(features, Some("_id"))
}

/// One LineString per line, in travel order.
pub fn lines_source(state: &TransitLinesState) -> GeoJsonSource {
    let features = select_all(state)
        .into_iter()
        .map(|line| {
            let stops = ordering::walk(line).unwrap_or_else(|e| {
                log::warn!("Line {} drawn in stored order: {}", line.id, e);
                line.stops.iter().collect()
            });
            let coordinates = stops.iter().map(|s| vec![s.lng, s.lat]).collect();
            let mut feature = Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::LineString(coordinates))),
                id: None,
                properties: None,
                foreign_members: None,
            };
            feature.set_property("lineId", line.id.clone());
            feature
        })
        .collect();

    GeoJsonSource::new(features, None)
}

/// `[min_lng, min_lat, max_lng, max_lat]` of the visible stops.
pub fn bounds(state: &TransitLinesState) -> Option<[f64; 4]> {
    visible_stops(state).into_iter().fold(None, |acc, s| {
        Some(match acc {
            None => [s.lng, s.lat, s.lng, s.lat],
            Some([a, b, c, d]) => [a.min(s.lng), b.min(s.lat), c.max(s.lng), d.max(s.lat)],
        })
    })
}

pub fn stop_detail(state: &TransitLinesState) -> StopDetail {
    let stop = selected_stop(state);
    let maxes = max_stop_values(state);

    let metrics = match stop {
        Some(stop) => VisualizationProperty::METRICS
            .iter()
            .map(|&property| {
                let value = stop.metric(property);
                let max = maxes.get(property);
                let pct = percentage(value, max);
                let level = Level::from_percentage(pct);
                MetricDetail {
                    property,
                    label: property.label(),
                    value,
                    max,
                    percentage: pct,
                    level,
                    color: level.color(),
                }
            })
            .collect(),
        None => Vec::new(),
    };

    StopDetail {
        name: stop
            .map(|s| s.name.clone())
            .unwrap_or_else(|| "Please select a stop".to_string()),
        line_id: stop
            .and_then(|s| state.line_of_stop(&s.id))
            .map(|l| l.id.clone()),
        stop: stop.cloned(),
        metrics,
        visualization: stop_visualization_value(state),
    }
}
