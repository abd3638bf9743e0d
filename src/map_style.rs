//! Layer definitions for the map library. Hover is feature state set by the front end;
//! selection is read from the `selectedStopId` property of each stop feature.

use crate::colors;
use crate::transit_types::VisualizationProperty;
use serde_json::{Value, json};

pub const STOPS_SOURCE_ID: &str = "stops-source";
pub const LINES_SOURCE_ID: &str = "lines-source";
pub const STOPS_LAYER_ID: &str = "stops-layer";
pub const LINES_LAYER_ID: &str = "lines-layer";

fn hover() -> Value {
    json!(["boolean", ["feature-state", "hover"], false])
}

fn selected() -> Value {
    json!(["==", ["get", "_id"], ["get", "selectedStopId"]])
}

pub fn stops_circle_color(property: VisualizationProperty) -> Value {
    json!([
        "case",
        hover(),
        colors::HOVER,
        ["case", selected(), colors::SELECTED, colors::property_color(property)]
    ])
}

pub fn stops_circle_radius(property: VisualizationProperty) -> Value {
    let base = match property {
        VisualizationProperty::Off => json!(6),
        _ => json!(["interpolate", ["linear"], ["get", property.key()], 0, 6, 1000, 20]),
    };
    json!(["case", hover(), 10, ["case", selected(), 12, base]])
}

pub fn stops_layer(property: VisualizationProperty) -> Value {
    json!({
        "id": STOPS_LAYER_ID,
        "type": "circle",
        "source": STOPS_SOURCE_ID,
        "paint": {
            "circle-radius": stops_circle_radius(property),
            "circle-color": stops_circle_color(property),
            "circle-stroke-width": 2,
            "circle-stroke-color": "#ffffff"
        }
    })
}

pub fn lines_layer() -> Value {
    json!({
        "id": LINES_LAYER_ID,
        "type": "line",
        "source": LINES_SOURCE_ID,
        "paint": {
            "line-color": colors::LINE,
            "line-width": 3,
            "line-opacity": 0.8
        }
    })
}

/// Layers in draw order: lines under stops.
pub fn layers(property: VisualizationProperty) -> Value {
    json!([lines_layer(), stops_layer(property)])
}
