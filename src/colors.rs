use crate::transit_types::VisualizationProperty;

pub const PEOPLE_ON: &str = "#e91e63"; // Pink
pub const PEOPLE_OFF: &str = "#9c27b0"; // Purple
pub const REACHABLE_WALK: &str = "#2196f3"; // Blue
pub const REACHABLE_BIKE: &str = "#4caf50"; // Green
pub const OFF: &str = "#666666";
pub const SELECTED: &str = "#00ff00";
pub const HOVER: &str = "#ffff00";
pub const LINE: &str = "#0000ff";

// Percentile bands in the detail panel
pub const LOW: &str = "#f44336";
pub const MEDIUM: &str = "#ffc107";
pub const HIGH: &str = "#4caf50";

pub fn property_color(property: VisualizationProperty) -> &'static str {
    match property {
        VisualizationProperty::Off => OFF,
        VisualizationProperty::PeopleOn => PEOPLE_ON,
        VisualizationProperty::PeopleOff => PEOPLE_OFF,
        VisualizationProperty::ReachablePopulationWalk => REACHABLE_WALK,
        VisualizationProperty::ReachablePopulationBike => REACHABLE_BIKE,
    }
}
