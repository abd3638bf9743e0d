use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitLine {
    pub id: String,
    #[serde(default)]
    pub stops: Vec<TransitStop>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitStop {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub people_on: u32,
    #[serde(default)]
    pub people_off: u32,
    #[serde(default)]
    pub reachable_population_walk: u32,
    #[serde(default)]
    pub reachable_population_bike: u32,
    // The backend sends "" for a missing neighbour
    #[serde(default, with = "link_id")]
    pub prev_id: Option<String>,
    #[serde(default, with = "link_id")]
    pub next_id: Option<String>,
}

impl TransitStop {
    pub fn metric(&self, property: VisualizationProperty) -> u32 {
        match property {
            VisualizationProperty::Off => 0,
            VisualizationProperty::PeopleOn => self.people_on,
            VisualizationProperty::PeopleOff => self.people_off,
            VisualizationProperty::ReachablePopulationWalk => self.reachable_population_walk,
            VisualizationProperty::ReachablePopulationBike => self.reachable_population_bike,
        }
    }

    /// Merges a partial update. Link pointers are only touched when the update carries them.
    pub fn apply(&mut self, update: &StopUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(lat) = update.lat {
            self.lat = lat;
        }
        if let Some(lng) = update.lng {
            self.lng = lng;
        }
        if let Some(v) = update.people_on {
            self.people_on = v;
        }
        if let Some(v) = update.people_off {
            self.people_off = v;
        }
        if let Some(v) = update.reachable_population_walk {
            self.reachable_population_walk = v;
        }
        if let Some(v) = update.reachable_population_bike {
            self.reachable_population_bike = v;
        }
        if let Some(prev) = &update.prev_id {
            self.prev_id = (!prev.is_empty()).then(|| prev.clone());
        }
        if let Some(next) = &update.next_id {
            self.next_id = (!next.is_empty()).then(|| next.clone());
        }
    }
}

/// PATCH body for a stop. Absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub people_on: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub people_off: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reachable_population_walk: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reachable_population_bike: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_id: Option<String>,
}

impl StopUpdate {
    /// An update that puts back `before`'s values for exactly the fields this one sets.
    pub fn reverting(&self, before: &TransitStop) -> StopUpdate {
        let link = |id: &Option<String>| id.clone().unwrap_or_default();
        StopUpdate {
            name: self.name.as_ref().map(|_| before.name.clone()),
            lat: self.lat.map(|_| before.lat),
            lng: self.lng.map(|_| before.lng),
            people_on: self.people_on.map(|_| before.people_on),
            people_off: self.people_off.map(|_| before.people_off),
            reachable_population_walk: self
                .reachable_population_walk
                .map(|_| before.reachable_population_walk),
            reachable_population_bike: self
                .reachable_population_bike
                .map(|_| before.reachable_population_bike),
            prev_id: self.prev_id.as_ref().map(|_| link(&before.prev_id)),
            next_id: self.next_id.as_ref().map(|_| link(&before.next_id)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VisualizationProperty {
    #[default]
    Off,
    PeopleOn,
    PeopleOff,
    ReachablePopulationWalk,
    ReachablePopulationBike,
}

impl VisualizationProperty {
    pub const METRICS: [VisualizationProperty; 4] = [
        VisualizationProperty::PeopleOn,
        VisualizationProperty::PeopleOff,
        VisualizationProperty::ReachablePopulationWalk,
        VisualizationProperty::ReachablePopulationBike,
    ];

    /// Property name as used in feature properties and map expressions.
    pub fn key(self) -> &'static str {
        match self {
            VisualizationProperty::Off => "off",
            VisualizationProperty::PeopleOn => "peopleOn",
            VisualizationProperty::PeopleOff => "peopleOff",
            VisualizationProperty::ReachablePopulationWalk => "reachablePopulationWalk",
            VisualizationProperty::ReachablePopulationBike => "reachablePopulationBike",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VisualizationProperty::Off => "",
            VisualizationProperty::PeopleOn => "People getting on",
            VisualizationProperty::PeopleOff => "People getting off",
            VisualizationProperty::ReachablePopulationWalk => "Within 30min walk",
            VisualizationProperty::ReachablePopulationBike => "Within 30min bike",
        }
    }
}

/// Minimum thresholds for stop metrics. `None` (or 0) means "All".
///
/// No `skip_serializing_if` here: the filter is also stored in the bincode session file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopFilter {
    #[serde(default)]
    pub people_on: Option<u32>,
    #[serde(default)]
    pub people_off: Option<u32>,
    #[serde(default)]
    pub reachable_population_walk: Option<u32>,
    #[serde(default)]
    pub reachable_population_bike: Option<u32>,
}

impl StopFilter {
    fn thresholds(&self) -> [(VisualizationProperty, Option<u32>); 4] {
        [
            (VisualizationProperty::PeopleOn, self.people_on),
            (VisualizationProperty::PeopleOff, self.people_off),
            (VisualizationProperty::ReachablePopulationWalk, self.reachable_population_walk),
            (VisualizationProperty::ReachablePopulationBike, self.reachable_population_bike),
        ]
    }

    /// Drops zero thresholds, which the filter dialog uses for "All".
    pub fn normalized(&self) -> StopFilter {
        let keep = |v: Option<u32>| v.filter(|t| *t != 0);
        StopFilter {
            people_on: keep(self.people_on),
            people_off: keep(self.people_off),
            reachable_population_walk: keep(self.reachable_population_walk),
            reachable_population_bike: keep(self.reachable_population_bike),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.normalized() == StopFilter::default()
    }

    pub fn matches(&self, stop: &TransitStop) -> bool {
        self.normalized()
            .thresholds()
            .iter()
            .all(|(property, threshold)| match threshold {
                Some(t) => stop.metric(*property) > *t,
                None => true,
            })
    }

    /// Query string pairs for `GET /transit-lines/stops`.
    pub fn query_pairs(&self) -> Vec<(&'static str, u32)> {
        self.normalized()
            .thresholds()
            .iter()
            .filter_map(|(property, threshold)| threshold.map(|t| (property.key(), t)))
            .collect()
    }
}

mod link_id {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(value.as_deref().unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        Ok(raw.filter(|s| !s.is_empty()))
    }
}
