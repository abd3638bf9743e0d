use crate::ordering;
use crate::transit_types::{StopFilter, StopUpdate, TransitLine, TransitStop, VisualizationProperty};
use compact_str::CompactString;
use std::collections::{HashMap, HashSet};

/// Normalized editor state: lines keyed by id, plus the view settings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransitLinesState {
    // Insertion order of lines
    pub ids: Vec<CompactString>,
    pub entities: HashMap<CompactString, TransitLine>,

    pub selected_stop_id: Option<String>,
    pub visualization_property: VisualizationProperty,

    pub current_filter: StopFilter,
    // Stop ids returned by the backend for `current_filter`, once known
    pub filtered_stop_ids: Option<HashSet<String>>,
}

#[derive(Clone, Debug)]
pub enum Action {
    AddLine { line: TransitLine },
    UpsertLine { line: TransitLine },
    DeleteLine { id: String },
    SelectStop { selected_stop_id: Option<String> },
    AddStop { line_id: String, stop: TransitStop },
    RemoveStop { line_id: String, stop_id: String },
    // Puts a removed stop back after its former predecessor
    RestoreStop { line_id: String, stop: TransitStop, index: usize },
    EditStop { line_id: String, stop_id: String, updates: StopUpdate },
    SetVisualizationProperty { property: VisualizationProperty },
    FilterStops { filter: StopFilter },
    FilteredStopsLoaded { stops: Vec<TransitStop> },
}

impl TransitLinesState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&self, id: &str) -> Option<&TransitLine> {
        self.entities.get(id)
    }

    /// Line containing the given stop.
    pub fn line_of_stop(&self, stop_id: &str) -> Option<&TransitLine> {
        self.ids
            .iter()
            .filter_map(|id| self.entities.get(id))
            .find(|line| line.stops.iter().any(|s| s.id == stop_id))
    }

    /// The action that takes back `action`, computed against the current state.
    pub fn inverse(&self, action: &Action) -> Option<Action> {
        match action {
            Action::AddStop { line_id, stop } => Some(Action::RemoveStop {
                line_id: line_id.clone(),
                stop_id: stop.id.clone(),
            }),
            Action::RemoveStop { line_id, stop_id } => {
                let line = self.line(line_id)?;
                let index = line.stops.iter().position(|s| &s.id == stop_id)?;
                Some(Action::RestoreStop {
                    line_id: line_id.clone(),
                    stop: line.stops[index].clone(),
                    index,
                })
            }
            Action::EditStop {
                line_id,
                stop_id,
                updates,
            } => {
                let before = self.line(line_id)?.stops.iter().find(|s| &s.id == stop_id)?;
                Some(Action::EditStop {
                    line_id: line_id.clone(),
                    stop_id: stop_id.clone(),
                    updates: updates.reverting(before),
                })
            }
            _ => None,
        }
    }

    pub fn reduce(&mut self, action: Action) {
        // Server filter results only describe the stops as they were when fetched
        if matches!(
            action,
            Action::AddLine { .. }
                | Action::UpsertLine { .. }
                | Action::AddStop { .. }
                | Action::EditStop { .. }
                | Action::RestoreStop { .. }
        ) {
            self.filtered_stop_ids = None;
        }

        match action {
            Action::AddLine { line } => {
                let id = CompactString::from(line.id.as_str());
                if !self.entities.contains_key(&id) {
                    self.ids.push(id.clone());
                    self.entities.insert(id, line);
                }
            }

            Action::UpsertLine { line } => {
                let id = CompactString::from(line.id.as_str());
                if !self.entities.contains_key(&id) {
                    self.ids.push(id.clone());
                }
                self.entities.insert(id, line);
            }

            Action::DeleteLine { id } => {
                if let Some(line) = self.entities.remove(id.as_str()) {
                    self.ids.retain(|i| i.as_str() != id);
                    if let Some(selected) = &self.selected_stop_id {
                        if line.stops.iter().any(|s| &s.id == selected) {
                            self.selected_stop_id = None;
                        }
                    }
                }
            }

            Action::SelectStop { selected_stop_id } => {
                self.selected_stop_id = selected_stop_id;
            }

            Action::AddStop { line_id, stop } => {
                let Some(line) = self.entities.get_mut(line_id.as_str()) else {
                    return;
                };
                ordering::append(line, stop);
            }

            Action::RemoveStop { line_id, stop_id } => {
                let Some(line) = self.entities.get_mut(line_id.as_str()) else {
                    return;
                };
                if ordering::splice_out(line, &stop_id).is_some()
                    && self.selected_stop_id.as_deref() == Some(stop_id.as_str())
                {
                    self.selected_stop_id = None;
                }
            }

            Action::RestoreStop { line_id, stop, index } => {
                let Some(line) = self.entities.get_mut(line_id.as_str()) else {
                    return;
                };
                if line.stops.iter().any(|s| s.id == stop.id) {
                    return;
                }
                let after = stop.prev_id.clone();
                ordering::insert_after(line, after.as_deref(), stop, index);
            }

            Action::EditStop {
                line_id,
                stop_id,
                updates,
            } => {
                let Some(line) = self.entities.get_mut(line_id.as_str()) else {
                    return;
                };
                if let Some(stop) = line.stops.iter_mut().find(|s| s.id == stop_id) {
                    stop.apply(&updates);
                }
            }

            Action::SetVisualizationProperty { property } => {
                self.visualization_property = property;
            }

            Action::FilterStops { filter } => {
                self.current_filter = filter.normalized();
                self.filtered_stop_ids = None;
            }

            Action::FilteredStopsLoaded { stops } => {
                self.filtered_stop_ids = Some(stops.into_iter().map(|s| s.id).collect());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transit_types::fixtures;

    fn state_with(lines: &[TransitLine]) -> TransitLinesState {
        let mut state = TransitLinesState::new();
        for line in lines {
            state.reduce(Action::AddLine { line: line.clone() });
        }
        state
    }

    #[test]
    fn test_select_stop() {
        let mut state = TransitLinesState::new();
        state.reduce(Action::SelectStop {
            selected_stop_id: Some("foo".into()),
        });
        assert_eq!(
            state,
            TransitLinesState {
                selected_stop_id: Some("foo".into()),
                ..TransitLinesState::new()
            }
        );
    }

    #[test]
    fn test_add_line_keeps_existing() {
        let mut state = state_with(&[fixtures::line("u9", &["a", "b"])]);
        state.reduce(Action::AddLine {
            line: fixtures::line("u9", &["x"]),
        });
        assert_eq!(state.ids, vec!["u9"]);
        assert_eq!(state.line("u9").unwrap().stops.len(), 2);

        state.reduce(Action::UpsertLine {
            line: fixtures::line("u9", &["x"]),
        });
        assert_eq!(state.ids, vec!["u9"]);
        assert_eq!(state.line("u9").unwrap().stops[0].id, "x");
    }

    #[test]
    fn test_delete_line_clears_its_selection() {
        let mut state = state_with(&[
            fixtures::line("u8", &["a", "b"]),
            fixtures::line("u9", &["c", "d"]),
        ]);
        state.reduce(Action::SelectStop {
            selected_stop_id: Some("c".into()),
        });
        state.reduce(Action::DeleteLine { id: "u8".into() });
        assert_eq!(state.selected_stop_id.as_deref(), Some("c"));

        state.reduce(Action::DeleteLine { id: "u9".into() });
        assert!(state.ids.is_empty());
        assert!(state.entities.is_empty());
        assert_eq!(state.selected_stop_id, None);
    }

    #[test]
    fn test_add_stop_links_to_tail() {
        let mut state = state_with(&[fixtures::line("u9", &["a", "b"])]);
        state.reduce(Action::AddStop {
            line_id: "u9".into(),
            stop: fixtures::stop("c", 0),
        });
        let line = state.line("u9").unwrap();
        let ids: Vec<_> = ordering::walk(line)
            .unwrap()
            .iter()
            .map(|s| s.id.clone())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_add_stop_to_unknown_line_is_noop() {
        let mut state = state_with(&[fixtures::line("u9", &["a", "b"])]);
        let before = state.clone();
        state.reduce(Action::AddStop {
            line_id: "u1".into(),
            stop: fixtures::stop("c", 0),
        });
        assert_eq!(state, before);
    }

    #[test]
    fn test_remove_stop_splices_and_clears_selection() {
        let mut state = state_with(&[fixtures::line("u9", &["a", "b", "c"])]);
        state.reduce(Action::SelectStop {
            selected_stop_id: Some("b".into()),
        });
        state.reduce(Action::RemoveStop {
            line_id: "u9".into(),
            stop_id: "b".into(),
        });

        let line = state.line("u9").unwrap();
        assert_eq!(line.stops.len(), 2);
        assert_eq!(line.stops[0].next_id.as_deref(), Some("c"));
        assert_eq!(line.stops[1].prev_id.as_deref(), Some("a"));
        assert_eq!(state.selected_stop_id, None);
    }

    #[test]
    fn test_remove_unknown_stop_keeps_state() {
        let mut state = state_with(&[fixtures::line("u9", &["a", "b"])]);
        state.reduce(Action::SelectStop {
            selected_stop_id: Some("a".into()),
        });
        let before = state.clone();
        state.reduce(Action::RemoveStop {
            line_id: "u9".into(),
            stop_id: "nope".into(),
        });
        assert_eq!(state, before);
    }

    #[test]
    fn test_edit_stop_merges_updates() {
        let mut state = state_with(&[fixtures::line("u9", &["a", "b"])]);
        state.reduce(Action::EditStop {
            line_id: "u9".into(),
            stop_id: "b".into(),
            updates: StopUpdate {
                name: Some("Hauptbahnhof".into()),
                people_on: Some(42),
                ..Default::default()
            },
        });
        let stop = &state.line("u9").unwrap().stops[1];
        assert_eq!(stop.name, "Hauptbahnhof");
        assert_eq!(stop.people_on, 42);
        assert_eq!(stop.prev_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_filter_resets_server_result() {
        let mut state = TransitLinesState::new();
        state.reduce(Action::FilterStops {
            filter: StopFilter {
                people_on: Some(10),
                people_off: Some(0),
                ..Default::default()
            },
        });
        assert_eq!(state.current_filter.people_off, None);

        state.reduce(Action::FilteredStopsLoaded {
            stops: vec![fixtures::stop("a", 20)],
        });
        assert!(state.filtered_stop_ids.as_ref().unwrap().contains("a"));

        state.reduce(Action::FilterStops {
            filter: StopFilter::default(),
        });
        assert_eq!(state.filtered_stop_ids, None);
    }

    #[test]
    fn test_line_changes_drop_server_filter_result() {
        let mut state = state_with(&[fixtures::line("u9", &["a", "b"])]);
        state.reduce(Action::FilterStops {
            filter: StopFilter {
                people_on: Some(50),
                ..Default::default()
            },
        });
        state.reduce(Action::FilteredStopsLoaded {
            stops: vec![fixtures::stop("a", 80)],
        });
        state.reduce(Action::AddStop {
            line_id: "u9".into(),
            stop: fixtures::stop("c", 500),
        });
        assert_eq!(state.filtered_stop_ids, None);

        state.reduce(Action::FilteredStopsLoaded {
            stops: vec![fixtures::stop("c", 500)],
        });
        state.reduce(Action::EditStop {
            line_id: "u9".into(),
            stop_id: "a".into(),
            updates: StopUpdate {
                people_on: Some(100),
                ..Default::default()
            },
        });
        assert_eq!(state.filtered_stop_ids, None);
        assert_eq!(state.current_filter.people_on, Some(50));
    }

    #[test]
    fn test_inverse_of_remove_restores_links() {
        let mut state = state_with(&[fixtures::line("u9", &["a", "b", "c"])]);
        let before = state.clone();
        let remove = Action::RemoveStop {
            line_id: "u9".into(),
            stop_id: "b".into(),
        };
        let undo = state.inverse(&remove).unwrap();
        state.reduce(remove);
        state.reduce(undo.clone());
        assert_eq!(state, before);

        // Already back (e.g. from a fresher server copy): nothing to do
        state.reduce(undo);
        assert_eq!(state, before);
    }

    #[test]
    fn test_inverse_of_remove_keeps_later_appends() {
        let mut state = state_with(&[fixtures::line("u9", &["a", "b"])]);
        let remove = Action::RemoveStop {
            line_id: "u9".into(),
            stop_id: "b".into(),
        };
        let undo = state.inverse(&remove).unwrap();
        state.reduce(remove);
        state.reduce(Action::AddStop {
            line_id: "u9".into(),
            stop: fixtures::stop("c", 0),
        });
        state.reduce(undo);

        let line = state.line("u9").unwrap();
        let ids: Vec<_> = ordering::walk(line)
            .unwrap()
            .iter()
            .map(|s| s.id.clone())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_inverse_of_add_and_edit() {
        let mut state = state_with(&[fixtures::line("u9", &["a", "b"])]);
        let before = state.clone();

        let add = Action::AddStop {
            line_id: "u9".into(),
            stop: fixtures::stop("c", 0),
        };
        let undo = state.inverse(&add).unwrap();
        state.reduce(add);
        state.reduce(undo);
        assert_eq!(state, before);

        let edit = Action::EditStop {
            line_id: "u9".into(),
            stop_id: "a".into(),
            updates: StopUpdate {
                name: Some("Renamed".into()),
                people_off: Some(7),
                ..Default::default()
            },
        };
        let undo = state.inverse(&edit).unwrap();
        state.reduce(edit);
        // A concurrent change to another field survives the undo
        state.reduce(Action::EditStop {
            line_id: "u9".into(),
            stop_id: "a".into(),
            updates: StopUpdate {
                people_on: Some(3),
                ..Default::default()
            },
        });
        state.reduce(undo);
        let stop = &state.line("u9").unwrap().stops[0];
        assert_eq!(stop.name, "Stop a");
        assert_eq!(stop.people_off, 0);
        assert_eq!(stop.people_on, 3);
    }

    #[test]
    fn test_line_of_stop() {
        let state = state_with(&[
            fixtures::line("u8", &["a"]),
            fixtures::line("u9", &["b"]),
        ]);
        assert_eq!(state.line_of_stop("b").unwrap().id, "u9");
        assert!(state.line_of_stop("z").is_none());
    }
}
