//! Editing flows. Each public method is one user interaction: it validates input,
//! updates the store, talks to the backend and keeps the two consistent.
//!
//! Stop edits are optimistic. The store changes first so the map updates at once;
//! the backend's answer then replaces the line, or the previous line is put back
//! if the request fails.

use crate::api::{ApiClient, ApiError};
use crate::config::BoundingBox;
use crate::forms::{FieldError, LineForm, StopForm};
use crate::ordering;
use crate::persistence::{self, Session};
use crate::selectors;
use crate::state::{Action, TransitLinesState};
use crate::transit_types::{StopFilter, TransitLine, VisualizationProperty};
use log::{info, warn};
use std::future::Future;
use std::path::PathBuf;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("{}", join_fields(.0))]
    Validation(Vec<FieldError>),
    #[error("At least 2 stops are required to create a line")]
    TooFewStops,
    #[error("Line {0} already exists")]
    LineExists(String),
    #[error("Line {0} not found")]
    LineNotFound(String),
    #[error("Stop {0} not found")]
    StopNotFound(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl EditorError {
    pub fn status_code(&self) -> u16 {
        match self {
            EditorError::Validation(_) | EditorError::TooFewStops => 400,
            EditorError::LineExists(_) => 409,
            EditorError::LineNotFound(_) | EditorError::StopNotFound(_) => 404,
            EditorError::Api(e) => e.status_code(),
        }
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            EditorError::Validation(errors) => errors,
            _ => &[],
        }
    }
}

pub struct Editor {
    api: ApiClient,
    state: RwLock<TransitLinesState>,
    region: BoundingBox,
    session_dir: PathBuf,
}

impl Editor {
    pub fn new(api: ApiClient, region: BoundingBox, session_dir: PathBuf) -> Self {
        Self {
            api,
            state: RwLock::new(TransitLinesState::new()),
            region,
            session_dir,
        }
    }

    /// Runs a selector against the current state.
    pub async fn read<R>(&self, f: impl FnOnce(&TransitLinesState) -> R) -> R {
        let state = self.state.read().await;
        f(&state)
    }

    async fn dispatch(&self, action: Action) {
        self.state.write().await.reduce(action);
    }

    async fn persist_session(&self) {
        let session = self.read(Session::from_state).await;
        if let Err(e) = persistence::save_session(&session, &self.session_dir) {
            warn!("Failed to save session: {:#}", e);
        }
    }

    /// Re-applies the view settings of the previous run.
    pub async fn restore_session(&self) -> anyhow::Result<()> {
        let Some(session) = persistence::load_session(&self.session_dir)? else {
            return Ok(());
        };
        self.dispatch(Action::SetVisualizationProperty {
            property: session.visualization_property,
        })
        .await;
        self.dispatch(Action::FilterStops {
            filter: session.current_filter,
        })
        .await;
        self.dispatch(Action::SelectStop {
            selected_stop_id: session.selected_stop_id,
        })
        .await;
        Ok(())
    }

    /// Initial load from the backend: all lines, or just `only`.
    pub async fn load_lines(&self, only: Option<&str>) -> Result<usize, EditorError> {
        let lines = match only {
            Some(id) => vec![self.api.get_transit_line(id).await?],
            None => self.api.get_transit_lines().await?,
        };
        let count = lines.len();
        for line in lines {
            self.dispatch(Action::AddLine { line }).await;
        }
        info!("Loaded {} transit line(s)", count);

        // A restored selection may point at a stop deleted meanwhile
        let stale = self
            .read(|s| s.selected_stop_id.is_some() && selectors::selected_stop(s).is_none())
            .await;
        if stale {
            self.dispatch(Action::SelectStop {
                selected_stop_id: None,
            })
            .await;
            self.persist_session().await;
        }

        let filter = self.read(|s| s.current_filter.clone()).await;
        if !filter.is_empty() {
            if let Err(e) = self.filter_stops(filter).await {
                warn!("Could not refresh restored filter: {}", e);
            }
        }
        Ok(count)
    }

    pub async fn create_line(&self, form: &LineForm, stop_forms: &[StopForm]) -> Result<TransitLine, EditorError> {
        let id = form.validate().map_err(EditorError::Validation)?;
        if stop_forms.len() < 2 {
            return Err(EditorError::TooFewStops);
        }

        let mut errors = Vec::new();
        let mut stops = Vec::new();
        for stop_form in stop_forms {
            match stop_form.validate(&self.region) {
                Ok(fields) => stops.push(fields.into_new_stop()),
                Err(e) => errors.extend(e),
            }
        }
        if !errors.is_empty() {
            return Err(EditorError::Validation(errors));
        }

        if self.read(|s| s.line(&id).is_some()).await {
            return Err(EditorError::LineExists(id));
        }

        ordering::link_in_order(&mut stops);
        let line = self.api.create_transit_line(&id, &stops).await?;
        info!("Created line {} with {} stops", line.id, line.stops.len());
        self.dispatch(Action::UpsertLine { line: line.clone() }).await;
        Ok(line)
    }

    pub async fn delete_line(&self, id: &str) -> Result<(), EditorError> {
        if self.read(|s| s.line(id).is_none()).await {
            return Err(EditorError::LineNotFound(id.to_string()));
        }
        self.api.delete_transit_line(id).await?;
        self.dispatch(Action::DeleteLine { id: id.to_string() }).await;
        self.persist_session().await;
        info!("Deleted line {}", id);
        Ok(())
    }

    /// Applies `action` locally, then reconciles with the backend's version of the line.
    /// On failure only `action` is taken back; edits that landed meanwhile stay.
    async fn optimistic<F, Fut>(&self, line_id: &str, action: Action, request: F) -> Result<TransitLine, EditorError>
    where
        F: FnOnce(TransitLine) -> Fut,
        Fut: Future<Output = Result<TransitLine, ApiError>>,
    {
        let (undo, selected_before, selected_after, optimistic) = {
            let mut state = self.state.write().await;
            if state.line(line_id).is_none() {
                return Err(EditorError::LineNotFound(line_id.to_string()));
            }
            let undo = state.inverse(&action);
            let selected_before = state.selected_stop_id.clone();
            state.reduce(action);
            let selected_after = state.selected_stop_id.clone();
            let optimistic = state
                .line(line_id)
                .cloned()
                .ok_or_else(|| EditorError::LineNotFound(line_id.to_string()))?;
            (undo, selected_before, selected_after, optimistic)
        };

        match request(optimistic).await {
            Ok(line) => {
                self.dispatch(Action::UpsertLine { line: line.clone() }).await;
                Ok(line)
            }
            Err(e) => {
                warn!("Rolling back change to line {} after failed request: {}", line_id, e);
                let mut state = self.state.write().await;
                if let Some(undo) = undo {
                    state.reduce(undo);
                }
                // Keep a selection the user made while the request was running
                if state.selected_stop_id == selected_after {
                    state.reduce(Action::SelectStop {
                        selected_stop_id: selected_before,
                    });
                }
                Err(e.into())
            }
        }
    }

    async fn ensure_stop(&self, line_id: &str, stop_id: &str) -> Result<(), EditorError> {
        self.read(|s| match s.line(line_id) {
            None => Err(EditorError::LineNotFound(line_id.to_string())),
            Some(line) if !line.stops.iter().any(|st| st.id == stop_id) => {
                Err(EditorError::StopNotFound(stop_id.to_string()))
            }
            Some(_) => Ok(()),
        })
        .await
    }

    /// Appends a stop at the end of the line.
    pub async fn add_stop(&self, line_id: &str, form: &StopForm) -> Result<TransitLine, EditorError> {
        let stop = form
            .validate(&self.region)
            .map_err(EditorError::Validation)?
            .into_new_stop();
        let stop_id = stop.id.clone();

        let api = &self.api;
        self.optimistic(
            line_id,
            Action::AddStop {
                line_id: line_id.to_string(),
                stop,
            },
            |line| async move {
                // The locally linked copy carries the new prev pointer
                let linked = line
                    .stops
                    .iter()
                    .find(|s| s.id == stop_id)
                    .cloned()
                    .ok_or_else(|| ApiError::Validation(format!("Stop {} was not added", stop_id)))?;
                api.add_stop(line_id, &linked).await
            },
        )
        .await
    }

    pub async fn edit_stop(&self, line_id: &str, stop_id: &str, form: &StopForm) -> Result<TransitLine, EditorError> {
        let updates = form
            .validate(&self.region)
            .map_err(EditorError::Validation)?
            .into_update();
        self.ensure_stop(line_id, stop_id).await?;

        let api = &self.api;
        let body = updates.clone();
        self.optimistic(
            line_id,
            Action::EditStop {
                line_id: line_id.to_string(),
                stop_id: stop_id.to_string(),
                updates,
            },
            |_| async move { api.update_stop(line_id, stop_id, &body).await },
        )
        .await
    }

    pub async fn remove_stop(&self, line_id: &str, stop_id: &str) -> Result<TransitLine, EditorError> {
        self.ensure_stop(line_id, stop_id).await?;

        let api = &self.api;
        let line = self
            .optimistic(
                line_id,
                Action::RemoveStop {
                    line_id: line_id.to_string(),
                    stop_id: stop_id.to_string(),
                },
                |_| async move { api.remove_stop(line_id, stop_id).await },
            )
            .await?;
        self.persist_session().await;
        Ok(line)
    }

    pub async fn select_stop(&self, stop_id: Option<String>) -> Result<(), EditorError> {
        if let Some(id) = &stop_id {
            let known = self
                .read(|s| selectors::all_stops(s).iter().any(|st| &st.id == id))
                .await;
            if !known {
                return Err(EditorError::StopNotFound(id.clone()));
            }
        }
        self.dispatch(Action::SelectStop {
            selected_stop_id: stop_id,
        })
        .await;
        self.persist_session().await;
        Ok(())
    }

    pub async fn set_visualization(&self, property: VisualizationProperty) {
        self.dispatch(Action::SetVisualizationProperty { property }).await;
        self.persist_session().await;
    }

    /// Applies a filter; returns how many stops stay visible.
    pub async fn filter_stops(&self, filter: StopFilter) -> Result<usize, EditorError> {
        let filter = filter.normalized();
        self.dispatch(Action::FilterStops {
            filter: filter.clone(),
        })
        .await;
        self.persist_session().await;

        if !filter.is_empty() {
            let stops = self.api.get_filtered_stops(&filter).await?;
            let mut state = self.state.write().await;
            // Ignore answers to a filter that was replaced while waiting
            if state.current_filter == filter {
                state.reduce(Action::FilteredStopsLoaded { stops });
            }
        }
        Ok(self.read(|s| selectors::visible_stops(s).len()).await)
    }

    pub async fn clear_filter(&self) {
        self.dispatch(Action::FilterStops {
            filter: StopFilter::default(),
        })
        .await;
        self.persist_session().await;
    }
}
