use crate::state::TransitLinesState;
use crate::transit_types::{StopFilter, VisualizationProperty};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const SESSION_FILE: &str = "session.bin";

/// View settings that survive a restart. Lines themselves live in the backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub selected_stop_id: Option<String>,
    pub visualization_property: VisualizationProperty,
    pub current_filter: StopFilter,
}

impl Session {
    pub fn from_state(state: &TransitLinesState) -> Self {
        Self {
            selected_stop_id: state.selected_stop_id.clone(),
            visualization_property: state.visualization_property,
            current_filter: state.current_filter.clone(),
        }
    }
}

pub fn save_session(session: &Session, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Creating {}", dir.display()))?;

    // Written via a temp file; session.bin is replaced whole or not at all
    let path = dir.join(SESSION_FILE);
    let tmp_path = dir.join(format!("{}.tmp", SESSION_FILE));
    let mut writer = BufWriter::new(File::create(&tmp_path)?);
    bincode::serialize_into(&mut writer, session)?;
    writer.flush()?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// Returns `None` when no session was saved yet.
pub fn load_session(dir: &Path) -> Result<Option<Session>> {
    let path = dir.join(SESSION_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let f = File::open(&path)?;
    let session: Session = bincode::deserialize_from(f)
        .with_context(|| format!("Decoding {}", path.display()))?;
    log::info!(
        "Loaded session: selected stop {:?}, visualization {:?}",
        session.selected_stop_id,
        session.visualization_property
    );
    Ok(Some(session))
}
