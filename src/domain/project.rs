use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::ProjectId;

/// A working directory tasks run in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(id: impl Into<ProjectId>, path: impl Into<PathBuf>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            path: path.into(),
            created_at: Utc::now(),
        }
    }
}
