//! Project commands

use std::path::Path;

use anyhow::{Context, Result};

use taskrail::Project;

use super::App;

pub async fn add(app: &App, id: &str, path: &Path, name: Option<String>) -> Result<()> {
    let path = path
        .canonicalize()
        .with_context(|| format!("Project path does not exist: {}", path.display()))?;
    let mut project = Project::new(id, path);
    if let Some(name) = name {
        project.name = name;
    }
    app.machine.store().save_project(&project).await?;
    println!("Added project {} at {}", project.id, project.path.display());
    Ok(())
}

pub async fn list(app: &App, json: bool) -> Result<()> {
    let projects = app.machine.store().list_projects().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&projects)?);
        return Ok(());
    }
    if projects.is_empty() {
        println!("No projects.");
    }
    for project in projects {
        println!("{}  {}  {}", project.id, project.name, project.path.display());
    }
    Ok(())
}
