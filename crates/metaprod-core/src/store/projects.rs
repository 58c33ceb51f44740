//! Projects and project settings

use super::Store;
use crate::error::{PipelineError, Result};
use crate::settings::ProjectSettings;
use serde::{Deserialize, Serialize};
use sqlx::Row;

/// A named collection of input files processed with one set of settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub name: String,
    pub description: String,
    pub created_at: String,
}

impl Store {
    pub async fn create_project(&self, name: &str, description: &str) -> Result<Project> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(PipelineError::configuration(format!(
                "Invalid project name '{}'",
                name
            )));
        }

        let result = sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects (name, description)
            VALUES (?1, ?2)
            RETURNING name, description, created_at
            "#,
        )
        .bind(name)
        .bind(description)
        .fetch_one(self.pool())
        .await;

        match result {
            Ok(project) => Ok(project),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(PipelineError::duplicate("project", name))
            },
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_project(&self, name: &str) -> Result<Project> {
        sqlx::query_as::<_, Project>(
            "SELECT name, description, created_at FROM projects WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| PipelineError::not_found("project", name))
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let projects = sqlx::query_as::<_, Project>(
            "SELECT name, description, created_at FROM projects ORDER BY name",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(projects)
    }

    /// Store settings for a project, replacing any previous version.
    pub async fn save_settings(&self, project: &str, settings: &ProjectSettings) -> Result<()> {
        settings.validate()?;
        self.get_project(project).await?;

        sqlx::query(
            r#"
            INSERT INTO project_settings (project, settings, updated_at)
            VALUES (?1, ?2, datetime('now'))
            ON CONFLICT(project) DO UPDATE SET
                settings = excluded.settings,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(project)
        .bind(settings.to_json()?)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Settings of a project. Missing settings are a configuration failure.
    pub async fn project_settings(&self, project: &str) -> Result<ProjectSettings> {
        let row = sqlx::query("SELECT settings FROM project_settings WHERE project = ?1")
            .bind(project)
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(row) => {
                let text: String = row.get("settings");
                ProjectSettings::from_json(&text)
            },
            None => Err(PipelineError::configuration(format!(
                "Project '{}' has no settings; run 'metaprod project settings {}' first",
                project, project
            ))),
        }
    }

    /// Delete every work item of a project together with everything derived
    /// from them. The project and its settings are kept.
    pub async fn reset_project(&self, project: &str) -> Result<u64> {
        self.get_project(project).await?;

        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM species_summaries WHERE project = ?1")
            .bind(project)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM work_items WHERE project = ?1")
            .bind(project)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        tracing::info!(project = %project, deleted = deleted, "Project reset");
        Ok(deleted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::test_support::{add_item, store_with_project};

    #[tokio::test]
    async fn test_create_and_get_project() {
        let store = Store::open_in_memory().await.unwrap();
        let created = store.create_project("gut", "gut microbiome").await.unwrap();
        assert_eq!(created.name, "gut");

        let fetched = store.get_project("gut").await.unwrap();
        assert_eq!(fetched.description, "gut microbiome");
        assert_eq!(store.list_projects().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_project_is_rejected() {
        let store = store_with_project().await;
        let err = store.create_project("soil", "again").await.unwrap_err();
        assert!(matches!(err, PipelineError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_project_name_with_separator_is_rejected() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(store.create_project("a/b", "").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_settings_is_configuration_failure() {
        let store = Store::open_in_memory().await.unwrap();
        store.create_project("bare", "").await.unwrap();
        let err = store.project_settings("bare").await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_settings_are_replaced() {
        let store = store_with_project().await;
        let settings = ProjectSettings {
            multiplex: true,
            ..Default::default()
        };
        store.save_settings("soil", &settings).await.unwrap();
        assert!(store.project_settings("soil").await.unwrap().multiplex);
    }

    #[tokio::test]
    async fn test_reset_project_deletes_items() {
        let store = store_with_project().await;
        add_item(&store, "run01", 0).await;
        add_item(&store, "run02", 1).await;

        assert_eq!(store.reset_project("soil").await.unwrap(), 2);
        assert!(store.items_in_project("soil").await.unwrap().is_empty());
        // project itself survives
        store.get_project("soil").await.unwrap();
    }
}
