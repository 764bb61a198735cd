use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use duckdb::{params, params_from_iter, Connection, Row};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::MetricRegistry;
use crate::models::{MetricType, NewMetricType};
use crate::{GatewayError, Result};

const SCHEMA: &str = "
    CREATE SEQUENCE IF NOT EXISTS metric_types_id_seq START 1;
    CREATE TABLE IF NOT EXISTS metric_types (
        id BIGINT PRIMARY KEY,
        name VARCHAR NOT NULL,
        description VARCHAR NOT NULL,
        backend_identifiers VARCHAR NOT NULL,
        unit VARCHAR,
        is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
        created_by BIGINT,
        created_at BIGINT NOT NULL,
        updated_by BIGINT,
        updated_at BIGINT
    );
";

const COLUMNS: &str = "id, name, description, backend_identifiers, unit, is_deleted, \
                       created_by, created_at, updated_by, updated_at";

/// Metric types persisted in DuckDB. Identifier lists are stored as JSON arrays.
#[derive(Clone)]
pub struct DuckDbMetricRegistry {
    db: Arc<Mutex<Connection>>,
}

/// Row as read from DuckDB, before the identifier column is decoded.
struct StoredRow {
    id: i64,
    name: String,
    description: String,
    backend_identifiers: String,
    unit: Option<String>,
    is_deleted: bool,
    created_by: Option<i64>,
    created_at: i64,
    updated_by: Option<i64>,
    updated_at: Option<i64>,
}

impl StoredRow {
    fn read(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            backend_identifiers: row.get(3)?,
            unit: row.get(4)?,
            is_deleted: row.get(5)?,
            created_by: row.get(6)?,
            created_at: row.get(7)?,
            updated_by: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_metric_type(self) -> Result<MetricType> {
        let backend_identifiers: Vec<String> = serde_json::from_str(&self.backend_identifiers)
            .map_err(|e| {
                GatewayError::Database(format!(
                    "Corrupt identifier list for metric type {}: {}",
                    self.id, e
                ))
            })?;

        Ok(MetricType {
            id: self.id,
            name: self.name,
            description: self.description,
            backend_identifiers,
            unit: self.unit,
            soft_deleted: self.is_deleted,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_by: self.updated_by,
            updated_at: self.updated_at,
        })
    }
}

impl DuckDbMetricRegistry {
    pub fn open(path: &str) -> Result<Self> {
        info!("Opening metric type store at {}", path);
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn select_one(conn: &Connection, id: i64, include_deleted: bool) -> Result<Option<MetricType>> {
        let sql = if include_deleted {
            format!("SELECT {} FROM metric_types WHERE id = ?", COLUMNS)
        } else {
            format!(
                "SELECT {} FROM metric_types WHERE id = ? AND NOT is_deleted",
                COLUMNS
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id])?;

        match rows.next()? {
            Some(row) => Ok(Some(StoredRow::read(row)?.into_metric_type()?)),
            None => Ok(None),
        }
    }
}

fn normalized_identifiers(new: &NewMetricType) -> Result<String> {
    let identifiers: Vec<&str> = new
        .backend_identifiers
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .collect();
    Ok(serde_json::to_string(&identifiers)?)
}

fn normalized_unit(new: &NewMetricType) -> Option<String> {
    new.unit
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl MetricRegistry for DuckDbMetricRegistry {
    async fn resolve(&self, ids: &[i64]) -> Result<HashMap<i64, MetricType>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM metric_types WHERE id IN ({})",
            COLUMNS, placeholders
        );

        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter().copied()), StoredRow::read)?;

        let mut found = HashMap::with_capacity(ids.len());
        for row in rows {
            let metric_type = row?.into_metric_type()?;
            found.insert(metric_type.id, metric_type);
        }

        debug!("Resolved {} of {} metric types", found.len(), ids.len());
        Ok(found)
    }

    async fn list(&self) -> Result<Vec<MetricType>> {
        let conn = self.db.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM metric_types WHERE NOT is_deleted ORDER BY id",
            COLUMNS
        ))?;
        let rows = stmt.query_map(params![], StoredRow::read)?;

        let mut metric_types = Vec::new();
        for row in rows {
            metric_types.push(row?.into_metric_type()?);
        }
        Ok(metric_types)
    }

    async fn get(&self, id: i64) -> Result<Option<MetricType>> {
        let conn = self.db.lock().await;
        Self::select_one(&conn, id, false)
    }

    async fn create(&self, new: NewMetricType, actor: Option<i64>) -> Result<MetricType> {
        new.validate()?;
        let identifiers = normalized_identifiers(&new)?;

        let conn = self.db.lock().await;
        let id: i64 = conn.query_row("SELECT nextval('metric_types_id_seq')", params![], |row| {
            row.get(0)
        })?;
        conn.execute(
            "INSERT INTO metric_types
                (id, name, description, backend_identifiers, unit, is_deleted, created_by, created_at)
             VALUES (?, ?, ?, ?, ?, FALSE, ?, ?)",
            params![
                id,
                new.name.trim(),
                new.description,
                identifiers,
                normalized_unit(&new),
                actor,
                Utc::now().timestamp(),
            ],
        )?;

        info!("Created metric type {} ({})", id, new.name.trim());
        Self::select_one(&conn, id, true)?
            .ok_or_else(|| GatewayError::Internal(format!("Metric type {} vanished after insert", id)))
    }

    async fn update(
        &self,
        id: i64,
        new: NewMetricType,
        actor: Option<i64>,
    ) -> Result<Option<MetricType>> {
        new.validate()?;
        let identifiers = normalized_identifiers(&new)?;

        let conn = self.db.lock().await;
        let changed = conn.execute(
            "UPDATE metric_types
             SET name = ?, description = ?, backend_identifiers = ?, unit = ?,
                 updated_by = ?, updated_at = ?
             WHERE id = ? AND NOT is_deleted",
            params![
                new.name.trim(),
                new.description,
                identifiers,
                normalized_unit(&new),
                actor,
                Utc::now().timestamp(),
                id,
            ],
        )?;

        if changed == 0 {
            return Ok(None);
        }
        info!("Updated metric type {}", id);
        Self::select_one(&conn, id, false)
    }

    async fn soft_delete(&self, id: i64, actor: Option<i64>) -> Result<()> {
        let conn = self.db.lock().await;
        let changed = conn.execute(
            "UPDATE metric_types
             SET is_deleted = TRUE, updated_by = ?, updated_at = ?
             WHERE id = ? AND NOT is_deleted",
            params![actor, Utc::now().timestamp(), id],
        )?;

        if changed == 0 {
            return Err(GatewayError::NotFound(format!(
                "Metric type with ID {} not found",
                id
            )));
        }
        info!("Soft-deleted metric type {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn new_metric(name: &str, identifiers: &[&str], unit: Option<&str>) -> NewMetricType {
        NewMetricType {
            name: name.to_string(),
            description: format!("{} description", name),
            backend_identifiers: identifiers.iter().map(|s| s.to_string()).collect(),
            unit: unit.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let registry = DuckDbMetricRegistry::open_in_memory().unwrap();
        let cpu = registry
            .create(new_metric("CPU", &["cpu_pct", " mem_pct ", ""], Some("%")), Some(3))
            .await
            .unwrap();
        let temp = registry
            .create(new_metric("Temperature", &["node_temp"], Some("  ")), None)
            .await
            .unwrap();

        assert_eq!(cpu.backend_identifiers, vec!["cpu_pct", "mem_pct"]);
        assert_eq!(cpu.unit.as_deref(), Some("%"));
        assert_eq!(cpu.created_by, Some(3));
        assert_eq!(temp.unit, None);
        assert!(temp.id > cpu.id);

        let listed = registry.list().await.unwrap();
        assert_eq!(listed, vec![cpu, temp]);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_payload() {
        let registry = DuckDbMetricRegistry::open_in_memory().unwrap();
        let result = registry.create(new_metric("CPU", &["  "], None), None).await;
        assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
        assert!(registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_reports_only_found_ids() {
        let registry = DuckDbMetricRegistry::open_in_memory().unwrap();
        let cpu = registry
            .create(new_metric("CPU", &["cpu_pct"], None), None)
            .await
            .unwrap();

        let found = registry.resolve(&[cpu.id, 999]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found.get(&cpu.id), Some(&cpu));
        assert!(registry.resolve(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_soft_delete_hides_from_list_but_still_resolves() {
        let registry = DuckDbMetricRegistry::open_in_memory().unwrap();
        let cpu = registry
            .create(new_metric("CPU", &["cpu_pct"], None), None)
            .await
            .unwrap();

        registry.soft_delete(cpu.id, Some(7)).await.unwrap();

        assert!(registry.list().await.unwrap().is_empty());
        assert_eq!(registry.get(cpu.id).await.unwrap(), None);

        let resolved = registry.resolve(&[cpu.id]).await.unwrap();
        let deleted = &resolved[&cpu.id];
        assert!(deleted.soft_deleted);
        assert_eq!(deleted.updated_by, Some(7));

        let again = registry.soft_delete(cpu.id, None).await;
        assert!(matches!(again, Err(GatewayError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update() {
        let registry = DuckDbMetricRegistry::open_in_memory().unwrap();
        let cpu = registry
            .create(new_metric("CPU", &["cpu_pct"], None), None)
            .await
            .unwrap();

        let updated = registry
            .update(cpu.id, new_metric("CPU usage", &["cpu_seconds"], Some("s")), Some(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "CPU usage");
        assert_eq!(updated.backend_identifiers, vec!["cpu_seconds"]);
        assert_eq!(updated.unit.as_deref(), Some("s"));
        assert_eq!(updated.updated_by, Some(2));
        assert!(updated.updated_at.is_some());

        let missing = registry
            .update(999, new_metric("x", &["x"], None), None)
            .await
            .unwrap();
        assert_eq!(missing, None);
    }
}
