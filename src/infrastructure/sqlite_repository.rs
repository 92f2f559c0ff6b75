// SQLite repository implementation
use crate::application::plot_repository::{
    DatabaseStats, NewPlot, PersistenceError, PlotRepository, PlotSummary, QueryResult, StoredPlot,
};
use crate::domain::data_point::{DataPoint, Dataset};
use crate::domain::plot::derive_plot_identifier;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS plots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        doi TEXT NOT NULL,
        figure_number TEXT NOT NULL,
        plot_identifier TEXT UNIQUE NOT NULL,
        image_reference TEXT,
        x_axis_range TEXT,
        y_axis_range TEXT,
        created_at TEXT NOT NULL,
        UNIQUE(doi, figure_number)
    );
    CREATE TABLE IF NOT EXISTS sandstones (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        plot_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        FOREIGN KEY (plot_id) REFERENCES plots(id) ON DELETE CASCADE,
        UNIQUE(plot_id, name)
    );
    CREATE TABLE IF NOT EXISTS data_points (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        sandstone_id INTEGER NOT NULL,
        x_pixel REAL NOT NULL,
        y_pixel REAL NOT NULL,
        x_data REAL NOT NULL,
        y_data REAL NOT NULL,
        FOREIGN KEY (sandstone_id) REFERENCES sandstones(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_sandstones_plot_id ON sandstones(plot_id);
    CREATE INDEX IF NOT EXISTS idx_data_points_sandstone_id ON data_points(sandstone_id);
    CREATE INDEX IF NOT EXISTS idx_plots_doi ON plots(doi);
";

fn storage(e: rusqlite::Error) -> PersistenceError {
    PersistenceError::Storage(e.to_string())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation)
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(t) => serde_json::Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::from(format!("<{} bytes>", b.len())),
    }
}

#[derive(Debug, Clone)]
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path).map_err(storage)?;
        conn.execute_batch("PRAGMA foreign_keys=ON; PRAGMA journal_mode=WAL;")
            .map_err(storage)?;
        tracing::info!("Opened plot database at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs blocking SQLite work off the async runtime
    async fn with_conn<T, F>(&self, f: F) -> Result<T, PersistenceError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, PersistenceError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| PersistenceError::Storage(e.to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| PersistenceError::Task(e.to_string()))?
    }

    fn insert_plot(tx: &Transaction<'_>, plot: &NewPlot) -> Result<i64, PersistenceError> {
        tx.execute(
            "INSERT INTO plots (doi, figure_number, plot_identifier, image_reference, x_axis_range, y_axis_range, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                plot.doi,
                plot.figure_number,
                plot.plot_identifier,
                plot.image_reference,
                plot.x_axis_range,
                plot.y_axis_range,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                PersistenceError::Duplicate(plot.plot_identifier.clone())
            } else {
                storage(e)
            }
        })?;
        let plot_id = tx.last_insert_rowid();

        let mut dataset_stmt = tx
            .prepare("INSERT INTO sandstones (plot_id, name) VALUES (?1, ?2)")
            .map_err(storage)?;
        let mut point_stmt = tx
            .prepare(
                "INSERT INTO data_points (sandstone_id, x_pixel, y_pixel, x_data, y_data)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .map_err(storage)?;

        for dataset in &plot.datasets {
            dataset_stmt
                .execute(params![plot_id, dataset.name])
                .map_err(storage)?;
            let dataset_id = tx.last_insert_rowid();

            for p in &dataset.points {
                point_stmt
                    .execute(params![dataset_id, p.x_pixel, p.y_pixel, p.x_data, p.y_data])
                    .map_err(storage)?;
            }
        }

        Ok(plot_id)
    }

    fn load_datasets(conn: &Connection, plot_id: i64) -> Result<Vec<Dataset>, PersistenceError> {
        let mut stmt = conn
            .prepare(
                "SELECT s.name, dp.x_pixel, dp.y_pixel, dp.x_data, dp.y_data
                 FROM sandstones s
                 LEFT JOIN data_points dp ON s.id = dp.sandstone_id
                 WHERE s.plot_id = ?1
                 ORDER BY s.id, dp.id",
            )
            .map_err(storage)?;
        let rows = stmt
            .query_map(params![plot_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                ))
            })
            .map_err(storage)?;

        let mut datasets: Vec<Dataset> = Vec::new();
        for row in rows {
            let (name, x_pixel, y_pixel, x_data, y_data) = row.map_err(storage)?;
            if datasets.last().map(|d| d.name != name).unwrap_or(true) {
                datasets.push(Dataset::new(name.clone(), Vec::new()));
            }
            // A dataset without points comes back as a single row of NULLs
            if let (Some(xp), Some(yp), Some(xd), Some(yd), Some(current)) =
                (x_pixel, y_pixel, x_data, y_data, datasets.last_mut())
            {
                current.points.push(DataPoint::new(name, xp, yp, xd, yd));
            }
        }
        Ok(datasets)
    }
}

#[async_trait]
impl PlotRepository for SqliteRepository {
    async fn initialise(&self) -> Result<(), PersistenceError> {
        self.with_conn(|conn| {
            conn.execute_batch(SCHEMA).map_err(storage)?;
            tracing::info!("Plot database schema created or verified");
            Ok(())
        })
        .await
    }

    async fn plot_exists(&self, doi: &str, figure_number: &str) -> Result<bool, PersistenceError> {
        let plot_identifier = derive_plot_identifier(doi, figure_number);
        let doi = doi.to_string();
        let figure_number = figure_number.to_string();
        self.with_conn(move |conn| {
            // Distinct figure spellings such as "1.a" and "1_a" share an identifier
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM plots
                     WHERE (doi = ?1 AND figure_number = ?2) OR plot_identifier = ?3",
                    params![doi, figure_number, plot_identifier],
                    |row| row.get(0),
                )
                .map_err(storage)?;
            Ok(count > 0)
        })
        .await
    }

    async fn save_plot(&self, plot: NewPlot) -> Result<i64, PersistenceError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(storage)?;
            // Dropping `tx` on the error path rolls everything back
            let plot_id = match Self::insert_plot(&tx, &plot) {
                Ok(id) => id,
                Err(e) => {
                    tracing::error!("Error saving plot {}: {}", plot.plot_identifier, e);
                    return Err(e);
                }
            };
            tx.commit().map_err(storage)?;
            tracing::info!(
                "Plot '{}' saved with ID {} ({} datasets)",
                plot.plot_identifier,
                plot_id,
                plot.datasets.len()
            );
            Ok(plot_id)
        })
        .await
    }

    async fn list_plots(&self) -> Result<Vec<PlotSummary>, PersistenceError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT p.id, p.doi, p.figure_number, p.plot_identifier, p.x_axis_range, p.y_axis_range,
                            p.created_at, COUNT(DISTINCT s.id), COUNT(dp.id)
                     FROM plots p
                     LEFT JOIN sandstones s ON p.id = s.plot_id
                     LEFT JOIN data_points dp ON s.id = dp.sandstone_id
                     GROUP BY p.id
                     ORDER BY p.created_at DESC, p.id DESC",
                )
                .map_err(storage)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(PlotSummary {
                        id: row.get(0)?,
                        doi: row.get(1)?,
                        figure_number: row.get(2)?,
                        plot_identifier: row.get(3)?,
                        x_axis_range: row.get(4)?,
                        y_axis_range: row.get(5)?,
                        created_at: parse_timestamp(row.get(6)?),
                        dataset_count: row.get(7)?,
                        total_points: row.get(8)?,
                    })
                })
                .map_err(storage)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(storage)
        })
        .await
    }

    async fn get_plot(&self, id: i64) -> Result<Option<StoredPlot>, PersistenceError> {
        self.with_conn(move |conn| {
            let plot = conn
                .query_row(
                    "SELECT id, doi, figure_number, plot_identifier, image_reference, x_axis_range, y_axis_range, created_at
                     FROM plots WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(StoredPlot {
                            id: row.get(0)?,
                            doi: row.get(1)?,
                            figure_number: row.get(2)?,
                            plot_identifier: row.get(3)?,
                            image_reference: row.get(4)?,
                            x_axis_range: row.get(5)?,
                            y_axis_range: row.get(6)?,
                            created_at: parse_timestamp(row.get(7)?),
                            datasets: Vec::new(),
                        })
                    },
                )
                .optional()
                .map_err(storage)?;

            match plot {
                Some(mut plot) => {
                    plot.datasets = Self::load_datasets(conn, id)?;
                    Ok(Some(plot))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn delete_plot(&self, id: i64) -> Result<bool, PersistenceError> {
        self.with_conn(move |conn| {
            let affected = conn
                .execute("DELETE FROM plots WHERE id = ?1", params![id])
                .map_err(storage)?;
            if affected > 0 {
                tracing::info!("Plot {} deleted", id);
            }
            Ok(affected > 0)
        })
        .await
    }

    async fn database_stats(&self) -> Result<DatabaseStats, PersistenceError> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<i64, PersistenceError> {
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                    .map_err(storage)
            };
            Ok(DatabaseStats {
                plots: count("plots")?,
                datasets: count("sandstones")?,
                data_points: count("data_points")?,
            })
        })
        .await
    }

    async fn run_read_only(&self, sql: &str, max_rows: u64) -> Result<QueryResult, PersistenceError> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(storage)?;
            if !stmt.readonly() {
                return Err(PersistenceError::Storage(
                    "statement would modify the database".to_string(),
                ));
            }
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let column_count = columns.len();

            let max_rows = usize::try_from(max_rows).unwrap_or(usize::MAX);
            let mut result_rows = Vec::new();
            let mut truncated = false;
            let mut rows = stmt.query([]).map_err(storage)?;
            while let Some(row) = rows.next().map_err(storage)? {
                if result_rows.len() == max_rows {
                    truncated = true;
                    break;
                }
                let mut values = Vec::with_capacity(column_count);
                for idx in 0..column_count {
                    values.push(value_to_json(row.get_ref(idx).map_err(storage)?));
                }
                result_rows.push(values);
            }

            tracing::debug!("Query returned {} rows (truncated: {})", result_rows.len(), truncated);
            Ok(QueryResult {
                columns,
                row_count: result_rows.len(),
                rows: result_rows,
                truncated,
            })
        })
        .await
    }
}
