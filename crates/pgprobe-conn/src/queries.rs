//! Custom query lookup table.
//!
//! Every `*.sql` file under a directory becomes one named query; the name is
//! the path relative to the directory, `/`-separated, without the extension.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info};
use walkdir::WalkDir;

/// File extension of custom query files.
pub const SQL_EXT: &str = ".sql";

/// Shared, hot-reloadable map of query name → SQL text.
#[derive(Debug, Default)]
pub struct QueryStorage {
    dir: Option<PathBuf>,
    queries: RwLock<Arc<HashMap<String, String>>>,
}

impl QueryStorage {
    /// A table with no queries and nothing to reload.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_map(queries: HashMap<String, String>) -> Self {
        Self {
            dir: None,
            queries: RwLock::new(Arc::new(queries)),
        }
    }

    /// Load every `*.sql` file under `dir`.
    pub fn load(dir: &Path) -> std::io::Result<Self> {
        let queries = read_dir(dir)?;
        info!(path = %dir.display(), count = queries.len(), "custom queries loaded");
        Ok(Self {
            dir: Some(dir.to_path_buf()),
            queries: RwLock::new(Arc::new(queries)),
        })
    }

    /// Load from `dir` if given; fall back to an empty table (logging why)
    /// when it cannot be read.
    pub fn load_or_empty(dir: Option<&Path>) -> Self {
        match dir {
            None => Self::empty(),
            Some(dir) => Self::load(dir).unwrap_or_else(|e| {
                error!(path = %dir.display(), error = %e, "cannot load custom queries");
                Self {
                    dir: Some(dir.to_path_buf()),
                    queries: RwLock::default(),
                }
            }),
        }
    }

    /// Re-read the directory and swap the table in one step. Readers see
    /// either the old or the new table, never a mix.
    pub async fn reload(&self) -> std::io::Result<usize> {
        let Some(dir) = &self.dir else {
            return Ok(0);
        };
        let queries = read_dir(dir)?;
        let count = queries.len();
        *self.queries.write().await = Arc::new(queries);
        info!(path = %dir.display(), count, "custom queries reloaded");
        Ok(count)
    }

    /// SQL text of query `name` (without extension).
    pub async fn get(&self, name: &str) -> Option<String> {
        self.queries
            .read()
            .await
            .get(&format!("{name}{SQL_EXT}"))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.queries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Trim surrounding whitespace and trailing semicolons.
pub fn normalize_sql(sql: &str) -> &str {
    sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

fn read_dir(dir: &Path) -> std::io::Result<HashMap<String, String>> {
    let mut queries = HashMap::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(std::io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(&SQL_EXT[1..]) {
            continue;
        }
        let Ok(rel) = path.strip_prefix(dir) else {
            continue;
        };
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let sql = std::fs::read_to_string(path)?;
        debug!(name = %name, "custom query file read");
        queries.insert(name, sql);
    }
    Ok(queries)
}
