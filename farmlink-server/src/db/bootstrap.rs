use std::cmp::Ordering;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info, warn};

use shared::config::server::DatabaseConfig;

const STAGES: &[(&str, ScriptStage)] = &[
    ("schema", ScriptStage::Schema),
    ("procedures", ScriptStage::Procedures),
    ("indexes", ScriptStage::Indexes),
    ("seed", ScriptStage::Seed),
];

#[derive(Debug, Clone, Copy)]
enum ScriptStage {
    Schema,
    Procedures,
    Indexes,
    Seed,
}

impl ScriptStage {
    fn label(self) -> &'static str {
        match self {
            ScriptStage::Schema => "schema",
            ScriptStage::Procedures => "procedures",
            ScriptStage::Indexes => "indexes",
            ScriptStage::Seed => "seed",
        }
    }
}

impl std::fmt::Display for ScriptStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database bootstrap directory does not exist: {0}")]
    MissingRoot(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("database error executing {path}: {source}")]
    Sql {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },
}

/// Applies the chat schema, notify trigger, indexes and seed data, in that
/// order. Every script is idempotent, so this runs on each start.
pub async fn run(pool: &PgPool, config: &DatabaseConfig) -> Result<(), BootstrapError> {
    let root = &config.bootstrap_path;
    if !root.exists() {
        return Err(BootstrapError::MissingRoot(root.clone()));
    }

    info!(path = %root.display(), "running database bootstrap");

    for (folder, stage) in STAGES {
        let stage_path = root.join(folder);
        if !stage_path.exists() {
            debug!(stage = %stage, "bootstrap stage directory absent; skipping");
            continue;
        }

        let files = collect_sql_files(&stage_path)?;
        if files.is_empty() {
            debug!(stage = %stage, "no bootstrap scripts found for stage");
            continue;
        }

        info!(stage = %stage, count = files.len(), "applying bootstrap scripts");
        for path in files {
            apply_script(pool, &path).await?;
        }
    }

    Ok(())
}

/// Startup connectivity check.
pub async fn ensure_liveness(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

/// Readiness probe; needs the `sp_healthz` procedure from the bootstrap.
pub async fn ensure_readiness(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("CALL sp_healthz()")
        .execute(pool)
        .await
        .map(|_| ())
}

fn collect_sql_files(dir: &Path) -> Result<Vec<PathBuf>, BootstrapError> {
    let io_error = |source| BootstrapError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"))
        {
            entries.push(path);
        }
    }

    entries.sort_by(|a, b| compare_paths(a, b));
    Ok(entries)
}

fn compare_paths(a: &Path, b: &Path) -> Ordering {
    match (a.file_name(), b.file_name()) {
        (Some(a_name), Some(b_name)) => a_name.cmp(b_name),
        _ => Ordering::Equal,
    }
}

async fn apply_script(pool: &PgPool, path: &Path) -> Result<(), BootstrapError> {
    let sql = fs::read_to_string(path).map_err(|source| BootstrapError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let trimmed = sql.trim();
    if trimmed.is_empty() {
        warn!(path = %path.display(), "skipping empty bootstrap script");
        return Ok(());
    }

    let sql_error = |source| BootstrapError::Sql {
        path: path.to_path_buf(),
        source,
    };

    let mut transaction = pool.begin().await.map_err(sql_error)?;
    info!(script = %path.display(), "executing bootstrap script");
    // Scripts hold several statements, which only the simple protocol accepts.
    sqlx::raw_sql(trimmed)
        .execute(&mut *transaction)
        .await
        .map_err(sql_error)?;
    transaction.commit().await.map_err(sql_error)
}
