//! `SQLite` DSN helpers.

use std::path::Path;

use crate::Result;

/// `sqlite::memory:`, `sqlite://:memory:` or any DSN with `mode=memory`.
#[must_use]
pub fn is_memory_dsn(dsn: &str) -> bool {
    let dsn = dsn.trim();
    dsn == "sqlite::memory:"
        || dsn.starts_with("sqlite::memory:?")
        || dsn.starts_with("sqlite://:memory:")
        || dsn.contains("mode=memory")
}

/// For file databases: create missing parent directories and ask the driver to
/// create the file (`mode=rwc`) unless the DSN already picks a mode.
///
/// # Errors
/// Returns `DbError::Io` when the parent directory cannot be created.
pub fn prepare_sqlite_path(dsn: &str) -> Result<String> {
    let dsn = dsn.trim();
    if is_memory_dsn(dsn) {
        return Ok(dsn.to_owned());
    }
    let rest = dsn
        .strip_prefix("sqlite://")
        .or_else(|| dsn.strip_prefix("sqlite:"))
        .unwrap_or(dsn);
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));

    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    if query.split('&').any(|kv| kv.starts_with("mode=")) {
        return Ok(dsn.to_owned());
    }
    let sep = if query.is_empty() { '?' } else { '&' };
    Ok(format!("{dsn}{sep}mode=rwc"))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn memory_dsns() {
        assert!(is_memory_dsn("sqlite::memory:"));
        assert!(is_memory_dsn("sqlite://:memory:"));
        assert!(is_memory_dsn("sqlite://shared?mode=memory&cache=shared"));
        assert!(!is_memory_dsn("sqlite://data/app.db"));
    }

    #[test]
    fn file_dsn_gets_parent_dir_and_create_mode() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("app.db");
        let dsn = format!("sqlite://{}", db.display());

        let prepared = prepare_sqlite_path(&dsn).unwrap();
        assert_eq!(prepared, format!("{dsn}?mode=rwc"));
        assert!(dir.path().join("nested").is_dir());

        let ro = format!("{dsn}?mode=ro");
        assert_eq!(prepare_sqlite_path(&ro).unwrap(), ro);
        assert_eq!(prepare_sqlite_path("sqlite::memory:").unwrap(), "sqlite::memory:");
    }
}
