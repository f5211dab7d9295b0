//! Default locations under the `data/` directory.
//!
//! Paths are relative to the working directory; every one of them can be
//! overridden through the pipeline configuration.

use std::path::{Path, PathBuf};

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Returns the default ticket database path.
#[must_use]
pub fn default_db_path() -> PathBuf {
    data_dir().join("parking_tickets.duckdb")
}

/// Returns the `data/derived/` directory for aggregate output tables.
#[must_use]
pub fn derived_dir() -> PathBuf {
    data_dir().join("derived")
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_live_under_data() {
        assert_eq!(
            default_db_path(),
            Path::new("data").join("parking_tickets.duckdb")
        );
        assert_eq!(derived_dir(), Path::new("data").join("derived"));
    }

    #[test]
    fn empty_path_is_a_no_op() {
        assert!(ensure_dir(Path::new("")).is_ok());
    }
}
