use std::path::PathBuf;

/// Common service configuration shared by the server binary.
///
/// The binary parses these from command-line arguments, then passes them to
/// storage layer initialization.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Data directory for on-disk storage.
    pub data_dir: Option<PathBuf>,

    /// Path to the SQLite database file.
    /// Defaults to `{data_dir}/data.sqlite` if not specified.
    pub sqlite_path: Option<PathBuf>,

    /// Listen address for the HTTP server.
    pub listen: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sqlite_path: None,
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Resolve the SQLite database path, falling back to `{data_dir}/data.sqlite`.
    pub fn resolve_sqlite_path(&self) -> PathBuf {
        if let Some(ref p) = self.sqlite_path {
            return p.clone();
        }
        match &self.data_dir {
            Some(dir) => dir.join("data.sqlite"),
            None => PathBuf::from("data.sqlite"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_path_defaults_to_data_dir() {
        let config = ServiceConfig {
            data_dir: Some(PathBuf::from("/var/lib/washflow")),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_sqlite_path(),
            PathBuf::from("/var/lib/washflow/data.sqlite")
        );
    }

    #[test]
    fn explicit_sqlite_path_wins() {
        let config = ServiceConfig {
            data_dir: Some(PathBuf::from("/var/lib/washflow")),
            sqlite_path: Some(PathBuf::from("/tmp/test.sqlite")),
            ..Default::default()
        };
        assert_eq!(config.resolve_sqlite_path(), PathBuf::from("/tmp/test.sqlite"));
    }
}
