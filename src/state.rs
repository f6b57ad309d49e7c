use std::fs;
use std::path::Path;

use crate::db::{CrmDb, Database, DbError};
use crate::types::{config_dir, Config};

/// Environment variable that selects PostgreSQL regardless of the config file.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Application state shared by every request.
pub struct AppState {
    pub config: Config,
    pub db: Database,
}

impl AppState {
    /// Load configuration and open (and migrate) the configured database.
    pub fn new() -> Result<Self, String> {
        let config = load_config()?;
        let backend = config.backend().map_err(|e| e.to_string())?;
        let db = Database::open(backend).map_err(|e| format!("Failed to open database: {e}"))?;
        Ok(Self { config, db })
    }

    /// Run one request against its own session; see `Database::with_request`.
    pub fn with_request<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut CrmDb) -> Result<T, E>,
        E: From<DbError>,
    {
        self.db.with_request(f)
    }
}

/// Load configuration from `~/.minicrm/config.json`.
///
/// A missing file means defaults (SQLite at `~/.minicrm/crm.db`). A set
/// `DATABASE_URL` overrides whatever the file says.
pub fn load_config() -> Result<Config, String> {
    let dir = config_dir().map_err(|e| e.to_string())?;
    let config = read_config(&dir.join("config.json"))?;
    Ok(apply_env_override(config, std::env::var(DATABASE_URL_ENV).ok()))
}

fn read_config(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;

    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}

fn apply_env_override(mut config: Config, database_url: Option<String>) -> Config {
    if let Some(url) = database_url.filter(|u| !u.trim().is_empty()) {
        config.database_url = Some(url);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::BackendConfig;

    #[test]
    fn test_missing_config_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = read_config(&dir.path().join("config.json")).unwrap();
        assert!(config.database_url.is_none());
        assert!(config.sqlite_path.is_none());
    }

    #[test]
    fn test_read_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "sqlitePath": "/var/lib/minicrm/crm.db" }"#).unwrap();

        let config = read_config(&path).unwrap();
        assert_eq!(
            config.backend().unwrap(),
            BackendConfig::Sqlite {
                path: "/var/lib/minicrm/crm.db".into()
            }
        );

        std::fs::write(&path, "{ not json").unwrap();
        assert!(read_config(&path).unwrap_err().contains("Failed to parse config"));
    }

    #[test]
    fn test_env_override_wins() {
        let config = Config {
            database_url: None,
            sqlite_path: Some("/tmp/crm.db".into()),
        };
        let config = apply_env_override(config, Some("postgres://crm@db/crm".into()));
        assert!(config.backend().unwrap().is_postgres());

        let config = apply_env_override(Config::default(), Some("  ".into()));
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_app_state_requests_share_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let config = Config {
            database_url: None,
            sqlite_path: Some(path.display().to_string()),
        };
        let db = Database::open(config.backend().unwrap()).unwrap();
        let state = AppState { config, db };

        let id: i64 = state
            .with_request(|db| {
                db.insert_company(
                    None,
                    &crate::entity::CompanyFields {
                        name: "Acme".into(),
                        ..Default::default()
                    },
                )
            })
            .unwrap();
        let found = state
            .with_request(|db| db.get_company(id))
            .unwrap()
            .expect("committed by the first request");
        assert_eq!(found.name, "Acme");
    }
}
