use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::db::{BackendConfig, DbError};

/// On-disk configuration (`~/.minicrm/config.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// PostgreSQL connection URL. When unset, SQLite is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// SQLite file location. Defaults to `~/.minicrm/crm.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<String>,
}

impl Config {
    /// Resolve which backend this configuration selects.
    pub fn backend(&self) -> Result<BackendConfig, DbError> {
        if let Some(url) = self.database_url.as_deref().map(str::trim) {
            if !url.is_empty() {
                return Ok(BackendConfig::Postgres {
                    url: url.to_string(),
                });
            }
        }
        let path = match self.sqlite_path.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => PathBuf::from(p),
            _ => default_sqlite_path()?,
        };
        Ok(BackendConfig::Sqlite { path })
    }
}

/// `~/.minicrm`, home of the config file and the default database.
pub fn config_dir() -> Result<PathBuf, DbError> {
    let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
    Ok(home.join(".minicrm"))
}

fn default_sqlite_path() -> Result<PathBuf, DbError> {
    Ok(config_dir()?.join("crm.db"))
}

/// Sort direction for entity lists. Anything but `desc` sorts ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("desc") {
            SortDir::Desc
        } else {
            SortDir::Asc
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            SortDir::Asc => " ASC",
            SortDir::Desc => " DESC",
        }
    }
}

/// `ORDER BY` on one text expression, ties broken by id in the same direction.
fn order_by(column: &'static str, collation: &'static str, dir: SortDir) -> String {
    [" ORDER BY ", column, collation, dir.keyword(), ", id", dir.keyword()].concat()
}

/// Sortable company columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanySort {
    #[default]
    Name,
    Type,
    CreatedAt,
}

impl CompanySort {
    /// Unknown keys fall back to `name`.
    pub fn parse(s: &str) -> Self {
        match s {
            "type" => CompanySort::Type,
            "created_at" => CompanySort::CreatedAt,
            _ => CompanySort::Name,
        }
    }

    /// Missing values sort as empty text on both backends.
    pub(crate) fn order_clause(self, dir: SortDir, collation: &'static str) -> String {
        let column = match self {
            CompanySort::Name => "name",
            CompanySort::Type => "COALESCE(type, '')",
            CompanySort::CreatedAt => "created_at",
        };
        order_by(column, collation, dir)
    }
}

/// Sortable individual columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndividualSort {
    #[default]
    Name,
    Title,
    Email,
    CreatedAt,
}

impl IndividualSort {
    /// Unknown keys fall back to `name`.
    pub fn parse(s: &str) -> Self {
        match s {
            "title" => IndividualSort::Title,
            "email" => IndividualSort::Email,
            "created_at" => IndividualSort::CreatedAt,
            _ => IndividualSort::Name,
        }
    }

    pub(crate) fn order_clause(self, dir: SortDir, collation: &'static str) -> String {
        let column = match self {
            IndividualSort::Name => "name",
            IndividualSort::Title => "COALESCE(title, '')",
            IndividualSort::Email => "COALESCE(email, '')",
            IndividualSort::CreatedAt => "created_at",
        };
        order_by(column, collation, dir)
    }
}

/// Substring pattern for `CrmDb::contains_op`. The query is matched
/// literally: `%`, `_` and `\` are escaped.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for ch in query.trim().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_keys_fall_back_to_name() {
        assert_eq!(CompanySort::parse("type"), CompanySort::Type);
        assert_eq!(CompanySort::parse("email"), CompanySort::Name);
        assert_eq!(CompanySort::parse("name; DROP TABLE companies"), CompanySort::Name);
        assert_eq!(IndividualSort::parse("email"), IndividualSort::Email);
        assert_eq!(IndividualSort::parse("website"), IndividualSort::Name);
        assert_eq!(SortDir::parse("desc"), SortDir::Desc);
        assert_eq!(SortDir::parse("sideways"), SortDir::Asc);
    }

    #[test]
    fn test_order_clause_coalesces_and_collates() {
        assert_eq!(
            CompanySort::Type.order_clause(SortDir::Desc, ""),
            " ORDER BY COALESCE(type, '') DESC, id DESC"
        );
        assert_eq!(
            IndividualSort::Name.order_clause(SortDir::Asc, " COLLATE \"C\""),
            " ORDER BY name COLLATE \"C\" ASC, id ASC"
        );
    }

    #[test]
    fn test_like_pattern_is_literal() {
        assert_eq!(like_pattern("  ÉCOLE "), "%ÉCOLE%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_config_backend_resolution() {
        let cfg = Config {
            database_url: Some("postgres://crm@localhost/crm".into()),
            sqlite_path: Some("/tmp/ignored.db".into()),
        };
        assert!(cfg.backend().unwrap().is_postgres());

        let cfg = Config {
            database_url: Some("   ".into()),
            sqlite_path: Some("/tmp/crm.db".into()),
        };
        assert_eq!(
            cfg.backend().unwrap(),
            BackendConfig::Sqlite {
                path: PathBuf::from("/tmp/crm.db")
            }
        );
    }

    #[test]
    fn test_config_parses_camel_case() {
        let cfg: Config =
            serde_json::from_str(r#"{ "databaseUrl": "postgres://x/y" }"#).expect("parse");
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://x/y"));
        assert_eq!(cfg.sqlite_path, None);
    }
}
