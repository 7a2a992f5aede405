//! INI file configuration adapter.

use crate::domain::error::CacheError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| CacheError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, CacheError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| CacheError::ConfigParse {
                file: "<string>".into(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[cache]
base_dir = data/bars
ohlc_policy = trust

[catalog]
path = data/catalog.db
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("cache", "base_dir"),
            Some("data/bars".to_string())
        );
        assert_eq!(
            adapter.get_string("catalog", "path"),
            Some("data/catalog.db".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[cache]\nbase_dir = x\n").unwrap();
        assert_eq!(adapter.get_string("cache", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn require_string_rejects_blank_values() {
        let adapter = FileConfigAdapter::from_string("[catalog]\npath =   \n").unwrap();
        let err = adapter.require_string("catalog", "path").unwrap_err();
        assert!(matches!(err, CacheError::ConfigMissing { .. }));
        assert!(adapter.require_string("catalog", "absent").is_err());
    }

    #[test]
    fn get_int_returns_value() {
        let adapter = FileConfigAdapter::from_string("[catalog]\npool_size = 8\n").unwrap();
        assert_eq!(adapter.get_int("catalog", "pool_size", 0), 8);
    }

    #[test]
    fn get_int_returns_default_for_missing() {
        let adapter = FileConfigAdapter::from_string("[fetch]\n").unwrap();
        assert_eq!(adapter.get_int("fetch", "missing", 42), 42);
    }

    #[test]
    fn get_int_returns_default_for_non_numeric() {
        let adapter = FileConfigAdapter::from_string("[fetch]\nmax_attempts = abc\n").unwrap();
        assert_eq!(adapter.get_int("fetch", "max_attempts", 42), 42);
    }

    #[test]
    fn get_double_returns_value() {
        let adapter = FileConfigAdapter::from_string("[fetch]\nratio = 0.25\n").unwrap();
        assert_eq!(adapter.get_double("fetch", "ratio", 0.0), 0.25);
    }

    #[test]
    fn get_double_returns_default_for_non_numeric() {
        let adapter = FileConfigAdapter::from_string("[fetch]\nratio = not_a_number\n").unwrap();
        assert_eq!(adapter.get_double("fetch", "ratio", 99.9), 99.9);
    }

    #[test]
    fn get_bool_values() {
        let adapter =
            FileConfigAdapter::from_string("[cache]\na = true\nb = no\nc = 1\nd = maybe\n").unwrap();
        assert!(adapter.get_bool("cache", "a", false));
        assert!(!adapter.get_bool("cache", "b", true));
        assert!(adapter.get_bool("cache", "c", false));
        assert!(adapter.get_bool("cache", "d", true));
        assert!(!adapter.get_bool("cache", "missing", false));
    }

    #[test]
    fn from_file_reads_config() {
        let content = "[catalog]\npath = /srv/barcache/catalog.db\npool_size = 2\n";
        let file = create_temp_config(content);
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("catalog", "path"),
            Some("/srv/barcache/catalog.db".to_string())
        );
        assert_eq!(adapter.get_int("catalog", "pool_size", 4), 2);
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        match result {
            Err(CacheError::ConfigParse { file, .. }) => {
                assert!(file.contains("config.ini"));
            }
            _ => panic!("expected ConfigParse error"),
        }
    }
}
