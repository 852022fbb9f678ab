//! Configuration context for a single process invocation.
//!
//! `Config` is created once per run and passed by reference into the
//! option parser, the dispatcher and the tree manager. Settings are
//! addressed by dotted `section.name` keys and every key has a typed
//! default; values read from disk or the command line are converted to
//! the type of that default.

use crate::error::{FamError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the persisted settings inside the user directory.
pub const CONFIG_FILE: &str = "gramps.toml";

/// A typed configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer setting.
    Int(i64),
    /// Floating-point setting.
    Float(f64),
    /// Free text.
    Text(String),
}

impl ConfigValue {
    /// Converts `raw` to a value of the same type as `self`.
    pub fn convert(&self, raw: &str) -> Result<ConfigValue> {
        let raw = raw.trim();
        let bad = |ty: &str| FamError::Config(format!("'{}' is not a valid {}", raw, ty));
        match self {
            Self::Bool(_) => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Self::Bool(true)),
                "0" | "false" | "no" | "off" => Ok(Self::Bool(false)),
                _ => Err(bad("boolean")),
            },
            Self::Int(_) => raw.parse().map(Self::Int).map_err(|_| bad("integer")),
            Self::Float(_) => raw.parse().map(Self::Float).map_err(|_| bad("number")),
            Self::Text(_) => Ok(Self::Text(raw.to_string())),
        }
    }

    /// Returns the text content, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean content, if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn to_toml(&self) -> toml::Value {
        match self {
            Self::Bool(b) => toml::Value::Boolean(*b),
            Self::Int(i) => toml::Value::Integer(*i),
            Self::Float(f) => toml::Value::Float(*f),
            Self::Text(s) => toml::Value::String(s.clone()),
        }
    }

    fn from_toml(&self, value: &toml::Value) -> Option<ConfigValue> {
        match (self, value) {
            (Self::Bool(_), toml::Value::Boolean(b)) => Some(Self::Bool(*b)),
            (Self::Int(_), toml::Value::Integer(i)) => Some(Self::Int(*i)),
            (Self::Float(_), toml::Value::Float(f)) => Some(Self::Float(*f)),
            (Self::Float(_), toml::Value::Integer(i)) => Some(Self::Float(*i as f64)),
            (Self::Text(_), toml::Value::String(s)) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// Settings context with typed defaults.
#[derive(Debug, Clone)]
pub struct Config {
    defaults: BTreeMap<String, ConfigValue>,
    values: BTreeMap<String, ConfigValue>,
    path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_defaults(None)
    }
}

impl Config {
    /// Builds a config holding only the built-in defaults.
    ///
    /// `database_path` seeds `database.path`; when `None` it is left empty
    /// and callers fall back to [`UserDirs::grampsdb`].
    pub fn with_defaults(database_path: Option<&Path>) -> Self {
        let mut defaults = BTreeMap::new();
        let mut text = |k: &str, v: &str| {
            defaults.insert(k.to_string(), ConfigValue::Text(v.to_string()));
        };
        text("database.backend", "redb");
        text(
            "database.path",
            &database_path
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        );
        text("preferences.iprefix", "I%04d");
        text("preferences.fprefix", "F%04d");
        text("preferences.eprefix", "E%04d");
        text("preferences.pprefix", "P%04d");
        text("preferences.sprefix", "S%04d");
        text("preferences.cprefix", "C%04d");
        text("preferences.rprefix", "R%04d");
        text("preferences.oprefix", "O%04d");
        text("preferences.nprefix", "N%04d");
        text("preferences.family-relation-type", "Married");
        defaults.insert("behavior.autoload".into(), ConfigValue::Bool(false));
        defaults.insert("behavior.recent-export-type".into(), ConfigValue::Int(1));
        defaults.insert("preferences.family-warn".into(), ConfigValue::Bool(true));
        defaults.insert("interface.dont-ask".into(), ConfigValue::Bool(false));
        defaults.insert("interface.history-depth".into(), ConfigValue::Int(20));
        defaults.insert("geography.default-latitude".into(), ConfigValue::Float(0.0));

        Self {
            values: defaults.clone(),
            defaults,
            path: None,
        }
    }

    /// Loads settings from `<user_dir>/gramps.toml`, falling back to defaults.
    ///
    /// Unknown keys and values of the wrong type are ignored with a warning.
    pub fn load(dirs: &UserDirs) -> Result<Self> {
        let mut config = Self::with_defaults(Some(&dirs.grampsdb()));
        let path = dirs.root().join(CONFIG_FILE);
        config.path = Some(path.clone());
        if !path.exists() {
            return Ok(config);
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| FamError::Config(format!("failed to read config: {}", e)))?;
        let table: toml::Table = toml::from_str(&content)
            .map_err(|e| FamError::Config(format!("failed to parse config: {}", e)))?;

        for (section, entries) in &table {
            let Some(entries) = entries.as_table() else {
                tracing::warn!(section = %section, "ignoring non-table config entry");
                continue;
            };
            for (name, raw) in entries {
                let key = format!("{}.{}", section, name);
                let converted = config
                    .defaults
                    .get(&key)
                    .and_then(|default| default.from_toml(raw));
                match converted {
                    Some(value) => {
                        config.values.insert(key, value);
                    }
                    None => tracing::warn!(key = %key, "ignoring unknown or mistyped setting"),
                }
            }
        }
        Ok(config)
    }

    /// Saves settings that differ from their defaults.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut table = toml::Table::new();
        for (key, value) in &self.values {
            if self.defaults.get(key) == Some(value) {
                continue;
            }
            let (section, name) = key.split_once('.').unwrap_or(("general", key));
            let entry = table
                .entry(section.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            if let Some(section_table) = entry.as_table_mut() {
                section_table.insert(name.to_string(), value.to_toml());
            }
        }
        let content = toml::to_string_pretty(&table)
            .map_err(|e| FamError::Config(format!("failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)
            .map_err(|e| FamError::Config(format!("failed to write config: {}", e)))?;
        Ok(())
    }

    /// Path of the backing file, if any.
    pub fn filename(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// True if `key` names a known setting.
    pub fn has_default(&self, key: &str) -> bool {
        self.defaults.contains_key(key)
    }

    /// Current value of `key`.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    /// Current text value of `key`, or an empty string.
    pub fn get_str(&self, key: &str) -> &str {
        self.get(key).and_then(ConfigValue::as_str).unwrap_or("")
    }

    /// Default value of `key`.
    pub fn get_default(&self, key: &str) -> Option<&ConfigValue> {
        self.defaults.get(key)
    }

    /// Sets `key`, which must exist and keep its type.
    pub fn set(&mut self, key: &str, value: ConfigValue) -> Result<()> {
        let default = self
            .defaults
            .get(key)
            .ok_or_else(|| FamError::Config(format!("no such config setting: '{}'", key)))?;
        if std::mem::discriminant(default) != std::mem::discriminant(&value) {
            return Err(FamError::Config(format!("type mismatch for '{}'", key)));
        }
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    /// Sets `key` from text, converting by the type of the current value.
    ///
    /// The literal `DEFAULT` restores the default. Returns the new value.
    pub fn set_from_str(&mut self, key: &str, raw: &str) -> Result<ConfigValue> {
        if raw == "DEFAULT" {
            return self.reset(key);
        }
        let current = self
            .get(key)
            .ok_or_else(|| FamError::Config(format!("no such config setting: '{}'", key)))?;
        let value = current.convert(raw)?;
        self.values.insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// Restores the default of `key`. Returns the restored value.
    pub fn reset(&mut self, key: &str) -> Result<ConfigValue> {
        let default = self
            .defaults
            .get(key)
            .cloned()
            .ok_or_else(|| FamError::Config(format!("no such config setting: '{}'", key)))?;
        self.values.insert(key.to_string(), default.clone());
        Ok(default)
    }

    /// Directory holding Family Trees: `database.path`, or the user default.
    pub fn database_path(&self, dirs: &UserDirs) -> PathBuf {
        match self.get_str("database.path") {
            "" => dirs.grampsdb(),
            path => PathBuf::from(path),
        }
    }

    /// Iterates over all settings in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Locations of per-user state.
#[derive(Debug, Clone)]
pub struct UserDirs {
    root: PathBuf,
}

impl UserDirs {
    /// Uses `root` as the user directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Resolves the user directory from `GRAMPSHOME` or the home directory.
    pub fn from_env() -> Self {
        if let Some(home) = std::env::var_os("GRAMPSHOME") {
            return Self::new(PathBuf::from(home).join("gramps"));
        }
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(".gramps"))
    }

    /// The user directory itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Default directory holding Family Trees.
    pub fn grampsdb(&self) -> PathBuf {
        self.root.join("grampsdb")
    }

    /// Installed addons.
    pub fn plugins(&self) -> PathBuf {
        self.root.join("plugins")
    }

    /// Saved books.
    pub fn books_file(&self) -> PathBuf {
        self.root.join("books.toml")
    }

    /// Custom filters.
    pub fn filters_file(&self) -> PathBuf {
        self.root.join("custom_filters.toml")
    }

    /// Saved report and tool options.
    pub fn report_options_dir(&self) -> PathBuf {
        self.root.join("report_options")
    }

    /// Media thumbnails.
    pub fn thumbnails(&self) -> PathBuf {
        self.root.join("thumb")
    }

    /// User css files for web reports.
    pub fn css(&self) -> PathBuf {
        self.root.join("css")
    }

    /// Cache directory.
    pub fn cache(&self) -> PathBuf {
        self.root.join("cache")
    }
}
