//! Property store
//!
//! Flat string-keyed configuration shared by the container and its services.
//! Properties come from property files (`key=value` lines) and from
//! `--Prefix.key=value` command-line options.

use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{path}:{line}: expected key=value, got '{text}'")]
    Syntax {
        path: String,
        line: usize,
        text: String,
    },
}

/// Flat string-keyed property set.
///
/// Keys iterate in sorted order, so anything enumerating a prefix (such as
/// the service set under `IceBox.Service.`) sees a deterministic order.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a property set from an argument vector.
    ///
    /// Any `--Ice.Config=<file>` argument is honored by loading the named
    /// property file first; the arguments themselves are left untouched
    /// (option consumption is a separate step, see
    /// [`parse_command_line_options`](Self::parse_command_line_options)).
    pub fn from_args(args: &[String]) -> Result<Self, PropertyError> {
        let mut properties = Self::new();
        for arg in args {
            if let Some(path) = arg.strip_prefix("--Ice.Config=") {
                if !path.is_empty() {
                    properties.load(Path::new(path))?;
                }
            }
        }
        Ok(properties)
    }

    /// Load a property file into this set. Later files override earlier keys.
    pub fn load(&mut self, path: &Path) -> Result<(), PropertyError> {
        let content = std::fs::read_to_string(path)?;
        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(PropertyError::Syntax {
                    path: path.display().to_string(),
                    line: number + 1,
                    text: line.to_string(),
                });
            };
            self.set(key.trim(), value.trim());
        }
        Ok(())
    }

    /// Look up a property. Absent keys read as the empty string.
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    /// Set a property. An empty value removes the key.
    pub fn set(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            self.values.remove(key);
        } else {
            self.values.insert(key.to_string(), value.to_string());
        }
    }

    /// All properties whose key starts with `prefix`, sorted by key.
    pub fn properties_for_prefix(&self, prefix: &str) -> BTreeMap<String, String> {
        self.values
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Render the whole set as `--key=value` options, sorted by key.
    pub fn command_line_options(&self) -> Vec<String> {
        self.values
            .iter()
            .map(|(k, v)| format!("--{}={}", k, v))
            .collect()
    }

    /// Consume every `--<prefix>.<key>[=<value>]` option from `args`, storing
    /// it in this set, and return the remaining arguments in order.
    ///
    /// An option without `=` stores the value `"1"`.
    pub fn parse_command_line_options(&mut self, prefix: &str, args: Vec<String>) -> Vec<String> {
        let pattern = format!("--{}.", prefix);
        let mut residual = Vec::new();
        for arg in args {
            if arg.starts_with(&pattern) {
                let option = &arg[2..];
                match option.split_once('=') {
                    Some((key, value)) => self.set(key, value),
                    None => self.set(option, "1"),
                }
            } else {
                residual.push(arg);
            }
        }
        residual
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn write_config(content: &str) -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = PathBuf::from(format!(
            "/tmp/icebox-props-{}-{}.cfg",
            std::process::id(),
            id
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_get_absent_is_empty() {
        let props = Properties::new();
        assert_eq!(props.get("no.such.key"), "");
    }

    #[test]
    fn test_set_and_get() {
        let mut props = Properties::new();
        props.set("Alpha.mode", "server");
        assert_eq!(props.get("Alpha.mode"), "server");
    }

    #[test]
    fn test_set_empty_removes() {
        let mut props = Properties::new();
        props.set("Alpha.mode", "server");
        props.set("Alpha.mode", "");
        assert_eq!(props.get("Alpha.mode"), "");
        assert!(props.properties_for_prefix("Alpha.").is_empty());
    }

    #[test]
    fn test_properties_for_prefix() {
        let mut props = Properties::new();
        props.set("IceBox.Service.Beta", "libB:create");
        props.set("IceBox.Service.Alpha", "libA:create");
        props.set("IceBox.PrintServicesReady", "bundle");

        let services = props.properties_for_prefix("IceBox.Service.");
        let keys: Vec<_> = services.keys().cloned().collect();
        assert_eq!(keys, vec!["IceBox.Service.Alpha", "IceBox.Service.Beta"]);
    }

    #[test]
    fn test_parse_command_line_options() {
        let mut props = Properties::new();
        let residual = props.parse_command_line_options(
            "Alpha",
            args(&["--Alpha.mode=cli", "positional", "--Beta.x=1", "--Alpha.flag"]),
        );
        assert_eq!(props.get("Alpha.mode"), "cli");
        assert_eq!(props.get("Alpha.flag"), "1");
        assert_eq!(residual, args(&["positional", "--Beta.x=1"]));
    }

    #[test]
    fn test_parse_later_option_overrides() {
        let mut props = Properties::new();
        props.parse_command_line_options(
            "Alpha",
            args(&["--Alpha.mode=server", "--Alpha.mode=cli"]),
        );
        assert_eq!(props.get("Alpha.mode"), "cli");
    }

    #[test]
    fn test_command_line_options_sorted() {
        let mut props = Properties::new();
        props.set("B.x", "2");
        props.set("A.x", "1");
        assert_eq!(props.command_line_options(), args(&["--A.x=1", "--B.x=2"]));
    }

    #[test]
    fn test_load_config_file() {
        let path = write_config("# comment\nIceBox.Service.Alpha = libA:create\n\nAlpha.mode=server\n");
        let mut props = Properties::new();
        props.load(&path).unwrap();
        assert_eq!(props.get("IceBox.Service.Alpha"), "libA:create");
        assert_eq!(props.get("Alpha.mode"), "server");
    }

    #[test]
    fn test_load_config_syntax_error() {
        let path = write_config("not a property line\n");
        let mut props = Properties::new();
        let err = props.load(&path).unwrap_err();
        assert!(matches!(err, PropertyError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_from_args_loads_ice_config() {
        let path = write_config("Alpha.mode=server\n");
        let props =
            Properties::from_args(&args(&[&format!("--Ice.Config={}", path.display())])).unwrap();
        assert_eq!(props.get("Alpha.mode"), "server");
    }

    #[test]
    fn test_from_args_missing_config_fails() {
        let result = Properties::from_args(&args(&["--Ice.Config=/no/such/file.cfg"]));
        assert!(result.is_err());
    }
}
