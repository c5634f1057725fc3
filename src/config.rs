//! Session configuration
//!
//! A [`Session`](crate::Session) is configured with [`SessionOptions`]. Options
//! can be set in code, by `KEY=VALUE` name, or read from environment variables
//! of the same names.
//!
//! ```
//! use gdal_wrap::config::{DefnDiscipline, SessionOptions};
//!
//! let mut options = SessionOptions::default();
//! options.set_option("GDAL_WRAP_DEFN_DISCIPLINE", "CLONE").unwrap();
//! assert_eq!(options.defn_discipline, DefnDiscipline::Clone);
//!
//! assert!(options.set_option("GDAL_WRAP_RELEASE_ON_DROP", "maybe").is_err());
//! ```

use crate::errors::{GdalWrapError, Result};

pub const DEFN_DISCIPLINE: &str = "GDAL_WRAP_DEFN_DISCIPLINE";
pub const CASCADE_DEPENDENTS: &str = "GDAL_WRAP_CASCADE_DEPENDENTS";
pub const RELEASE_ON_DROP: &str = "GDAL_WRAP_RELEASE_ON_DROP";

const KEYS: [&str; 3] = [DEFN_DISCIPLINE, CASCADE_DEPENDENTS, RELEASE_ON_DROP];

/// How shared feature definitions (owned by a layer) are wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefnDiscipline {
    /// Take a native reference on the shared definition and drop it on dispose.
    #[default]
    Reference,
    /// Wrap a private copy of the definition.
    Clone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub defn_discipline: DefnDiscipline,
    /// Ask the native library for derived objects (overview and mask bands,
    /// dataset bands and layers) when disposing, in addition to the children
    /// registered through retention edges.
    pub cascade_dependents: bool,
    /// Dispose wrappers that are dropped without an explicit `dispose`.
    /// When off, such wrappers leave the cache but their native object is
    /// leaked.
    pub release_on_drop: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            defn_discipline: DefnDiscipline::Reference,
            cascade_dependents: true,
            release_on_drop: true,
        }
    }
}

impl SessionOptions {
    pub fn defn_discipline(mut self, discipline: DefnDiscipline) -> Self {
        self.defn_discipline = discipline;
        self
    }

    pub fn cascade_dependents(mut self, cascade: bool) -> Self {
        self.cascade_dependents = cascade;
        self
    }

    pub fn release_on_drop(mut self, release: bool) -> Self {
        self.release_on_drop = release;
        self
    }

    /// Set an option by name.
    ///
    /// Returns `Err(GdalWrapError::BadOption)` for an unknown `key` or a
    /// `value` the option does not accept.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        let bad = || GdalWrapError::BadOption {
            key: key.to_string(),
            value: value.to_string(),
        };
        match key {
            DEFN_DISCIPLINE => {
                self.defn_discipline = match value.trim().to_ascii_uppercase().as_str() {
                    "REFERENCE" => DefnDiscipline::Reference,
                    "CLONE" => DefnDiscipline::Clone,
                    _ => return Err(bad()),
                }
            }
            CASCADE_DEPENDENTS => self.cascade_dependents = parse_bool(value).ok_or_else(bad)?,
            RELEASE_ON_DROP => self.release_on_drop = parse_bool(value).ok_or_else(bad)?,
            _ => return Err(bad()),
        }
        Ok(())
    }

    /// Get the current value of an option by name.
    pub fn get_option(&self, key: &str) -> Option<String> {
        let value = match key {
            DEFN_DISCIPLINE => match self.defn_discipline {
                DefnDiscipline::Reference => "REFERENCE",
                DefnDiscipline::Clone => "CLONE",
            },
            CASCADE_DEPENDENTS => bool_str(self.cascade_dependents),
            RELEASE_ON_DROP => bool_str(self.release_on_drop),
            _ => return None,
        };
        Some(value.to_string())
    }

    /// Defaults, overridden by any of the option names found in the
    /// environment.
    pub fn from_env() -> Result<Self> {
        let mut options = SessionOptions::default();
        for key in KEYS {
            if let Ok(value) = std::env::var(key) {
                options.set_option(key, &value)?;
            }
        }
        Ok(options)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_uppercase().as_str() {
        "YES" | "ON" | "TRUE" | "1" => Some(true),
        "NO" | "OFF" | "FALSE" | "0" => Some(false),
        _ => None,
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "YES"
    } else {
        "NO"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = SessionOptions::default();
        assert_eq!(options.defn_discipline, DefnDiscipline::Reference);
        assert!(options.cascade_dependents);
        assert!(options.release_on_drop);
    }

    #[test]
    fn test_set_get_option() {
        let mut options = SessionOptions::default();
        options.set_option(CASCADE_DEPENDENTS, "off").unwrap();
        options.set_option(RELEASE_ON_DROP, " No ").unwrap();
        options.set_option(DEFN_DISCIPLINE, "clone").unwrap();
        assert_eq!(options.get_option(CASCADE_DEPENDENTS).unwrap(), "NO");
        assert_eq!(options.get_option(RELEASE_ON_DROP).unwrap(), "NO");
        assert_eq!(options.get_option(DEFN_DISCIPLINE).unwrap(), "CLONE");
        assert_eq!(options.get_option("NON_EXISTANT_OPTION"), None);
    }

    #[test]
    fn test_bad_options() {
        let mut options = SessionOptions::default();
        assert_eq!(
            options.set_option("GDAL_CACHEMAX", "128"),
            Err(GdalWrapError::BadOption {
                key: "GDAL_CACHEMAX".to_string(),
                value: "128".to_string()
            })
        );
        assert!(options.set_option(DEFN_DISCIPLINE, "share").is_err());
        assert!(options.set_option(CASCADE_DEPENDENTS, "").is_err());
        // failed sets leave the options untouched
        assert_eq!(options, SessionOptions::default());
    }

    #[test]
    fn test_builder() {
        let options = SessionOptions::default()
            .defn_discipline(DefnDiscipline::Clone)
            .cascade_dependents(false)
            .release_on_drop(false);
        assert_eq!(options.defn_discipline, DefnDiscipline::Clone);
        assert!(!options.cascade_dependents);
        assert!(!options.release_on_drop);
    }

    #[test]
    fn test_from_env() {
        // The only test touching these variables.
        std::env::set_var(CASCADE_DEPENDENTS, "FALSE");
        std::env::set_var(DEFN_DISCIPLINE, "Clone");
        let options = SessionOptions::from_env().unwrap();
        assert!(!options.cascade_dependents);
        assert_eq!(options.defn_discipline, DefnDiscipline::Clone);
        assert!(options.release_on_drop);

        std::env::set_var(RELEASE_ON_DROP, "sometimes");
        assert!(SessionOptions::from_env().is_err());

        for key in KEYS {
            std::env::remove_var(key);
        }
        assert_eq!(SessionOptions::from_env().unwrap(), SessionOptions::default());
    }
}
