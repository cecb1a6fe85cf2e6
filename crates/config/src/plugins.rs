//! Plugin sections
//!
//! Every top-level table other than `[global]` and `[log]` declares one plugin
//! instance. The table name is the instance name; `type` picks the factory
//! and its suffix picks the category.
//!
//! ```toml
//! [nginx_tail]
//! type = "TailInput"
//! tag = "nginx"
//! decoder = "nginx_regex"
//! path = "/var/log/nginx/access.log"
//!
//! [nginx_regex]
//! type = "RegexDecoder"
//! match_regex = '^(?P<remote>\S+) '
//! ```

use std::fmt;

use serde::de::DeserializeOwned;

use crate::{ConfigError, Result};

/// Plugin category, derived from the suffix of the declared type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PluginCategory {
    /// `...Input`
    Input,
    /// `...Output`
    Output,
    /// `...Decoder`
    Decoder,
    /// `...Encoder`
    Encoder,
    /// `...Filter`
    Filter,
}

impl PluginCategory {
    /// All categories, in wiring order
    pub const ALL: [PluginCategory; 5] = [
        Self::Decoder,
        Self::Encoder,
        Self::Filter,
        Self::Output,
        Self::Input,
    ];

    /// Classify a type name by its suffix
    ///
    /// Returns `None` for an unrecognized suffix; such sections are skipped.
    pub fn from_type_name(type_name: &str) -> Option<Self> {
        [
            ("Input", Self::Input),
            ("Output", Self::Output),
            ("Decoder", Self::Decoder),
            ("Encoder", Self::Encoder),
            ("Filter", Self::Filter),
        ]
        .into_iter()
        .find(|(suffix, _)| type_name.len() > suffix.len() && type_name.ends_with(suffix))
        .map(|(_, category)| category)
    }

    /// Lowercase label for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Decoder => "decoder",
            Self::Encoder => "encoder",
            Self::Filter => "filter",
        }
    }
}

impl fmt::Display for PluginCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings shared by every input and output
///
/// Immutable once the pipeline is wired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginCommonConfig {
    /// Instance name (the section name)
    pub name: String,
    /// Registry key
    pub type_name: String,
    /// Route key
    pub tag: Option<String>,
    /// Decoder instance applied by the output runner
    pub decoder: Option<String>,
    /// Encoder instance applied by the output runner
    pub encoder: Option<String>,
    /// Filter instance
    pub filter: Option<String>,
}

impl PluginCommonConfig {
    /// Route key, empty when no tag was configured
    #[inline]
    pub fn tag_or_empty(&self) -> &str {
        self.tag.as_deref().unwrap_or_default()
    }
}

/// One plugin section from the configuration file
#[derive(Debug, Clone)]
pub struct PluginSection {
    common: PluginCommonConfig,
    category: Option<PluginCategory>,
    settings: toml::Table,
}

impl PluginSection {
    /// Parse a section from its raw table
    ///
    /// `type` is required. `tag`, `decoder`, `encoder` and `filter` are
    /// optional strings. Everything stays in `settings` for the plugin's own
    /// `init` to decode.
    pub fn from_table(name: impl Into<String>, settings: toml::Table) -> Result<Self> {
        let name = name.into();

        let type_name = match settings.get("type") {
            Some(toml::Value::String(s)) if !s.is_empty() => s.clone(),
            Some(_) => {
                return Err(ConfigError::invalid_value(
                    "plugin",
                    name,
                    "type",
                    "must be a non-empty string",
                ));
            }
            None => return Err(ConfigError::missing_field("plugin", name, "type")),
        };

        let common = PluginCommonConfig {
            tag: optional_string(&name, &settings, "tag")?,
            decoder: optional_string(&name, &settings, "decoder")?,
            encoder: optional_string(&name, &settings, "encoder")?,
            filter: optional_string(&name, &settings, "filter")?,
            type_name,
            name,
        };

        Ok(Self {
            category: PluginCategory::from_type_name(&common.type_name),
            common,
            settings,
        })
    }

    /// Instance name
    #[inline]
    pub fn name(&self) -> &str {
        &self.common.name
    }

    /// Registry key
    #[inline]
    pub fn type_name(&self) -> &str {
        &self.common.type_name
    }

    /// Category from the type suffix, `None` if unrecognized
    #[inline]
    pub fn category(&self) -> Option<PluginCategory> {
        self.category
    }

    /// Common settings
    #[inline]
    pub fn common(&self) -> &PluginCommonConfig {
        &self.common
    }

    /// The full raw table, common keys included
    #[inline]
    pub fn settings(&self) -> &toml::Table {
        &self.settings
    }

    /// Decode the raw table into a plugin's settings struct
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        decode_settings(&self.common.name, &self.settings)
    }
}

/// Decode a raw plugin table into a settings struct
///
/// Settings structs should use `#[serde(default)]` and must not deny unknown
/// fields, since the table still carries the common keys.
pub fn decode_settings<T: DeserializeOwned>(name: &str, settings: &toml::Table) -> Result<T> {
    toml::Value::Table(settings.clone())
        .try_into()
        .map_err(|e| ConfigError::invalid_settings(name, e))
}

fn optional_string(name: &str, settings: &toml::Table, key: &'static str) -> Result<Option<String>> {
    match settings.get(key) {
        None => Ok(None),
        Some(toml::Value::String(s)) if s.is_empty() => Ok(None),
        Some(toml::Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ConfigError::invalid_value(
            "plugin",
            name,
            key,
            "must be a string",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn table(s: &str) -> toml::Table {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn test_category_from_suffix() {
        assert_eq!(
            PluginCategory::from_type_name("TcpInput"),
            Some(PluginCategory::Input)
        );
        assert_eq!(
            PluginCategory::from_type_name("FileOutput"),
            Some(PluginCategory::Output)
        );
        assert_eq!(
            PluginCategory::from_type_name("RegexDecoder"),
            Some(PluginCategory::Decoder)
        );
        assert_eq!(
            PluginCategory::from_type_name("JsonEncoder"),
            Some(PluginCategory::Encoder)
        );
        assert_eq!(
            PluginCategory::from_type_name("TrimFilter"),
            Some(PluginCategory::Filter)
        );
    }

    #[test]
    fn test_unrecognized_suffix_is_none() {
        assert_eq!(PluginCategory::from_type_name("Splitter"), None);
        assert_eq!(PluginCategory::from_type_name("Input"), None);
        assert_eq!(PluginCategory::from_type_name("tcpinput"), None);
    }

    #[test]
    fn test_section_parses_common_keys() {
        let section = PluginSection::from_table(
            "tcp_in",
            table(
                r#"
type = "TcpInput"
tag = "web"
filter = "trim"
address = "0.0.0.0:5565"
"#,
            ),
        )
        .unwrap();

        assert_eq!(section.name(), "tcp_in");
        assert_eq!(section.type_name(), "TcpInput");
        assert_eq!(section.category(), Some(PluginCategory::Input));
        assert_eq!(section.common().tag.as_deref(), Some("web"));
        assert_eq!(section.common().filter.as_deref(), Some("trim"));
        assert_eq!(section.common().decoder, None);
        assert!(section.settings().contains_key("address"));
    }

    #[test]
    fn test_section_missing_type() {
        let err = PluginSection::from_table("broken", table("tag = \"x\"")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "type", .. }));
    }

    #[test]
    fn test_section_non_string_tag() {
        let err =
            PluginSection::from_table("broken", table("type = \"TcpInput\"\ntag = 3")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "tag", .. }));
    }

    #[test]
    fn test_empty_tag_counts_as_missing() {
        let section =
            PluginSection::from_table("in", table("type = \"TcpInput\"\ntag = \"\"")).unwrap();
        assert_eq!(section.common().tag, None);
        assert_eq!(section.common().tag_or_empty(), "");
    }

    #[test]
    fn test_decode_plugin_settings() {
        #[derive(Debug, Deserialize)]
        #[serde(default)]
        struct Settings {
            address: String,
            keep_alive: bool,
        }

        impl Default for Settings {
            fn default() -> Self {
                Self {
                    address: "127.0.0.1:1".into(),
                    keep_alive: false,
                }
            }
        }

        let section = PluginSection::from_table(
            "tcp_in",
            table("type = \"TcpInput\"\ntag = \"web\"\nkeep_alive = true"),
        )
        .unwrap();
        let settings: Settings = section.decode().unwrap();
        assert!(settings.keep_alive);
        assert_eq!(settings.address, "127.0.0.1:1");
    }

    #[test]
    fn test_decode_type_mismatch() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Settings {
            port: u16,
        }

        let section =
            PluginSection::from_table("in", table("type = \"UdpInput\"\nport = \"nope\"")).unwrap();
        let err = section.decode::<Settings>().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSettings { .. }));
    }
}
