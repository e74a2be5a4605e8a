// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Building formatters from declarative configuration.
//!
//! A configuration loader describes each formatter as a mapping whose `"()"` key names a factory
//! and whose other keys are the factory's options:
//!
//! ```json
//! {
//!     "formatters": {
//!         "json": {
//!             "()": "json",
//!             "format": "my-app: {json}",
//!             "json_encoder": {"indent": 2, "separators": [", ", ": "]}
//!         }
//!     }
//! }
//! ```
//!
//! [`FormatterRegistry`] resolves the factory names.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::Error;
use crate::ErrorKind;
use crate::JsonFormatter;
use crate::adapter::DefaultRecordAdapter;
use crate::encoder::EncoderOptions;
use crate::encoder::Hooks;
use crate::encoder::JsonEncoder;
use crate::kv::Opaque;
use crate::template::Template;

/// The options of [`json_formatter_factory`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormatterConfig {
    /// The template; default to `"{json}"`.
    #[serde(default = "default_format")]
    pub format: String,
    /// The encoder options; default to none.
    #[serde(default)]
    pub json_encoder: EncoderOptions,
}

fn default_format() -> String {
    Template::PLACEHOLDER.to_string()
}

impl Default for FormatterConfig {
    fn default() -> Self {
        FormatterConfig {
            format: default_format(),
            json_encoder: EncoderOptions::default(),
        }
    }
}

impl FormatterConfig {
    /// Deserialize a configuration from a declarative mapping.
    ///
    /// # Errors
    ///
    /// Return an error of kind [`ErrorKind::InvalidConfig`] for unknown keys and ill-typed
    /// values.
    pub fn from_value(value: serde_json::Value) -> Result<Self, Error> {
        serde_json::from_value(value)
            .map_err(|err| Error::from_config_error("json formatter config", err))
    }
}

/// Build a [`JsonFormatter`] with the default record adapter.
///
/// # Errors
///
/// Return an error of kind [`ErrorKind::InvalidConfig`] if the template is malformed or the
/// encoder options name an unknown hook.
///
/// # Examples
///
/// ```
/// use jsonlogging::config::FormatterConfig;
/// use jsonlogging::config::json_formatter_factory;
/// use jsonlogging::encoder::Hooks;
///
/// let config = FormatterConfig::from_value(serde_json::json!({
///     "format": "my-app: {json}",
///     "json_encoder": {"indent": 2},
/// }))
/// .unwrap();
///
/// let formatter = json_formatter_factory(&config, &Hooks::builtin()).unwrap();
/// assert_eq!(formatter.format_str(), "my-app: {json}");
/// assert_eq!(formatter.encoder().indent(), Some(2));
/// ```
pub fn json_formatter_factory(
    config: &FormatterConfig,
    hooks: &Hooks,
) -> Result<JsonFormatter, Error> {
    let template = Template::parse(config.format.as_str())?;
    let encoder = JsonEncoder::from_options(&config.json_encoder, hooks)?;
    Ok(JsonFormatter::new(
        template,
        encoder,
        DefaultRecordAdapter::default(),
    ))
}

/// A constructor registered under a factory name.
///
/// It receives the options of a formatter entry, without the `"()"` key.
pub type FormatterFactory =
    Arc<dyn Fn(serde_json::Value, &Hooks) -> Result<JsonFormatter, Error> + Send + Sync>;

/// Maps factory names to formatter constructors.
///
/// The name `json` is registered with [`json_formatter_factory`]. Each registry owns its table of
/// default hooks, starting from [`Hooks::builtin`].
///
/// # Examples
///
/// ```
/// use jsonlogging::config::FormatterRegistry;
///
/// let registry = FormatterRegistry::new();
/// let formatters = registry
///     .build_all(&serde_json::json!({
///         "plain": {"()": "json"},
///         "pretty": {"()": "json", "json_encoder": {"indent": 4}},
///     }))
///     .unwrap();
///
/// assert_eq!(formatters["plain"].encoder().indent(), None);
/// assert_eq!(formatters["pretty"].encoder().indent(), Some(4));
/// ```
#[derive(Clone)]
pub struct FormatterRegistry {
    factories: BTreeMap<String, FormatterFactory>,
    hooks: Hooks,
}

impl fmt::Debug for FormatterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatterRegistry")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatterRegistry {
    /// The key naming the factory of a formatter entry.
    pub const FACTORY_KEY: &'static str = "()";

    /// Create a registry with the built-in factory and hooks.
    pub fn new() -> Self {
        FormatterRegistry {
            factories: BTreeMap::new(),
            hooks: Hooks::builtin(),
        }
        .register("json", |options, hooks| {
            let config = FormatterConfig::from_value(options)?;
            json_formatter_factory(&config, hooks)
        })
    }

    /// Register a factory, replacing any factory of the same name.
    pub fn register(
        mut self,
        name: impl Into<String>,
        factory: impl Fn(serde_json::Value, &Hooks) -> Result<JsonFormatter, Error>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Register a default hook that encoder options can name.
    pub fn with_hook(
        mut self,
        name: impl Into<String>,
        hook: impl Fn(&Opaque) -> Result<serde_json::Value, Error> + Send + Sync + 'static,
    ) -> Self {
        self.hooks = self.hooks.register(name, hook);
        self
    }

    /// The hooks available to factories.
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Whether a factory is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Build one formatter entry.
    ///
    /// # Errors
    ///
    /// Return an error of kind [`ErrorKind::InvalidConfig`] if the entry is not a mapping, has no
    /// `"()"` key, names an unknown factory, or the factory rejects its options.
    pub fn build(&self, entry: &serde_json::Value) -> Result<JsonFormatter, Error> {
        let Some(entry) = entry.as_object() else {
            return Err(Error::new(
                ErrorKind::InvalidConfig,
                "formatter entry must be a mapping",
            ));
        };

        let name = match entry.get(Self::FACTORY_KEY) {
            Some(serde_json::Value::String(name)) => name,
            Some(other) => {
                return Err(Error::new(
                    ErrorKind::InvalidConfig,
                    "formatter factory name must be a string",
                )
                .with_context("factory", other));
            }
            None => {
                return Err(Error::new(
                    ErrorKind::InvalidConfig,
                    "formatter entry has no factory key",
                )
                .with_context("key", Self::FACTORY_KEY));
            }
        };

        let Some(factory) = self.factories.get(name) else {
            return Err(
                Error::new(ErrorKind::InvalidConfig, "unknown formatter factory")
                    .with_context("factory", name),
            );
        };

        let options = entry
            .iter()
            .filter(|(key, _)| key.as_str() != Self::FACTORY_KEY)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect::<serde_json::Map<_, _>>();
        factory(serde_json::Value::Object(options), &self.hooks)
            .map_err(|err| err.with_context("factory", name))
    }

    /// Build every entry of a `formatters` section, keyed by formatter name.
    ///
    /// # Errors
    ///
    /// Return the first error of [`FormatterRegistry::build`], with the formatter name in its
    /// context, or an error of kind [`ErrorKind::InvalidConfig`] if the section is not a
    /// mapping.
    pub fn build_all(
        &self,
        section: &serde_json::Value,
    ) -> Result<BTreeMap<String, JsonFormatter>, Error> {
        let Some(section) = section.as_object() else {
            return Err(Error::new(
                ErrorKind::InvalidConfig,
                "formatters section must be a mapping",
            ));
        };

        let mut formatters = BTreeMap::new();
        for (name, entry) in section {
            let formatter = self
                .build(entry)
                .map_err(|err| err.with_context("formatter", name))?;
            formatters.insert(name.clone(), formatter);
        }
        Ok(formatters)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::kv::Value;
    use crate::record::Record;

    #[test]
    fn test_factory_from_declarative_config() {
        let registry = FormatterRegistry::new();
        let formatters = registry
            .build_all(&json!({
                "test-json-formatter": {
                    "()": "json",
                    "format": "test: {json}",
                    "json_encoder": {
                        "indent": 2,
                        "separators": [" , ", " : "]
                    }
                }
            }))
            .unwrap();

        let formatter = &formatters["test-json-formatter"];
        assert_eq!(formatter.format_str(), "test: {json}");
        assert_eq!(formatter.encoder().indent(), Some(2));
        assert_eq!(formatter.encoder().item_separator(), " , ");
        assert_eq!(formatter.encoder().key_separator(), " : ");
    }

    #[test]
    fn test_factory_defaults() {
        let config = FormatterConfig::from_value(json!({})).unwrap();
        assert_eq!(config, FormatterConfig::default());

        let formatter = json_formatter_factory(&config, &Hooks::builtin()).unwrap();
        assert_eq!(formatter.format_str(), "{json}");
        assert_eq!(formatter.encoder().indent(), None);
        assert_eq!(formatter.encoder().item_separator(), ", ");
        assert_eq!(formatter.encoder().key_separator(), ": ");

        let record = Record::builder().message("hello").build();
        let line = formatter.format(&record);
        assert!(line.starts_with(r#"{"timestamp": ""#), "{line}");
    }

    #[test]
    fn test_unknown_options_are_rejected() {
        let err = FormatterConfig::from_value(json!({"fmt": "{json}"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        let err = FormatterConfig::from_value(json!({"json_encoder": {"width": 80}})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        let err = FormatterRegistry::new()
            .build(&json!({"()": "json", "json_encoder": {"indent": "two"}}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_invalid_template_is_rejected() {
        let config = FormatterConfig {
            format: "no placeholder".to_string(),
            ..FormatterConfig::default()
        };
        let err = json_formatter_factory(&config, &Hooks::builtin()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_registry_errors() {
        let registry = FormatterRegistry::new();

        let err = registry.build(&json!({"format": "{json}"})).unwrap_err();
        assert_eq!(err.message(), "formatter entry has no factory key");

        let err = registry.build(&json!({"()": "yaml"})).unwrap_err();
        assert_eq!(err.message(), "unknown formatter factory");

        let err = registry.build(&json!("json")).unwrap_err();
        assert_eq!(err.message(), "formatter entry must be a mapping");

        let err = registry.build_all(&json!({"broken": {"()": 1}})).unwrap_err();
        assert_eq!(err.message(), "formatter factory name must be a string");
        assert!(err.to_string().contains("formatter: broken"), "{err}");
    }

    #[test]
    fn test_named_hooks() {
        #[derive(Debug)]
        struct Point(i32, i32);

        let registry = FormatterRegistry::new().with_hook("point", |o| match o.downcast_ref::<Point>() {
            Some(Point(x, y)) => Ok(json!([x, y])),
            None => Err(Error::new(ErrorKind::Unserializable, "not a point")),
        });

        let formatter = registry
            .build(&json!({
                "()": "json",
                "json_encoder": {"default": "point", "separators": [",", ":"]}
            }))
            .unwrap();
        let record = Record::builder()
            .message("moved")
            .key_value("to", Value::opaque(Point(1, 2)))
            .build();
        assert!(formatter.format(&record).ends_with(r#""to":[1,2]}"#));

        let err = registry
            .build(&json!({"()": "json", "json_encoder": {"default": "missing"}}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_custom_factory() {
        let registry = FormatterRegistry::new().register("pretty", |options, hooks| {
            let mut config = FormatterConfig::from_value(options)?;
            config.json_encoder.indent = Some(4);
            json_formatter_factory(&config, hooks)
        });
        assert!(registry.contains("json"));
        assert!(registry.contains("pretty"));

        let formatter = registry.build(&json!({"()": "pretty"})).unwrap();
        assert_eq!(formatter.encoder().indent(), Some(4));
    }
}
