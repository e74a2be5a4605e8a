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

use std::fmt;
use std::str::FromStr;

use crate::Error;
use crate::ErrorKind;

/// The text surrounding the serialized JSON of a record.
///
/// A template contains exactly one `{json}` placeholder. Literal braces are written `{{` and `}}`.
///
/// # Examples
///
/// ```
/// use jsonlogging::template::Template;
///
/// let template: Template = "my-app: {json}".parse().unwrap();
/// assert_eq!(template.render(r#"{"level":"INFO"}"#), r#"my-app: {"level":"INFO"}"#);
///
/// assert!("no placeholder".parse::<Template>().is_err());
/// assert!("{json} {json}".parse::<Template>().is_err());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    prefix: String,
    suffix: String,
}

impl Template {
    /// The placeholder replaced by the serialized JSON.
    pub const PLACEHOLDER: &'static str = "{json}";

    /// Parse a template.
    ///
    /// # Errors
    ///
    /// Return an error of kind [`ErrorKind::InvalidConfig`] if the template does not contain
    /// exactly one placeholder, contains any other replacement field, or has an unmatched brace.
    pub fn parse(source: impl Into<String>) -> Result<Self, Error> {
        let source = source.into();

        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut placeholders = 0;

        let mut chars = source.char_indices().peekable();
        while let Some((pos, c)) = chars.next() {
            let out = if placeholders == 0 {
                &mut prefix
            } else {
                &mut suffix
            };

            match c {
                '{' if chars.next_if(|(_, c)| *c == '{').is_some() => out.push('{'),
                '}' if chars.next_if(|(_, c)| *c == '}').is_some() => out.push('}'),
                '{' => {
                    let rest = &source[pos..];
                    let Some(end) = rest.find('}') else {
                        return Err(invalid(&source, "single '{' encountered in template"));
                    };
                    let field = &rest[..=end];
                    if field != Self::PLACEHOLDER {
                        return Err(invalid(&source, "unsupported replacement field in template")
                            .with_context("field", field));
                    }
                    placeholders += 1;
                    // skip the rest of the placeholder
                    for _ in 1..Self::PLACEHOLDER.len() {
                        chars.next();
                    }
                }
                '}' => return Err(invalid(&source, "single '}' encountered in template")),
                c => out.push(c),
            }
        }

        if placeholders != 1 {
            return Err(
                invalid(&source, "template must contain exactly one {json} placeholder")
                    .with_context("found", placeholders),
            );
        }

        Ok(Template {
            source,
            prefix,
            suffix,
        })
    }

    /// The template as configured.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Substitute the placeholder with `json`.
    pub fn render(&self, json: &str) -> String {
        let mut out = String::with_capacity(self.prefix.len() + json.len() + self.suffix.len());
        out.push_str(&self.prefix);
        out.push_str(json);
        out.push_str(&self.suffix);
        out
    }
}

fn invalid(source: &str, message: &'static str) -> Error {
    Error::new(ErrorKind::InvalidConfig, message).with_context("template", source)
}

/// The template that is just the JSON.
impl Default for Template {
    fn default() -> Self {
        Template {
            source: Self::PLACEHOLDER.to_string(),
            prefix: String::new(),
            suffix: String::new(),
        }
    }
}

impl FromStr for Template {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Template::parse(s)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.source, f)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
