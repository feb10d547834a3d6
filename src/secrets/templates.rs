//! Secret file templates.
//!
//! Templates are Tera templates. Secret values are looked up by alias with
//! the `secret(alias="...")` function; the `sh_quote`, `b64encode` and
//! `b64decode` filters are available in every template. When a group has no
//! custom template one is derived from its file format.

use std::collections::HashMap;
use std::error::Error as _;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use base64::{engine::general_purpose::STANDARD, Engine};
use regex::Regex;
use tera::{Context, Function, Tera, Value};

use super::{Secret, SecretSpec};
use crate::errors::{Error, Result};

const TEMPLATE_NAME: &str = "secret-file";

/// Value substituted for every alias when a template is checked before any
/// secret is known. Valid base64 so `b64decode` does not fail the check.
const PLACEHOLDER_VALUE: &str = "c2VjcmV0";

static STRUCTURED_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.\-/]+$").expect("STRUCTURED_KEY should be a valid regex pattern")
});

static SHELL_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("SHELL_VARIABLE should be a valid regex pattern")
});

/// Named output formats with a derived template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    #[default]
    Yaml,
    Json,
    Dotenv,
    Bash,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Yaml => "yaml",
            FileFormat::Json => "json",
            FileFormat::Dotenv => "dotenv",
            FileFormat::Bash => "bash",
        }
    }

    fn accepts_alias(&self, alias: &str) -> bool {
        match self {
            FileFormat::Yaml | FileFormat::Json => STRUCTURED_KEY.is_match(alias),
            FileFormat::Dotenv | FileFormat::Bash => SHELL_VARIABLE.is_match(alias),
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "yaml" => Ok(FileFormat::Yaml),
            "json" => Ok(FileFormat::Json),
            "dotenv" => Ok(FileFormat::Dotenv),
            "bash" => Ok(FileFormat::Bash),
            other => Err(Error::config(format!(
                "unknown file format {:?}; expected yaml, json, dotenv or bash",
                other
            ))),
        }
    }
}

/// Derive the template that renders `specs` in `format`.
pub fn file_template_for_format(format: FileFormat, specs: &[SecretSpec]) -> Result<String> {
    let invalid: Vec<&str> = specs
        .iter()
        .map(|spec| spec.alias.as_str())
        .filter(|alias| !format.accepts_alias(alias))
        .collect();
    if !invalid.is_empty() {
        return Err(Error::config(format!(
            "aliases {:?} are not valid keys for file format {:?}",
            invalid,
            format.as_str()
        )));
    }

    let lookup = |alias: &str| format!("secret(alias=\"{}\")", alias);
    let template = match format {
        FileFormat::Yaml => specs
            .iter()
            .map(|spec| {
                format!("\"{}\": {{{{ {} | json_encode() }}}}\n", spec.alias, lookup(&spec.alias))
            })
            .collect::<String>(),
        FileFormat::Json => {
            let entries: Vec<String> = specs
                .iter()
                .map(|spec| {
                    format!("\"{}\": {{{{ {} | json_encode() }}}}", spec.alias, lookup(&spec.alias))
                })
                .collect();
            format!("{{{}}}\n", entries.join(", "))
        }
        FileFormat::Dotenv => specs
            .iter()
            .map(|spec| format!("{}={{{{ {} | sh_quote }}}}\n", spec.alias, lookup(&spec.alias)))
            .collect(),
        FileFormat::Bash => specs
            .iter()
            .map(|spec| {
                format!("export {}={{{{ {} | sh_quote }}}}\n", spec.alias, lookup(&spec.alias))
            })
            .collect(),
    };

    Ok(template)
}

/// Render `template` for `group` against the given secrets.
///
/// Every secret value must be UTF-8 text.
pub fn render_template(group: &str, template: &str, secrets: &[Secret]) -> Result<String> {
    let mut values = HashMap::with_capacity(secrets.len());
    for secret in secrets {
        let value = secret.value.expose_str().ok_or_else(|| {
            Error::data_integrity(format!(
                "secret {:?} in group {:?} is not valid UTF-8 and cannot be rendered",
                secret.alias, group
            ))
        })?;
        values.insert(secret.alias.clone(), value.to_string());
    }
    render_with_values(group, template, values)
}

/// Parse `template` and trial-render it with placeholder values for the
/// group's aliases, surfacing syntax errors and unknown aliases early.
pub fn check_template(group: &str, template: &str, specs: &[SecretSpec]) -> Result<()> {
    let values = specs
        .iter()
        .map(|spec| (spec.alias.clone(), PLACEHOLDER_VALUE.to_string()))
        .collect();
    render_with_values(group, template, values).map(|_| ())
}

fn render_with_values(group: &str, template: &str, values: HashMap<String, String>) -> Result<String> {
    let mut tera = Tera::default();
    tera.autoescape_on(Vec::new());
    tera.register_filter("sh_quote", sh_quote_filter);
    tera.register_filter("b64encode", b64encode_filter);
    tera.register_filter("b64decode", b64decode_filter);
    tera.register_function("secret", SecretLookup { values });

    tera.add_raw_template(TEMPLATE_NAME, template)
        .map_err(|e| Error::template(group, describe(&e)))?;
    tera.render(TEMPLATE_NAME, &Context::new()).map_err(|e| Error::template(group, describe(&e)))
}

/// Tera nests the useful message in the source chain.
fn describe(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

struct SecretLookup {
    values: HashMap<String, String>,
}

impl Function for SecretLookup {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let alias = args
            .get("alias")
            .and_then(Value::as_str)
            .ok_or_else(|| tera::Error::msg("secret() requires a string `alias` argument"))?;

        self.values
            .get(alias)
            .map(|value| Value::String(value.clone()))
            .ok_or_else(|| tera::Error::msg(format!("secret alias {:?} is not defined in this group", alias)))
    }

    fn is_safe(&self) -> bool {
        true
    }
}

fn string_arg<'a>(value: &'a Value, filter: &str) -> tera::Result<&'a str> {
    value.as_str().ok_or_else(|| tera::Error::msg(format!("{} filter expects a string", filter)))
}

/// Single-quote a value for POSIX shells.
fn sh_quote_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let raw = string_arg(value, "sh_quote")?;
    Ok(Value::String(format!("'{}'", raw.replace('\'', r"'\''"))))
}

fn b64encode_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let raw = string_arg(value, "b64encode")?;
    Ok(Value::String(STANDARD.encode(raw.as_bytes())))
}

fn b64decode_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let raw = string_arg(value, "b64decode")?;
    let bytes = STANDARD
        .decode(raw.trim())
        .map_err(|e| tera::Error::msg(format!("b64decode: {}", e)))?;
    String::from_utf8(bytes)
        .map(Value::String)
        .map_err(|_| tera::Error::msg("b64decode: decoded value is not valid UTF-8"))
}
