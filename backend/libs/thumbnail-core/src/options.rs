//! Processing options and their canonical form
//!
//! Options arrive as tokens: a bare flag (`crop`) or `name=value`
//! (`quality=95`). An injected [`OptionSchema`] decides which names exist,
//! how values are checked and in which order they appear once canonical.
//! The order is the schema's declaration order (flags first, then values),
//! never alphabetical, so `sharpen,crop` and `crop,sharpen` name the same
//! derivative.

use crate::error::ValidationError;
use std::fmt;

/// Option names understood by the standard schema
pub mod names {
    pub const AUTOCROP: &str = "autocrop";
    pub const CROP: &str = "crop";
    pub const PAD: &str = "pad";
    pub const UPSCALE: &str = "upscale";
    pub const SHARPEN: &str = "sharpen";
    pub const DETAIL: &str = "detail";
    pub const COLORSPACE: &str = "colorspace";
    pub const FORMAT: &str = "format";
    pub const QUALITY: &str = "quality";
}

/// Type and validity rule of an option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionKind {
    Flag,
    Integer { min: i64, max: i64 },
    Choice(Vec<String>),
}

/// How an option is rendered into a readable basename
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    /// `crop`, `colorspace-gray`
    Name,
    /// `q95`
    Prefix(String),
    /// Not rendered (e.g. carried by the file extension)
    Hidden,
}

/// A single parsed option value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OptionValue {
    Flag,
    Int(i64),
    Choice(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Flag => Ok(()),
            OptionValue::Int(v) => write!(f, "{}", v),
            OptionValue::Choice(v) => write!(f, "{}", v),
        }
    }
}

/// Schema entry for one option
#[derive(Debug, Clone)]
pub struct OptionSpec {
    pub name: String,
    pub kind: OptionKind,
    pub default: Option<OptionValue>,
    pub elidable: bool,
    pub label: Label,
}

impl OptionSpec {
    pub fn flag(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: OptionKind::Flag,
            default: None,
            elidable: false,
            label: Label::Name,
        }
    }

    pub fn integer(name: &str, min: i64, max: i64, default: Option<i64>) -> Self {
        Self {
            name: name.to_string(),
            kind: OptionKind::Integer { min, max },
            default: default.map(OptionValue::Int),
            elidable: false,
            label: Label::Name,
        }
    }

    pub fn choice(name: &str, values: &[&str], default: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            kind: OptionKind::Choice(values.iter().map(|v| v.to_string()).collect()),
            default: default.map(|d| OptionValue::Choice(d.to_string())),
            elidable: false,
            label: Label::Name,
        }
    }

    pub fn elidable(mut self, elidable: bool) -> Self {
        self.elidable = elidable;
        self
    }

    pub fn label(mut self, label: Label) -> Self {
        self.label = label;
        self
    }

    fn is_flag(&self) -> bool {
        self.kind == OptionKind::Flag
    }

    /// Validate a raw token value against this spec
    fn parse_value(&self, raw: Option<&str>) -> Result<OptionValue, ValidationError> {
        match (&self.kind, raw) {
            (OptionKind::Flag, None) => Ok(OptionValue::Flag),
            (OptionKind::Flag, Some(_)) => Err(ValidationError::bad_value(
                &self.name,
                "flag does not take a value",
            )),
            (_, None) | (_, Some("")) => {
                Err(ValidationError::bad_value(&self.name, "a value is required"))
            }
            (OptionKind::Integer { min, max }, Some(raw)) => {
                let not_integer =
                    || ValidationError::bad_value(&self.name, format!("'{}' is not an integer", raw));
                // Plain decimal only: no sign unless negatives are allowed, no leading zeros
                let digits = raw.strip_prefix('-').filter(|_| *min < 0).unwrap_or(raw);
                if digits.is_empty()
                    || !digits.bytes().all(|b| b.is_ascii_digit())
                    || (digits.len() > 1 && digits.starts_with('0'))
                {
                    return Err(not_integer());
                }
                let value: i64 = raw.parse().map_err(|_| not_integer())?;
                if value < *min || value > *max {
                    return Err(ValidationError::bad_value(
                        &self.name,
                        format!("{} is outside {}..={}", value, min, max),
                    ));
                }
                Ok(OptionValue::Int(value))
            }
            (OptionKind::Choice(allowed), Some(raw)) => allowed
                .iter()
                .find(|candidate| candidate.eq_ignore_ascii_case(raw))
                .map(|canonical| OptionValue::Choice(canonical.clone()))
                .ok_or_else(|| {
                    ValidationError::bad_value(
                        &self.name,
                        format!("'{}' is not one of {}", raw, allowed.join(", ")),
                    )
                }),
        }
    }
}

/// Ordered set of known options; declaration order is the priority table
#[derive(Debug, Clone)]
pub struct OptionSchema {
    specs: Vec<OptionSpec>,
}

impl OptionSchema {
    pub fn new(specs: Vec<OptionSpec>) -> Self {
        Self { specs }
    }

    /// Deployment default schema
    ///
    /// `elidable` names the value options whose default is dropped from the
    /// canonical form. Quality is never elided, so readable names always carry
    /// `q<quality>`.
    pub fn standard<S: AsRef<str>>(default_quality: u8, elidable: &[S]) -> Self {
        let is_elidable = |name: &str| elidable.iter().any(|e| e.as_ref() == name);

        Self::new(vec![
            OptionSpec::flag(names::AUTOCROP),
            OptionSpec::flag(names::CROP),
            OptionSpec::flag(names::PAD),
            OptionSpec::flag(names::UPSCALE),
            OptionSpec::flag(names::SHARPEN),
            OptionSpec::flag(names::DETAIL),
            OptionSpec::choice(names::COLORSPACE, &["RGB", "GRAY"], Some("RGB"))
                .elidable(is_elidable(names::COLORSPACE)),
            OptionSpec::choice(names::FORMAT, &["JPEG", "PNG"], Some("JPEG"))
                .elidable(is_elidable(names::FORMAT))
                .label(Label::Hidden),
            OptionSpec::integer(names::QUALITY, 0, 100, Some(i64::from(default_quality)))
                .label(Label::Prefix("q".to_string())),
        ])
    }

    pub fn spec(&self, name: &str) -> Option<&OptionSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    /// Sort key: flags before values, then declaration order
    fn rank(&self, name: &str) -> (u8, usize) {
        match self.specs.iter().position(|s| s.name == name) {
            Some(index) => (u8::from(!self.specs[index].is_flag()), index),
            None => (u8::MAX, usize::MAX),
        }
    }

    /// Parse and canonicalize option tokens
    pub fn parse<S: AsRef<str>>(&self, tokens: &[S]) -> Result<OptionSet, ValidationError> {
        let mut entries: Vec<(String, OptionValue)> = Vec::with_capacity(tokens.len());

        for token in tokens {
            let token = token.as_ref().trim();
            if token.is_empty() {
                continue;
            }

            let (name, raw) = match token.split_once('=') {
                Some((name, value)) => (name.trim(), Some(value.trim())),
                None => (token, None),
            };

            let spec = self
                .spec(name)
                .ok_or_else(|| ValidationError::UnknownOption(name.to_string()))?;
            let value = spec.parse_value(raw)?;

            // Last occurrence wins for repeated names
            match entries.iter_mut().find(|entry| entry.0 == name) {
                Some(entry) => entry.1 = value,
                None => entries.push((name.to_string(), value)),
            }
        }

        Ok(self.canonicalize(entries))
    }

    /// Apply defaults, elide elidable defaults and sort by priority
    pub fn canonicalize(&self, entries: Vec<(String, OptionValue)>) -> OptionSet {
        let mut canonical: Vec<(String, OptionValue)> = Vec::with_capacity(self.specs.len());

        for spec in &self.specs {
            let given = entries
                .iter()
                .find(|(name, _)| *name == spec.name)
                .map(|(_, value)| value.clone());

            let value = match (given, &spec.default) {
                (Some(value), _) => value,
                (None, Some(default)) => default.clone(),
                (None, None) => continue,
            };

            if spec.elidable && spec.default.as_ref() == Some(&value) {
                continue;
            }
            canonical.push((spec.name.clone(), value));
        }

        canonical.sort_by_key(|(name, _)| self.rank(name));
        OptionSet { entries: canonical }
    }

    /// Basename labels for a canonical option set, in canonical order
    pub fn labels(&self, options: &OptionSet) -> Vec<String> {
        options
            .iter()
            .filter_map(|(name, value)| {
                let spec = self.spec(name)?;
                match (&spec.label, value) {
                    (Label::Hidden, _) => None,
                    (Label::Prefix(prefix), value) => Some(format!("{}{}", prefix, value)),
                    (Label::Name, OptionValue::Flag) => Some(name.to_string()),
                    (Label::Name, value) => {
                        Some(format!("{}-{}", name, value.to_string().to_lowercase()))
                    }
                }
            })
            .collect()
    }
}

/// Canonical, deduplicated options for one request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OptionSet {
    entries: Vec<(String, OptionValue)>,
}

impl OptionSet {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn has_flag(&self, name: &str) -> bool {
        matches!(self.get(name), Some(OptionValue::Flag))
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(OptionValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn choice(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(OptionValue::Choice(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `crop,sharpen,quality=95`
    pub fn canonical_string(&self) -> String {
        self.entries
            .iter()
            .map(|(name, value)| match value {
                OptionValue::Flag => name.clone(),
                value => format!("{}={}", name, value),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for OptionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_string())
    }
}

/// Split the comma form (`sharpen,crop,quality=95`) into tokens
pub fn tokenize(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect()
}
