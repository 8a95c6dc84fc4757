use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::template::{Attribute, AttributeKind, Template};
use crate::errors::DomainError;

/// Largest magnitude accepted for a numeric attribute or a line quantity.
pub fn numeric_limit() -> Decimal {
    Decimal::from(1_000_000_000_i64)
}

/// A chosen attribute value. Numbers travel as JSON numbers, text as JSON strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeValue {
    Text(String),
    Number(Decimal),
}

impl AttributeValue {
    /// Parses raw input for `attribute`, checking numeric syntax and permitted options.
    pub fn parse_for(attribute: &Attribute, raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        match &attribute.kind {
            AttributeKind::Numeric => {
                let number = Decimal::from_str(trimmed).map_err(|_| DomainError::NotNumeric {
                    attribute: attribute.name.clone(),
                    value: raw.to_owned(),
                })?;
                check_magnitude(&attribute.name, number)?;
                Ok(Self::Number(number))
            }
            AttributeKind::Discrete { values } => {
                if values.iter().any(|value| value == trimmed) {
                    Ok(Self::Text(trimmed.to_owned()))
                } else {
                    Err(DomainError::ValueNotPermitted {
                        attribute: attribute.name.clone(),
                        value: raw.to_owned(),
                    })
                }
            }
        }
    }

    /// Stable textual form; numbers are normalized so `24` and `24.0` compare equal.
    pub fn canonical(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Number(number) => number.normalize().to_string(),
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Number(number) => Some(*number),
            Self::Text(text) => Decimal::from_str(text.trim()).ok(),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Number(number) => number.is_zero(),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Decimal> for AttributeValue {
    fn from(value: Decimal) -> Self {
        Self::Number(value)
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(text) => serializer.serialize_str(text),
            Self::Number(number) => match number.to_f64() {
                Some(float) => serializer.serialize_f64(float),
                None => serializer.serialize_str(&number.to_string()),
            },
        }
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Integer(i64),
            Float(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Integer(value) => Ok(Self::Number(Decimal::from(value))),
            Raw::Float(value) => Decimal::try_from(value)
                .map(Self::Number)
                .map_err(|error| serde::de::Error::custom(format!("invalid number: {error}"))),
            Raw::Text(text) => Ok(Self::Text(text)),
        }
    }
}

/// Attribute name to chosen value. Keys are real attribute names, never form field ids.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(BTreeMap<String, AttributeValue>);

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Checks that the selection covers exactly the template's attributes with acceptable values.
    pub fn validate_against(&self, template: &Template) -> Result<(), DomainError> {
        if let Some(unknown) = self.names().find(|name| template.attribute(name).is_none()) {
            return Err(DomainError::UnknownAttribute(unknown.to_owned()));
        }

        let missing = template
            .attributes
            .iter()
            .filter(|attribute| self.get(&attribute.name).is_none())
            .map(|attribute| attribute.name.clone())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(DomainError::IncompleteSelection { missing });
        }

        for attribute in &template.attributes {
            let Some(value) = self.get(&attribute.name) else { continue };
            match (&attribute.kind, value) {
                (AttributeKind::Numeric, AttributeValue::Number(number)) => {
                    check_magnitude(&attribute.name, *number)?;
                }
                (AttributeKind::Numeric, AttributeValue::Text(text)) => {
                    return Err(DomainError::NotNumeric {
                        attribute: attribute.name.clone(),
                        value: text.clone(),
                    });
                }
                (AttributeKind::Discrete { values }, value) => {
                    let canonical = value.canonical();
                    if !values.iter().any(|permitted| *permitted == canonical) {
                        return Err(DomainError::ValueNotPermitted {
                            attribute: attribute.name.clone(),
                            value: canonical,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Canonical key identifying the variant this selection resolves to. Separators inside
    /// names and values are backslash-escaped so distinct selections never share a key.
    pub fn signature(&self) -> String {
        self.0
            .iter()
            .map(|(name, value)| {
                let value = value.canonical();
                format!("{}={}", escape_signature_part(name), escape_signature_part(&value))
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

fn check_magnitude(attribute: &str, number: Decimal) -> Result<(), DomainError> {
    if number.abs() > numeric_limit() {
        return Err(DomainError::OutOfRange(format!("`{attribute}` value `{number}`")));
    }
    Ok(())
}

fn escape_signature_part(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | ';' | '=') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

impl FromIterator<(String, AttributeValue)> for Selection {
    fn from_iter<T: IntoIterator<Item = (String, AttributeValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
