use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemplateId(pub String);

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeKind {
    /// Ordered set of permitted values.
    Discrete { values: Vec<String> },
    Numeric,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(flatten)]
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn discrete<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: AttributeKind::Discrete { values: values.into_iter().map(Into::into).collect() },
        }
    }

    pub fn numeric(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: AttributeKind::Numeric }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, AttributeKind::Numeric)
    }

    pub fn permitted_values(&self) -> &[String] {
        match &self.kind {
            AttributeKind::Discrete { values } => values,
            AttributeKind::Numeric => &[],
        }
    }
}

/// Variant-capable product definition and its configurable attributes, in display order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub item_name: String,
    pub has_variants: bool,
    pub attributes: Vec<Attribute>,
}

impl Template {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attribute| attribute.name == name)
    }

    pub fn ensure_variant_capable(&self) -> Result<(), DomainError> {
        if !self.has_variants {
            return Err(DomainError::NotVariantCapable(self.id.0.clone()));
        }
        Ok(())
    }
}
