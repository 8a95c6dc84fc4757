//! Field layout for attribute dialogs.
//!
//! The builder turns a template's attribute list into toolkit-neutral field descriptors: one
//! mandatory field per attribute, two fields per row. It also keeps the mapping between the
//! synthetic field names it generates and the real attribute names, so submitted values can be
//! turned back into a [`Selection`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::selection::{AttributeValue, Selection};
use crate::domain::template::{Attribute, AttributeKind};
use crate::errors::DomainError;

pub const DEFAULT_FIELD_PREFIX: &str = "attr__";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "fieldtype", rename_all = "snake_case")]
pub enum FieldKind {
    Select { options: Vec<String> },
    Float,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub label: String,
    pub fieldname: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    pub reqd: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "element", rename_all = "snake_case")]
pub enum FormElement {
    Field(FieldDescriptor),
    ColumnBreak,
    SectionBreak,
}

/// Bijective mapping between generated field names and attribute names.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldKeyMap {
    by_field: BTreeMap<String, String>,
    by_attribute: BTreeMap<String, String>,
}

impl FieldKeyMap {
    pub fn insert(&mut self, fieldname: impl Into<String>, attribute: impl Into<String>) {
        let fieldname = fieldname.into();
        let attribute = attribute.into();
        self.by_field.insert(fieldname.clone(), attribute.clone());
        self.by_attribute.insert(attribute, fieldname);
    }

    pub fn attribute_for(&self, fieldname: &str) -> Option<&str> {
        self.by_field.get(fieldname).map(String::as_str)
    }

    pub fn field_for(&self, attribute: &str) -> Option<&str> {
        self.by_attribute.get(attribute).map(String::as_str)
    }

    pub fn contains_field(&self, fieldname: &str) -> bool {
        self.by_field.contains_key(fieldname)
    }

    pub fn len(&self) -> usize {
        self.by_field.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_field.is_empty()
    }
}

/// Raw user input keyed by field name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldValues(BTreeMap<String, String>);

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, fieldname: impl Into<String>, value: impl Into<String>) {
        self.0.insert(fieldname.into(), value.into());
    }

    pub fn with(mut self, fieldname: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(fieldname, value);
        self
    }

    pub fn get(&self, fieldname: &str) -> Option<&str> {
        self.0.get(fieldname).map(String::as_str)
    }

    pub fn merge(&mut self, other: &FieldValues) {
        for (fieldname, value) in &other.0 {
            self.0.insert(fieldname.clone(), value.clone());
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeForm {
    pub elements: Vec<FormElement>,
    pub key_map: FieldKeyMap,
    attributes: Vec<Attribute>,
}

impl AttributeForm {
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.elements.iter().filter_map(|element| match element {
            FormElement::Field(field) => Some(field),
            _ => None,
        })
    }

    /// Fields grouped by the row they render in.
    pub fn rows(&self) -> Vec<Vec<&FieldDescriptor>> {
        let mut rows = Vec::new();
        let mut current = Vec::new();
        for element in &self.elements {
            match element {
                FormElement::Field(field) => current.push(field),
                FormElement::ColumnBreak => {}
                FormElement::SectionBreak => rows.push(std::mem::take(&mut current)),
            }
        }
        if !current.is_empty() {
            rows.push(current);
        }
        rows
    }

    pub fn field_for_attribute(&self, attribute: &str) -> Option<&str> {
        self.key_map.field_for(attribute)
    }

    /// Maps submitted values back to attribute names, enforcing required fields.
    pub fn collect(&self, values: &FieldValues) -> Result<Selection, DomainError> {
        let mut selection = Selection::new();
        let mut missing = Vec::new();

        for attribute in &self.attributes {
            let Some(fieldname) = self.key_map.field_for(&attribute.name) else {
                return Err(DomainError::InvariantViolation(format!(
                    "attribute `{}` has no generated field",
                    attribute.name
                )));
            };

            match values.get(fieldname).map(str::trim).filter(|raw| !raw.is_empty()) {
                Some(raw) => {
                    selection.insert(attribute.name.clone(), AttributeValue::parse_for(attribute, raw)?);
                }
                None => missing.push(attribute.name.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(DomainError::IncompleteSelection { missing });
        }
        Ok(selection)
    }
}

pub struct AttributeFormBuilder {
    prefix: String,
    elements: Vec<FormElement>,
    key_map: FieldKeyMap,
    attributes: Vec<Attribute>,
}

impl Default for AttributeFormBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_FIELD_PREFIX)
    }
}

impl AttributeFormBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            elements: Vec::new(),
            key_map: FieldKeyMap::default(),
            attributes: Vec::new(),
        }
    }

    /// Adds one mandatory field. Attribute names must be unique within a form.
    pub fn attribute(mut self, attribute: &Attribute) -> Result<Self, DomainError> {
        if self.key_map.field_for(&attribute.name).is_some() {
            return Err(DomainError::DuplicateAttribute(attribute.name.clone()));
        }
        let fieldname = self.unique_fieldname(&attribute.name);
        self.key_map.insert(fieldname.clone(), attribute.name.clone());

        let kind = match &attribute.kind {
            AttributeKind::Discrete { values } => FieldKind::Select { options: values.clone() },
            AttributeKind::Numeric => FieldKind::Float,
        };
        self.elements.push(FormElement::Field(FieldDescriptor {
            label: attribute.name.clone(),
            fieldname,
            kind,
            reqd: true,
        }));

        self.attributes.push(attribute.clone());
        if self.attributes.len() % 2 == 1 {
            self.elements.push(FormElement::ColumnBreak);
        } else {
            self.elements.push(FormElement::SectionBreak);
        }
        Ok(self)
    }

    pub fn attributes<'a, I>(self, attributes: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = &'a Attribute>,
    {
        attributes.into_iter().try_fold(self, Self::attribute)
    }

    pub fn build(mut self) -> AttributeForm {
        if self.attributes.len() % 2 == 1 {
            self.elements.push(FormElement::SectionBreak);
        }
        AttributeForm { elements: self.elements, key_map: self.key_map, attributes: self.attributes }
    }

    fn unique_fieldname(&self, attribute_name: &str) -> String {
        let base = format!("{}{}", self.prefix, scrub(attribute_name));
        if !self.key_map.contains_field(&base) {
            return base;
        }
        let mut suffix = 2u32;
        loop {
            let candidate = format!("{base}_{suffix}");
            if !self.key_map.contains_field(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }
}

pub fn build_attribute_form(attributes: &[Attribute]) -> Result<AttributeForm, DomainError> {
    Ok(AttributeFormBuilder::default().attributes(attributes)?.build())
}

/// Lower-cases and collapses each run of non-word characters into `_`.
pub fn scrub(name: &str) -> String {
    let mut scrubbed = String::with_capacity(name.len());
    let mut in_separator = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            scrubbed.push(ch.to_ascii_lowercase());
            in_separator = false;
        } else if !in_separator {
            scrubbed.push('_');
            in_separator = true;
        }
    }
    scrubbed
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{build_attribute_form, scrub, AttributeForm, FieldKind, FieldValues, FormElement};
    use crate::domain::selection::AttributeValue;
    use crate::domain::template::Attribute;
    use crate::errors::DomainError;

    fn form_for(attributes: &[Attribute]) -> AttributeForm {
        build_attribute_form(attributes).expect("distinct attribute names")
    }

    fn attributes(count: usize) -> Vec<Attribute> {
        (0..count).map(|index| Attribute::numeric(format!("Dim {index}"))).collect()
    }

    #[test]
    fn scrub_collapses_non_word_runs() {
        assert_eq!(scrub("Perimeter Inches"), "perimeter_inches");
        assert_eq!(scrub("LED Count (per ft)"), "led_count_per_ft_");
        assert_eq!(scrub("Face/Return -- Color"), "face_return_color");
        assert_eq!(scrub("already_scrubbed"), "already_scrubbed");
    }

    #[test]
    fn every_attribute_gets_one_mandatory_field() {
        for count in 0..7 {
            let form = form_for(&attributes(count));
            assert_eq!(form.fields().count(), count);
            assert!(form.fields().all(|field| field.reqd));
            assert_eq!(form.key_map.len(), count);
        }
    }

    #[test]
    fn fields_are_paired_two_per_row_with_trailing_break() {
        for count in 1..7 {
            let form = form_for(&attributes(count));
            let rows = form.rows();

            assert_eq!(rows.len(), count.div_ceil(2), "rows for {count} attributes");
            assert!(rows.iter().all(|row| row.len() <= 2));
            assert_eq!(form.elements.last(), Some(&FormElement::SectionBreak));
        }
    }

    #[test]
    fn odd_layout_sequence_matches_column_then_section_breaks() {
        let form = form_for(&attributes(3));
        let shape = form
            .elements
            .iter()
            .map(|element| match element {
                FormElement::Field(_) => "field",
                FormElement::ColumnBreak => "column",
                FormElement::SectionBreak => "section",
            })
            .collect::<Vec<_>>();

        assert_eq!(
            shape,
            vec!["field", "column", "field", "section", "field", "column", "section"]
        );
    }

    #[test]
    fn discrete_attributes_render_as_select_with_options() {
        let form = form_for(&[
            Attribute::discrete("Color", ["Red", "Blue"]),
            Attribute::numeric("Size"),
        ]);
        let fields = form.fields().collect::<Vec<_>>();

        assert_eq!(fields[0].fieldname, "attr__color");
        assert_eq!(
            fields[0].kind,
            FieldKind::Select { options: vec!["Red".to_owned(), "Blue".to_owned()] }
        );
        assert_eq!(fields[1].kind, FieldKind::Float);
        assert_eq!(form.key_map.attribute_for("attr__size"), Some("Size"));
    }

    #[test]
    fn colliding_names_get_distinct_fields() {
        let form = form_for(&[
            Attribute::numeric("Return Depth"),
            Attribute::numeric("Return-Depth"),
        ]);

        assert_eq!(form.field_for_attribute("Return Depth"), Some("attr__return_depth"));
        assert_eq!(form.field_for_attribute("Return-Depth"), Some("attr__return_depth_2"));
    }

    #[test]
    fn repeated_attribute_names_are_rejected() {
        let error = build_attribute_form(&[
            Attribute::numeric("Size"),
            Attribute::discrete("Color", ["Red"]),
            Attribute::discrete("Size", ["Small"]),
        ])
        .expect_err("Size appears twice");

        assert_eq!(error, DomainError::DuplicateAttribute("Size".to_owned()));
    }

    #[test]
    fn collect_maps_back_to_real_attribute_names() {
        let form = form_for(&[
            Attribute::discrete("Color", ["Red", "Blue"]),
            Attribute::numeric("Perimeter Inches"),
        ]);
        let values = FieldValues::new()
            .with("attr__color", "Red")
            .with("attr__perimeter_inches", "144.5")
            .with("sign_template", "LED-SIGN-01");

        let selection = form.collect(&values).expect("complete input");

        assert_eq!(selection.names().collect::<Vec<_>>(), vec!["Color", "Perimeter Inches"]);
        assert_eq!(
            selection.get("Perimeter Inches"),
            Some(&AttributeValue::Number(Decimal::new(1445, 1)))
        );
    }

    #[test]
    fn collect_reports_blank_required_fields_by_label() {
        let form = form_for(&[
            Attribute::discrete("Color", ["Red", "Blue"]),
            Attribute::numeric("Size"),
        ]);
        let values = FieldValues::new().with("attr__size", "  ");

        assert_eq!(
            form.collect(&values),
            Err(DomainError::IncompleteSelection {
                missing: vec!["Color".to_owned(), "Size".to_owned()]
            })
        );
    }

    #[test]
    fn field_descriptor_serializes_like_a_dialog_field() {
        let form = form_for(&[Attribute::numeric("Size")]);
        let json = serde_json::to_value(&form.elements[0]).expect("serialize");

        assert_eq!(json["element"], "field");
        assert_eq!(json["fieldtype"], "float");
        assert_eq!(json["fieldname"], "attr__size");
        assert_eq!(json["reqd"], true);
    }
}
