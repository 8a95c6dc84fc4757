use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::selection::Selection;
use crate::domain::template::{Template, TemplateId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemCode(pub String);

impl fmt::Display for ItemCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub item_code: ItemCode,
    pub item_name: String,
    pub template: TemplateId,
    pub selection: Selection,
}

impl Variant {
    pub fn new(template: &Template, selection: Selection) -> Self {
        Self {
            item_code: ItemCode(variant_item_code(template, &selection)),
            item_name: variant_item_name(template, &selection),
            template: template.id.clone(),
            selection,
        }
    }
}

/// `TEMPLATE-VALUE1-VALUE2`, values in attribute order, reduced to upper-case alphanumeric runs.
pub fn variant_item_code(template: &Template, selection: &Selection) -> String {
    let mut code = template.id.0.clone();
    for attribute in &template.attributes {
        let Some(value) = selection.get(&attribute.name) else { continue };
        let part = abbreviate(&value.canonical());
        if !part.is_empty() {
            code.push('-');
            code.push_str(&part);
        }
    }
    code
}

pub fn variant_item_name(template: &Template, selection: &Selection) -> String {
    let values = template
        .attributes
        .iter()
        .filter_map(|attribute| selection.get(&attribute.name))
        .map(|value| value.canonical())
        .collect::<Vec<_>>();
    if values.is_empty() {
        return template.item_name.clone();
    }
    format!("{} ({})", template.item_name, values.join(", "))
}

fn abbreviate(value: &str) -> String {
    value
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_uppercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{variant_item_code, Variant};
    use crate::domain::selection::Selection;
    use crate::domain::template::{Attribute, Template, TemplateId};

    fn template() -> Template {
        Template {
            id: TemplateId("LED-SIGN-01".to_owned()),
            item_name: "LED Sign".to_owned(),
            has_variants: true,
            attributes: vec![
                Attribute::discrete("Color", ["Red", "Warm White"]),
                Attribute::numeric("Size"),
            ],
        }
    }

    #[test]
    fn item_code_follows_attribute_order() {
        let selection = Selection::new().with("Size", Decimal::new(240, 1)).with("Color", "Red");
        assert_eq!(variant_item_code(&template(), &selection), "LED-SIGN-01-RED-24");
    }

    #[test]
    fn item_code_collapses_spaces_and_decimal_points() {
        let selection =
            Selection::new().with("Color", "Warm White").with("Size", Decimal::new(125, 1));
        assert_eq!(variant_item_code(&template(), &selection), "LED-SIGN-01-WARM-WHITE-12-5");
    }

    #[test]
    fn variant_name_lists_values() {
        let selection = Selection::new().with("Color", "Red").with("Size", Decimal::from(24));
        let variant = Variant::new(&template(), selection);
        assert_eq!(variant.item_name, "LED Sign (Red, 24)");
        assert_eq!(variant.template.0, "LED-SIGN-01");
    }
}
