//! Shapes exchanged with the host application and their conversion to domain types.
//!
//! Every method call answers `{"message": …}`; a method returning nothing answers `{}`.
//! Numeric fields arrive as JSON numbers, but older hosts send them as strings, so both are read.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use signcfg_core::domain::measurement::{MeasurementSource, PerimeterMeasurement};
use signcfg_core::domain::price::{PriceEntry, PriceEntryId, PriceList, PriceResponse};
use signcfg_core::domain::quotation::{LineItem, Quotation, QuotationId};
use signcfg_core::domain::template::{Attribute, Template, TemplateId};
use signcfg_core::domain::variant::ItemCode;

use crate::error::HostError;

const MODIFIED_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Extracts the `message` member of a method response; absent means the method returned nothing.
pub fn message(body: Value) -> Result<Value, HostError> {
    match body {
        Value::Object(mut payload) => Ok(payload.remove("message").unwrap_or(Value::Null)),
        other => Err(HostError::shape(format!("expected a response object, got {}", kind(&other)))),
    }
}

pub fn decimal(value: &Value, field: &str) -> Result<Option<Decimal>, HostError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => {
            let text = number.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .map(Some)
                .map_err(|_| HostError::shape(format!("`{field}` is not a decimal: {text}")))
        }
        Value::String(text) if text.trim().is_empty() => Ok(None),
        Value::String(text) => Decimal::from_str(text.trim())
            .map(Some)
            .map_err(|_| HostError::shape(format!("`{field}` is not a decimal: {text}"))),
        other => Err(HostError::shape(format!("`{field}` is a {}, not a number", kind(other)))),
    }
}

/// Check fields travel as `0`/`1`; booleans and `"1"` are accepted too.
pub fn flag(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|number| number != 0.0),
        Value::String(text) => matches!(text.trim(), "1" | "true" | "True"),
        _ => false,
    }
}

pub fn number(value: Decimal) -> Value {
    value.to_f64().map_or(Value::Null, Value::from)
}

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    decimal(&value, "number").map_err(serde::de::Error::custom)
}

fn from_value<T: for<'de> Deserialize<'de>>(value: Value, what: &str) -> Result<T, HostError> {
    serde_json::from_value(value).map_err(|error| HostError::shape(format!("malformed {what}: {error}")))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim).filter(|text| !text.is_empty()).map(str::to_owned)
}

#[derive(Debug, Deserialize)]
pub struct TemplateDoc {
    pub name: String,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub has_variants: Value,
    #[serde(default)]
    pub attributes: Vec<TemplateAttributeRow>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateAttributeRow {
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub numeric_values: Value,
}

impl TemplateDoc {
    pub fn parse(doc: Value) -> Result<Self, HostError> {
        from_value(doc, "item document")
    }

    /// Attribute names in display order; rows without a name are skipped.
    pub fn attribute_rows(&self) -> impl Iterator<Item = (&str, bool)> {
        self.attributes.iter().filter_map(|row| {
            let name = row.attribute.as_deref().map(str::trim).filter(|name| !name.is_empty())?;
            Some((name, flag(&row.numeric_values)))
        })
    }

    pub fn into_template(self, attributes: Vec<Attribute>) -> Template {
        let item_name = non_blank(self.item_name.as_deref()).unwrap_or_else(|| self.name.clone());
        Template {
            id: TemplateId(self.name),
            item_name,
            has_variants: flag(&self.has_variants),
            attributes,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AttributeDoc {
    #[serde(default)]
    numeric_values: Value,
    #[serde(default)]
    item_attribute_values: Vec<AttributeValueRow>,
}

#[derive(Debug, Deserialize)]
struct AttributeValueRow {
    #[serde(default)]
    attribute_value: Option<String>,
}

/// Builds an attribute from its `Item Attribute` document.
pub fn attribute_from_doc(name: &str, doc: Value) -> Result<Attribute, HostError> {
    let doc: AttributeDoc = from_value(doc, "item attribute document")?;
    if flag(&doc.numeric_values) {
        return Ok(Attribute::numeric(name));
    }
    let values = doc
        .item_attribute_values
        .iter()
        .filter_map(|row| non_blank(row.attribute_value.as_deref()))
        .collect::<Vec<_>>();
    Ok(Attribute::discrete(name, values))
}

#[derive(Debug, Deserialize)]
struct PriceDoc {
    #[serde(default, deserialize_with = "lenient_decimal")]
    price: Option<Decimal>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    breakdown: Vec<String>,
}

pub fn price_response(message: Value) -> Result<PriceResponse, HostError> {
    if message.is_null() {
        return Ok(PriceResponse { price: None, currency: None, breakdown: Vec::new() });
    }
    if !message.is_object() {
        return Err(HostError::shape(format!("expected a price object, got {}", kind(&message))));
    }
    let doc: PriceDoc = from_value(message, "price response")?;
    Ok(PriceResponse {
        price: doc.price,
        currency: non_blank(doc.currency.as_deref()),
        breakdown: doc.breakdown,
    })
}

/// Lookup answer: an item code or nothing.
pub fn found_item_code(message: &Value) -> Result<Option<ItemCode>, HostError> {
    match message {
        Value::Null => Ok(None),
        Value::String(code) => Ok(non_blank(Some(code)).map(ItemCode)),
        other => Err(HostError::shape(format!("expected an item code, got {}", kind(other)))),
    }
}

/// Creation answer: a bare code, or a document carrying `name` or `item_code`.
pub fn created_item_code(message: &Value) -> Option<ItemCode> {
    match message {
        Value::String(code) => non_blank(Some(code)).map(ItemCode),
        Value::Object(doc) => ["name", "item_code"]
            .iter()
            .find_map(|key| non_blank(doc.get(*key).and_then(Value::as_str)))
            .map(ItemCode),
        _ => None,
    }
}

/// True for an unsaved document returned by a builder method.
pub fn is_unsaved_doc(message: &Value) -> bool {
    message.get("doctype").and_then(Value::as_str).is_some()
        && non_blank(message.get("name").and_then(Value::as_str)).is_none()
}

#[derive(Debug, Deserialize)]
struct ItemPriceRow {
    name: String,
    #[serde(default, deserialize_with = "lenient_decimal")]
    price_list_rate: Option<Decimal>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    uom: Option<String>,
    #[serde(default)]
    selling: Value,
}

pub const PRICE_FIELDS: [&str; 5] = ["name", "price_list_rate", "currency", "uom", "selling"];

pub fn first_price_entry(
    message: Value,
    item_code: &ItemCode,
    price_list: &PriceList,
) -> Result<Option<PriceEntry>, HostError> {
    let rows = match message {
        Value::Null => return Ok(None),
        Value::Array(rows) => rows,
        other => {
            return Err(HostError::shape(format!("expected a list of prices, got {}", kind(&other))))
        }
    };
    let Some(row) = rows.into_iter().next() else { return Ok(None) };
    let row: ItemPriceRow = from_value(row, "item price row")?;

    Ok(Some(PriceEntry {
        id: PriceEntryId(row.name),
        item_code: item_code.clone(),
        price_list: price_list.clone(),
        rate: row.price_list_rate.unwrap_or(Decimal::ZERO),
        currency: row.currency.unwrap_or_default(),
        uom: row.uom.unwrap_or_default(),
        selling: flag(&row.selling),
    }))
}

pub fn parse_modified(raw: &str) -> Result<DateTime<Utc>, HostError> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| HostError::shape(format!("unreadable `modified` timestamp `{raw}`")))
}

pub fn format_modified(modified: DateTime<Utc>) -> String {
    modified.format(MODIFIED_FORMAT).to_string()
}

pub fn modified_of(doc: &Value) -> Result<DateTime<Utc>, HostError> {
    let raw = doc
        .get("modified")
        .and_then(Value::as_str)
        .ok_or_else(|| HostError::shape("document has no `modified` timestamp"))?;
    parse_modified(raw)
}

#[derive(Debug, Deserialize)]
struct QuotationDoc {
    name: String,
    #[serde(default)]
    party_name: Option<String>,
    #[serde(default)]
    selling_price_list: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    items: Vec<QuotationItemRow>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    total_qty: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    grand_total: Option<Decimal>,
    modified: String,
}

#[derive(Debug, Deserialize)]
struct QuotationItemRow {
    #[serde(default)]
    idx: Option<u32>,
    #[serde(default)]
    item_code: Option<String>,
    #[serde(default)]
    item_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    qty: Option<Decimal>,
    #[serde(default)]
    uom: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    rate: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    amount: Option<Decimal>,
}

pub fn quotation_from_doc(doc: Value) -> Result<Quotation, HostError> {
    let doc: QuotationDoc = from_value(doc, "quotation document")?;
    let items = doc
        .items
        .into_iter()
        .enumerate()
        .map(|(position, row)| LineItem {
            idx: row.idx.unwrap_or_else(|| u32::try_from(position + 1).unwrap_or(u32::MAX)),
            item_code: non_blank(row.item_code.as_deref()).map(ItemCode),
            item_name: row.item_name,
            description: row.description,
            qty: row.qty.unwrap_or(Decimal::ZERO),
            uom: row.uom,
            rate: row.rate.unwrap_or(Decimal::ZERO),
            amount: row.amount.unwrap_or(Decimal::ZERO),
        })
        .collect();

    Ok(Quotation {
        id: QuotationId(doc.name),
        customer: non_blank(doc.party_name.as_deref()),
        selling_price_list: non_blank(doc.selling_price_list.as_deref()).map(PriceList),
        currency: non_blank(doc.currency.as_deref()),
        items,
        total_qty: doc.total_qty.unwrap_or(Decimal::ZERO),
        grand_total: doc.grand_total.unwrap_or(Decimal::ZERO),
        modified: parse_modified(&doc.modified)?,
    })
}

/// Writes the quotation's lines and totals into the stored document, keeping every other field
/// and each existing row's extra fields.
pub fn quotation_for_save(stored: Value, quotation: &Quotation) -> Result<Value, HostError> {
    let Value::Object(mut doc) = stored else {
        return Err(HostError::shape("stored quotation is not an object"));
    };
    let mut existing = match doc.remove("items") {
        Some(Value::Array(rows)) => rows,
        _ => Vec::new(),
    }
    .into_iter();

    let items = quotation
        .items
        .iter()
        .map(|line| {
            let mut row = match existing.next() {
                Some(Value::Object(row)) => row,
                _ => {
                    let mut row = Map::new();
                    row.insert("doctype".to_owned(), json!("Quotation Item"));
                    row
                }
            };
            row.insert("idx".to_owned(), json!(line.idx));
            row.insert("item_code".to_owned(), json!(line.item_code.as_ref().map(|code| &code.0)));
            row.insert("item_name".to_owned(), json!(line.item_name));
            row.insert("description".to_owned(), json!(line.description));
            row.insert("qty".to_owned(), number(line.qty));
            row.insert("uom".to_owned(), json!(line.uom));
            row.insert("rate".to_owned(), number(line.rate));
            row.insert("amount".to_owned(), number(line.amount));
            Value::Object(row)
        })
        .collect::<Vec<_>>();

    doc.insert("items".to_owned(), Value::Array(items));
    doc.insert("total_qty".to_owned(), number(quotation.total_qty));
    doc.insert("grand_total".to_owned(), number(quotation.grand_total));
    doc.insert("modified".to_owned(), json!(format_modified(quotation.modified)));
    Ok(Value::Object(doc))
}

#[derive(Debug, Deserialize)]
struct PerimeterDoc {
    #[serde(default, deserialize_with = "lenient_decimal")]
    perimeter_inches: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    perimeter_lf: Option<Decimal>,
    #[serde(default)]
    source: Option<MeasurementSource>,
}

pub fn perimeter(message: Value) -> Result<PerimeterMeasurement, HostError> {
    if !message.is_object() {
        return Err(HostError::shape(format!("expected a measurement, got {}", kind(&message))));
    }
    let doc: PerimeterDoc = from_value(message, "perimeter measurement")?;
    let inches = doc
        .perimeter_inches
        .ok_or_else(|| HostError::shape("measurement has no `perimeter_inches`"))?;
    let mut measurement =
        PerimeterMeasurement::from_inches(inches, doc.source.unwrap_or(MeasurementSource::Drawings));
    if let Some(linear_feet) = doc.perimeter_lf {
        measurement.perimeter_lf = linear_feet;
    }
    Ok(measurement)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;
    use signcfg_core::domain::measurement::MeasurementSource;
    use signcfg_core::domain::price::PriceList;
    use signcfg_core::domain::quotation::{NewLine, QuotationId};
    use signcfg_core::domain::template::Attribute;
    use signcfg_core::domain::variant::ItemCode;

    use super::*;

    #[test]
    fn empty_method_response_is_null_message() {
        assert_eq!(message(json!({})).expect("object"), Value::Null);
        assert_eq!(message(json!({"message": "LED-1"})).expect("object"), json!("LED-1"));
        assert!(message(json!(["LED-1"])).is_err());
    }

    #[test]
    fn decimals_accept_numbers_and_strings() {
        assert_eq!(decimal(&json!(180.0), "price").expect("number"), Some(Decimal::from(180)));
        assert_eq!(decimal(&json!("24.50"), "price").expect("text"), Some(Decimal::new(2450, 2)));
        assert_eq!(decimal(&json!(""), "price").expect("blank"), None);
        assert!(decimal(&json!(true), "price").is_err());
    }

    #[test]
    fn template_doc_reads_rows_in_order_and_flags() {
        let doc = TemplateDoc::parse(json!({
            "name": "LED-SIGN-01",
            "item_name": "LED Sign",
            "has_variants": 1,
            "attributes": [
                {"attribute": "Color", "numeric_values": 0},
                {"attribute": "  "},
                {"attribute": "Size", "numeric_values": 1}
            ]
        }))
        .expect("parse");

        let rows = doc.attribute_rows().map(|(name, numeric)| (name.to_owned(), numeric)).collect::<Vec<_>>();
        assert_eq!(rows, vec![("Color".to_owned(), false), ("Size".to_owned(), true)]);

        let template = doc.into_template(vec![Attribute::numeric("Size")]);
        assert!(template.has_variants);
        assert_eq!(template.item_name, "LED Sign");
    }

    #[test]
    fn attribute_doc_lists_permitted_values() {
        let attribute = attribute_from_doc(
            "Color",
            json!({"item_attribute_values": [{"attribute_value": "Red"}, {"attribute_value": "Blue"}]}),
        )
        .expect("parse");
        assert_eq!(attribute, Attribute::discrete("Color", ["Red", "Blue"]));

        let numeric = attribute_from_doc("Size", json!({"numeric_values": 1})).expect("parse");
        assert!(numeric.is_numeric());
    }

    #[test]
    fn price_response_tolerates_missing_price() {
        let priced = price_response(json!({
            "price": 180.0,
            "currency": "USD",
            "breakdown": ["Red acrylic face: +20.00"]
        }))
        .expect("price");
        assert_eq!(priced.price, Some(Decimal::from(180)));
        assert_eq!(priced.breakdown.len(), 1);

        let unpriced = price_response(json!({"currency": "USD"})).expect("no price");
        assert_eq!(unpriced.price, None);
        assert!(price_response(json!("180")).is_err());
    }

    #[test]
    fn item_codes_come_from_strings_or_documents() {
        assert_eq!(found_item_code(&Value::Null).expect("null"), None);
        assert_eq!(
            found_item_code(&json!("LED-SIGN-01-RED-24")).expect("code"),
            Some(ItemCode("LED-SIGN-01-RED-24".to_owned()))
        );
        assert!(found_item_code(&json!(42)).is_err());

        assert_eq!(
            created_item_code(&json!({"doctype": "Item", "item_code": "LED-SIGN-01-RED-24"})),
            Some(ItemCode("LED-SIGN-01-RED-24".to_owned()))
        );
        assert_eq!(created_item_code(&json!({"doctype": "Item"})), None);
        assert!(is_unsaved_doc(&json!({"doctype": "Item", "item_code": "X"})));
        assert!(!is_unsaved_doc(&json!({"doctype": "Item", "name": "X"})));
    }

    #[test]
    fn first_price_row_becomes_entry() {
        let entry = first_price_entry(
            json!([{"name": "IP-0001", "price_list_rate": 150, "currency": "USD", "uom": "Nos", "selling": 1}]),
            &ItemCode("LED-1".to_owned()),
            &PriceList("Standard Selling".to_owned()),
        )
        .expect("parse")
        .expect("entry");
        assert_eq!(entry.rate, Decimal::from(150));
        assert!(entry.selling);

        let none = first_price_entry(
            json!([]),
            &ItemCode("LED-1".to_owned()),
            &PriceList("Standard Selling".to_owned()),
        )
        .expect("parse");
        assert!(none.is_none());
    }

    #[test]
    fn modified_timestamps_round_trip_through_host_format() {
        let parsed = parse_modified("2026-01-01 10:00:00.123456").expect("parse");
        assert_eq!(format_modified(parsed), "2026-01-01 10:00:00.123456");
        assert_eq!(
            parse_modified("2026-01-01T10:00:00Z").expect("rfc3339"),
            Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).single().expect("valid")
        );
        assert!(parse_modified("yesterday").is_err());
    }

    #[test]
    fn quotation_save_keeps_unknown_fields_and_row_extras() {
        let stored = json!({
            "name": "QTN-0001",
            "party_name": "Silicon Signs Demo",
            "selling_price_list": "Standard Selling",
            "currency": "USD",
            "terms": "Net 30",
            "modified": "2026-01-01 10:00:00.000000",
            "items": [{"name": "row-1", "idx": 1, "warehouse": "Stores"}]
        });
        let mut quotation = quotation_from_doc(stored.clone()).expect("parse");
        assert_eq!(quotation.id, QuotationId("QTN-0001".to_owned()));
        assert!(quotation.items[0].is_blank());

        quotation.append_line_item(NewLine {
            item_code: ItemCode("LED-1".to_owned()),
            item_name: None,
            qty: Decimal::ONE,
            uom: "Nos".to_owned(),
            rate: Decimal::from(180),
        })
        .expect("append");
        quotation.append_line_item(NewLine {
            item_code: ItemCode("LED-2".to_owned()),
            item_name: None,
            qty: Decimal::from(2),
            uom: "Nos".to_owned(),
            rate: Decimal::from(10),
        })
        .expect("append");

        let doc = quotation_for_save(stored, &quotation).expect("merge");
        assert_eq!(doc["terms"], json!("Net 30"));
        assert_eq!(doc["items"][0]["warehouse"], json!("Stores"));
        assert_eq!(doc["items"][0]["item_code"], json!("LED-1"));
        assert_eq!(doc["items"][1]["doctype"], json!("Quotation Item"));
        assert_eq!(doc["items"][1]["amount"], json!(20.0));
        assert_eq!(doc["grand_total"], json!(200.0));
        assert_eq!(doc["modified"], json!("2026-01-01 10:00:00.000000"));
    }

    #[test]
    fn perimeter_reads_host_measurement() {
        let measurement = perimeter(json!({
            "perimeter_inches": 96.4,
            "perimeter_lf": 8.033,
            "source": "svg_fallback"
        }))
        .expect("measurement");
        assert_eq!(measurement.perimeter_inches, Decimal::new(964, 1));
        assert_eq!(measurement.perimeter_lf, Decimal::new(8033, 3));
        assert_eq!(measurement.source, MeasurementSource::SvgFallback);

        assert!(perimeter(json!({"source": "drawings"})).is_err());
    }
}
