//! Maps raw API payloads to flat listing records.
//!
//! Each mapper validates its record kind's schema at the boundary: required
//! fields must be present with the right JSON type or the record is
//! rejected with a [`SchemaError`]. Optional fields never fail a record;
//! absent text becomes [`NO_DATA`] and absent flags become `false`.

use std::collections::BTreeSet;

use meli_etl_listing_models::{
    CurrencyConversionRecord, ItemRecord, NO_DATA, NO_WARRANTY, SellerRecord,
};
use serde_json::Value;

use crate::paging::id_value;

/// Sale term id carrying the warranty type.
const WARRANTY_TYPE_TERM: &str = "WARRANTY_TYPE";

/// Sale term id carrying the warranty duration.
const WARRANTY_TIME_TERM: &str = "WARRANTY_TIME";

/// Identifier used in errors when a record has no usable `id`.
const UNKNOWN_RECORD: &str = "<unknown>";

/// A raw record that does not match its kind's schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The payload is not a JSON object.
    #[error("record is not a JSON object")]
    NotAnObject,

    /// A required field is absent or `null`.
    #[error("record {record_id}: missing required field `{field}`")]
    Missing {
        /// Field name.
        field: &'static str,
        /// Identifier of the offending record.
        record_id: String,
    },

    /// A required field has the wrong JSON type.
    #[error("record {record_id}: field `{field}` is not {expected}")]
    WrongType {
        /// Field name.
        field: &'static str,
        /// Expected JSON type.
        expected: &'static str,
        /// Identifier of the offending record.
        record_id: String,
    },
}

/// Records that mapped cleanly plus the count of rejected ones.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedBatch<T> {
    /// Successfully mapped records, in input order.
    pub records: Vec<T>,
    /// Number of raw records rejected with a [`SchemaError`].
    pub skipped: u64,
}

/// Best-effort identifier for log lines and errors.
fn record_id(record: &Value) -> String {
    record
        .get("id")
        .and_then(id_value)
        .unwrap_or_else(|| UNKNOWN_RECORD.to_string())
}

/// Returns the field value, treating JSON `null` as absent.
fn field<'a>(record: &'a Value, name: &str) -> Option<&'a Value> {
    record.get(name).filter(|v| !v.is_null())
}

fn require_str(record: &Value, name: &'static str) -> Result<String, SchemaError> {
    match field(record, name) {
        None => Err(SchemaError::Missing {
            field: name,
            record_id: record_id(record),
        }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(SchemaError::WrongType {
            field: name,
            expected: "a string",
            record_id: record_id(record),
        }),
    }
}

fn require_f64(record: &Value, name: &'static str) -> Result<f64, SchemaError> {
    match field(record, name) {
        None => Err(SchemaError::Missing {
            field: name,
            record_id: record_id(record),
        }),
        Some(value) => value.as_f64().ok_or_else(|| SchemaError::WrongType {
            field: name,
            expected: "a number",
            record_id: record_id(record),
        }),
    }
}

/// Reads an identifier that upstream sends either as a string or an integer.
fn require_id(record: &Value, name: &'static str) -> Result<String, SchemaError> {
    match field(record, name) {
        None => Err(SchemaError::Missing {
            field: name,
            record_id: record_id(record),
        }),
        Some(value) => id_value(value).ok_or_else(|| SchemaError::WrongType {
            field: name,
            expected: "a string or integer id",
            record_id: record_id(record),
        }),
    }
}

/// Reads an optional text field, falling back to [`NO_DATA`].
fn text_or_no_data(record: Option<&Value>, name: &str) -> String {
    record
        .and_then(|r| field(r, name))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map_or_else(|| NO_DATA.to_string(), String::from)
}

fn flag(record: Option<&Value>, name: &str) -> bool {
    record
        .and_then(|r| field(r, name))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Finds the `value_name` of the sale term with the given id.
fn sale_term<'a>(record: &'a Value, term_id: &str) -> Option<&'a str> {
    field(record, "sale_terms")?
        .as_array()?
        .iter()
        .find(|term| term.get("id").and_then(Value::as_str) == Some(term_id))?
        .get("value_name")?
        .as_str()
        .filter(|s| !s.is_empty())
}

/// Maps an item detail payload to an [`ItemRecord`].
///
/// Required: `title`, `price`, `seller_id`. Everything else, the listing
/// `id` included, falls back to a placeholder.
///
/// # Errors
///
/// Returns [`SchemaError`] if a required field is absent or mistyped.
pub fn map_item(raw: &Value) -> Result<ItemRecord, SchemaError> {
    if !raw.is_object() {
        return Err(SchemaError::NotAnObject);
    }

    let title = require_str(raw, "title")?;
    let price = require_f64(raw, "price")?;
    let seller_id = require_id(raw, "seller_id")?;
    let item_id = field(raw, "id")
        .and_then(id_value)
        .unwrap_or_else(|| NO_DATA.to_string());

    let warranty_type = sale_term(raw, WARRANTY_TYPE_TERM)
        .or_else(|| {
            field(raw, "warranty")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })
        .unwrap_or(NO_WARRANTY)
        .to_string();
    let warranty_time = sale_term(raw, WARRANTY_TIME_TERM)
        .unwrap_or(NO_DATA)
        .to_string();

    let shipping = field(raw, "shipping");

    Ok(ItemRecord {
        item_id,
        site_id: text_or_no_data(Some(raw), "site_id"),
        title,
        price,
        currency_id: text_or_no_data(Some(raw), "currency_id"),
        seller_id,
        category_id: text_or_no_data(Some(raw), "category_id"),
        warranty_type,
        warranty_time,
        free_shipping: flag(shipping, "free_shipping"),
        local_pick_up: flag(shipping, "local_pick_up"),
        logistic_type: text_or_no_data(shipping, "logistic_type"),
        shipping_mode: text_or_no_data(shipping, "mode"),
    })
}

/// Maps a user payload to a [`SellerRecord`].
///
/// `qty_sales` is read from `seller_reputation.transactions.completed` and
/// defaults to 0 when the reputation block is absent.
///
/// # Errors
///
/// Returns [`SchemaError`] if `id` is absent or the completed-sales count is
/// present but not an integer.
pub fn map_seller(raw: &Value) -> Result<SellerRecord, SchemaError> {
    if !raw.is_object() {
        return Err(SchemaError::NotAnObject);
    }

    let seller_id = require_id(raw, "id")?;

    let completed = field(raw, "seller_reputation")
        .and_then(|r| field(r, "transactions"))
        .and_then(|t| field(t, "completed"));

    let qty_sales = match completed {
        None => 0,
        Some(value) => value.as_i64().ok_or_else(|| SchemaError::WrongType {
            field: "seller_reputation.transactions.completed",
            expected: "an integer",
            record_id: seller_id.clone(),
        })?,
    };

    Ok(SellerRecord {
        seller_id,
        qty_sales,
    })
}

/// Maps a currency conversion payload to a [`CurrencyConversionRecord`].
///
/// # Errors
///
/// Returns [`SchemaError`] if `currency_base`, `currency_quote` or `rate` is
/// absent or mistyped.
pub fn map_currency(raw: &Value) -> Result<CurrencyConversionRecord, SchemaError> {
    if !raw.is_object() {
        return Err(SchemaError::NotAnObject);
    }

    Ok(CurrencyConversionRecord {
        currency_base: require_str(raw, "currency_base")?,
        currency_quote: require_str(raw, "currency_quote")?,
        rate: require_f64(raw, "rate")?,
    })
}

/// Maps every raw record with `mapper`, skipping the ones that fail.
///
/// Each rejected record is logged with its identifier under `label`.
pub fn map_batch<T, F>(label: &str, raws: &[Value], mapper: F) -> MappedBatch<T>
where
    F: Fn(&Value) -> Result<T, SchemaError>,
{
    let mut records = Vec::with_capacity(raws.len());
    let mut skipped = 0u64;

    for raw in raws {
        match mapper(raw) {
            Ok(record) => records.push(record),
            Err(e) => {
                log::warn!("[{label}] skipping record {}: {e}", record_id(raw));
                skipped += 1;
            }
        }
    }

    MappedBatch { records, skipped }
}

/// Drops repeated sellers, keeping the first occurrence of each id.
#[must_use]
pub fn dedup_sellers(sellers: Vec<SellerRecord>) -> Vec<SellerRecord> {
    let mut seen = BTreeSet::new();
    sellers
        .into_iter()
        .filter(|s| seen.insert(s.seller_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_item() -> Value {
        json!({
            "id": "MLA900",
            "site_id": "MLA",
            "title": "Google Chromecast 4K",
            "price": 54999.5,
            "currency_id": "ARS",
            "seller_id": 123456,
            "category_id": "MLA352001",
            "sale_terms": [
                {"id": "WARRANTY_TYPE", "value_name": "Garantía de fábrica"},
                {"id": "WARRANTY_TIME", "value_name": "6 meses"}
            ],
            "shipping": {
                "free_shipping": true,
                "local_pick_up": false,
                "logistic_type": "fulfillment",
                "mode": "me2"
            }
        })
    }

    #[test]
    fn maps_complete_item() {
        let item = map_item(&full_item()).unwrap();
        assert_eq!(item.item_id, "MLA900");
        assert_eq!(item.seller_id, "123456");
        assert!((item.price - 54999.5).abs() < f64::EPSILON);
        assert_eq!(item.category_id, "MLA352001");
        assert_eq!(item.warranty_type, "Garantía de fábrica");
        assert_eq!(item.warranty_time, "6 meses");
        assert!(item.free_shipping);
        assert!(!item.local_pick_up);
        assert_eq!(item.logistic_type, "fulfillment");
        assert_eq!(item.shipping_mode, "me2");
    }

    #[test]
    fn missing_optionals_become_placeholders() {
        let raw = json!({
            "id": "MLA901",
            "site_id": "MLA",
            "title": "Chromecast",
            "price": 100,
            "currency_id": "ARS",
            "seller_id": "77",
            "shipping": {"logistic_type": null}
        });
        let item = map_item(&raw).unwrap();
        assert_eq!(item.category_id, NO_DATA);
        assert_eq!(item.warranty_type, NO_WARRANTY);
        assert_eq!(item.warranty_time, NO_DATA);
        assert_eq!(item.logistic_type, NO_DATA);
        assert_eq!(item.shipping_mode, NO_DATA);
        assert!(!item.free_shipping);
        assert!(!item.local_pick_up);
    }

    #[test]
    fn item_with_only_required_fields_gets_placeholders() {
        let raw = json!({"title": "Chromecast", "price": 10.0, "seller_id": 5});
        let item = map_item(&raw).unwrap();
        assert_eq!(item.item_id, NO_DATA);
        assert_eq!(item.site_id, NO_DATA);
        assert_eq!(item.currency_id, NO_DATA);
        assert_eq!(item.seller_id, "5");
        assert_eq!(item.title, "Chromecast");

        let raw = json!({
            "id": "MLA1",
            "title": "Chromecast",
            "price": 10.0,
            "currency_id": "ARS",
            "seller_id": 5
        });
        let item = map_item(&raw).unwrap();
        assert_eq!(item.item_id, "MLA1");
        assert_eq!(item.site_id, NO_DATA);
        assert_eq!(item.currency_id, "ARS");
    }

    #[test]
    fn legacy_warranty_string_is_used_as_type() {
        let mut raw = full_item();
        raw["sale_terms"] = json!([]);
        raw["warranty"] = json!("Garantía del vendedor: 3 meses");
        let item = map_item(&raw).unwrap();
        assert_eq!(item.warranty_type, "Garantía del vendedor: 3 meses");
        assert_eq!(item.warranty_time, NO_DATA);
    }

    #[test]
    fn missing_title_is_a_schema_error() {
        let mut raw = full_item();
        raw.as_object_mut().unwrap().remove("title");
        assert_eq!(
            map_item(&raw),
            Err(SchemaError::Missing {
                field: "title",
                record_id: "MLA900".to_string(),
            })
        );
    }

    #[test]
    fn mistyped_price_is_a_schema_error() {
        let mut raw = full_item();
        raw["price"] = json!("cheap");
        assert!(matches!(
            map_item(&raw),
            Err(SchemaError::WrongType { field: "price", .. })
        ));
    }

    #[test]
    fn null_seller_counts_as_missing() {
        let mut raw = full_item();
        raw["seller_id"] = Value::Null;
        assert!(matches!(
            map_item(&raw),
            Err(SchemaError::Missing {
                field: "seller_id",
                ..
            })
        ));
    }

    #[test]
    fn non_object_is_rejected() {
        assert_eq!(map_item(&json!([1, 2])), Err(SchemaError::NotAnObject));
    }

    #[test]
    fn maps_seller_reputation() {
        let raw = json!({
            "id": 123456,
            "nickname": "TIENDA",
            "seller_reputation": {"transactions": {"completed": 5120, "total": 5300}}
        });
        assert_eq!(
            map_seller(&raw).unwrap(),
            SellerRecord {
                seller_id: "123456".to_string(),
                qty_sales: 5120,
            }
        );
    }

    #[test]
    fn seller_without_reputation_has_zero_sales() {
        let seller = map_seller(&json!({"id": "9"})).unwrap();
        assert_eq!(seller.qty_sales, 0);
    }

    #[test]
    fn seller_with_bad_sales_count_is_rejected() {
        let raw = json!({
            "id": 9,
            "seller_reputation": {"transactions": {"completed": "lots"}}
        });
        assert!(matches!(
            map_seller(&raw),
            Err(SchemaError::WrongType { .. })
        ));
    }

    #[test]
    fn maps_currency_rate() {
        let raw = json!({
            "currency_base": "ARS",
            "currency_quote": "USD",
            "rate": 0.0012,
            "inv_rate": 833.33
        });
        let record = map_currency(&raw).unwrap();
        assert_eq!(record.currency_base, "ARS");
        assert_eq!(record.currency_quote, "USD");
        assert!((record.rate - 0.0012).abs() < f64::EPSILON);
    }

    #[test]
    fn currency_without_rate_is_rejected() {
        let raw = json!({"currency_base": "ARS", "currency_quote": "USD"});
        assert!(matches!(
            map_currency(&raw),
            Err(SchemaError::Missing { field: "rate", .. })
        ));
    }

    #[test]
    fn batch_skips_bad_records_only() {
        let mut broken = full_item();
        broken.as_object_mut().unwrap().remove("title");
        broken["id"] = json!("MLA-BROKEN");
        let raws = vec![full_item(), broken, full_item()];

        let batch = map_batch("items", &raws, map_item);

        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.skipped, 1);
        assert!(batch.records.iter().all(|r| r.item_id == "MLA900"));
    }

    #[test]
    fn dedups_sellers_keeping_first() {
        let sellers = vec![
            SellerRecord {
                seller_id: "1".to_string(),
                qty_sales: 10,
            },
            SellerRecord {
                seller_id: "2".to_string(),
                qty_sales: 20,
            },
            SellerRecord {
                seller_id: "1".to_string(),
                qty_sales: 99,
            },
        ];
        let deduped = dedup_sellers(sellers);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].qty_sales, 10);
    }
}
