//! Record normalization: drops vacuous top-level fields.
//!
//! A value is vacuous when it is `null`, `""`, `[]` or `{}`. Only the top
//! level of each record is inspected; nested structures are kept verbatim even
//! when everything inside them is vacuous, because existing batch consumers
//! rely on that shape.

use serde_json::Value;
use tracing::info;

use crate::Record;

/// Returns true if the value is one of the vacuous values stripped from records.
pub fn is_vacuous(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Removes vacuous fields from a record.
///
/// Returns `None` when no field survives. Surviving keys keep their order.
pub fn clean(record: Record) -> Option<Record> {
    let cleaned: Record = record
        .into_iter()
        .filter(|(_, value)| !is_vacuous(value))
        .collect();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Cleans every record, dropping the ones that end up empty.
pub fn clean_all(records: Vec<Record>) -> Vec<Record> {
    let fetched = records.len();
    let cleaned: Vec<Record> = records.into_iter().filter_map(clean).collect();

    info!(
        "[CLEAN] {} valid records ({} dropped as empty)",
        cleaned.len(),
        fetched - cleaned.len()
    );

    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    #[test]
    fn strips_exactly_the_vacuous_values() {
        let input = record(json!({
            "Null": null,
            "Empty": "",
            "EmptyList": [],
            "EmptyMap": {},
            "False": false,
            "Zero": 0,
            "ZeroFloat": 0.0,
            "Space": " ",
            "Text": "Resolved"
        }));

        let cleaned = clean(input).expect("record should survive");

        let keys: Vec<&str> = cleaned.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["False", "Zero", "ZeroFloat", "Space", "Text"]);
        assert_eq!(cleaned["False"], json!(false));
        assert_eq!(cleaned["Zero"], json!(0));
    }

    #[test]
    fn nested_structures_are_not_pruned() {
        let input = record(json!({
            "Owner": { "Name": null, "Team": "" },
            "Tags": [null, ""],
            "Drop": null
        }));

        let cleaned = clean(input).expect("record should survive");

        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned["Owner"], json!({ "Name": null, "Team": "" }));
        assert_eq!(cleaned["Tags"], json!([null, ""]));
    }

    #[test]
    fn fully_vacuous_record_is_dropped() {
        let input = record(json!({ "A": null, "B": "", "C": [], "D": {} }));
        assert!(clean(input).is_none());
        assert!(clean(Record::new()).is_none());
    }

    #[test]
    fn surviving_key_order_is_preserved() {
        let input = record(json!({ "Zeta": 1, "Alpha": null, "Mid": "x", "Beta": true }));

        let cleaned = clean(input).unwrap();

        let keys: Vec<&str> = cleaned.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Zeta", "Mid", "Beta"]);
    }

    #[test]
    fn cleaning_is_idempotent() {
        let input = record(json!({
            "IncidentNumber": 10423,
            "Subject": "VPN drops",
            "Notes": "",
            "Closed": false,
            "Links": [],
            "Meta": { "x": null }
        }));

        let once = clean(input).unwrap();
        let twice = clean(once.clone()).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn clean_all_preserves_record_order_and_drops_empties() {
        let records = vec![
            record(json!({ "Id": 1 })),
            record(json!({ "Id": null })),
            record(json!({ "Id": 3, "Note": "" })),
            record(json!({})),
            record(json!({ "Id": 5 })),
        ];

        let cleaned = clean_all(records);

        let ids: Vec<&Value> = cleaned.iter().map(|r| &r["Id"]).collect();
        assert_eq!(ids, vec![&json!(1), &json!(3), &json!(5)]);
        assert!(!cleaned[1].contains_key("Note"));
    }

    #[test]
    fn is_vacuous_matches_definition() {
        assert!(is_vacuous(&json!(null)));
        assert!(is_vacuous(&json!("")));
        assert!(is_vacuous(&json!([])));
        assert!(is_vacuous(&json!({})));
        assert!(!is_vacuous(&json!(false)));
        assert!(!is_vacuous(&json!(0)));
        assert!(!is_vacuous(&json!("0")));
        assert!(!is_vacuous(&json!([[]])));
    }
}
