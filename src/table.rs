use crate::domain::{DeviceUser, ListView, Record, Resource};
use crate::forms::{fields_for, value_text};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub key: String,
    pub label: String,
}

const TRANSACTION_COLUMNS: &[(&str, &str)] = &[
    ("UserID", "Utilizador"),
    ("IsInvalid", "Inválida"),
    ("State", "Estado"),
    ("VerifyStyle", "Verificação"),
    ("Time", "Hora"),
];

pub const DEVICE_USER_COLUMNS: &[&str] = &[
    "Matrícula",
    "Nome",
    "Cartão",
    "Impressão digital",
    "Rosto",
];

/// Every column a view can show, in catalogue order.
pub fn catalogue(view: ListView) -> Vec<Column> {
    if view == ListView::Transactions {
        return TRANSACTION_COLUMNS
            .iter()
            .map(|(key, label)| Column {
                key: key.to_string(),
                label: label.to_string(),
            })
            .collect();
    }
    view.resource()
        .map(|resource| {
            fields_for(resource)
                .iter()
                .map(|field| Column {
                    key: field.key.to_string(),
                    label: field.label.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn default_column_keys(view: ListView) -> &'static [&'static str] {
    match view {
        ListView::Employees | ListView::Visitors | ListView::ExternalEmployees => {
            &["enrollNumber", "name", "shortName"]
        }
        ListView::Departments => &["code", "name", "description"],
        ListView::Groups => &["name", "description"],
        ListView::Zones => &["name", "acronym", "type"],
        ListView::ExternalEntities => &["name", "nif"],
        ListView::Terminals => &["deviceNumber", "deviceName", "ipAddress"],
        ListView::Transactions => &["UserID", "State", "VerifyStyle", "Time"],
        ListView::Dashboard => &[],
    }
}

/// Keys currently shown for `view`: the configured override, or the defaults.
pub fn selected_keys(view: ListView, overrides: &BTreeMap<String, Vec<String>>) -> Vec<String> {
    match overrides.get(view.key()) {
        Some(keys) if !keys.is_empty() => keys.clone(),
        _ => default_column_keys(view)
            .iter()
            .map(|key| key.to_string())
            .collect(),
    }
}

/// Columns to draw, in catalogue order. Unknown configured keys are shown
/// with the key as label.
pub fn visible_columns(view: ListView, overrides: &BTreeMap<String, Vec<String>>) -> Vec<Column> {
    let keys = selected_keys(view, overrides);
    let catalogue = catalogue(view);
    let mut columns: Vec<Column> = catalogue
        .iter()
        .filter(|column| keys.contains(&column.key))
        .cloned()
        .collect();
    columns.extend(
        keys.iter()
            .filter(|key| !catalogue.iter().any(|column| &column.key == *key))
            .map(|key| Column {
                key: key.clone(),
                label: key.clone(),
            }),
    );
    columns
}

/// Adds or removes `key` from the view's selection. The last column cannot be
/// removed.
pub fn toggle_column(view: ListView, overrides: &mut BTreeMap<String, Vec<String>>, key: &str) -> bool {
    let mut keys = selected_keys(view, overrides);
    if let Some(pos) = keys.iter().position(|k| k == key) {
        if keys.len() == 1 {
            return false;
        }
        keys.remove(pos);
    } else {
        keys.push(key.to_string());
    }
    overrides.insert(view.key().to_string(), keys);
    true
}

pub fn reset_columns(view: ListView, overrides: &mut BTreeMap<String, Vec<String>>) {
    overrides.remove(view.key());
}

pub fn select_all_columns(view: ListView, overrides: &mut BTreeMap<String, Vec<String>>) {
    let keys = catalogue(view).into_iter().map(|column| column.key).collect();
    overrides.insert(view.key().to_string(), keys);
}

pub fn cell_text(record: &Record, key: &str) -> String {
    value_text(record.get(key))
}

fn record_contains(record: &Record, needle: &str) -> bool {
    record
        .values()
        .any(|value| value_text(Some(value)).to_lowercase().contains(needle))
}

/// Free-text filter over every field value, case-insensitive.
pub fn filter_records<'a, I>(records: I, text: &str) -> Vec<&'a Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    let needle = text.trim().to_lowercase();
    records
        .into_iter()
        .filter(|record| needle.is_empty() || record_contains(record, &needle))
        .collect()
}

/// Whether an employee record carries `employee_type`; `None` accepts all.
pub fn employee_type_matches(record: &Record, employee_type: Option<&str>) -> bool {
    match employee_type {
        None => true,
        Some(wanted) => record.get("type").and_then(Value::as_str) == Some(wanted),
    }
}

/// Employee rows: restricted to the tree selection when it is non-empty, then
/// filtered by text.
pub fn filter_employees<'a, I>(records: I, selected: &[String], text: &str) -> Vec<&'a Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    let selected: HashSet<&str> = selected.iter().map(String::as_str).collect();
    filter_records(records, text)
        .into_iter()
        .filter(|record| {
            selected.is_empty()
                || Resource::Employees
                    .record_id(record)
                    .is_some_and(|id| selected.contains(id.as_str()))
        })
        .collect()
}

pub fn device_user_cells(user: &DeviceUser) -> [String; 5] {
    let flag = |on: bool| (if on { "✓" } else { "-" }).to_string();
    [
        user.enroll_number.clone().unwrap_or_default(),
        user.employee_name.clone().unwrap_or_default(),
        user.card_number.clone().unwrap_or_default(),
        flag(user.fingerprint),
        flag(user.face),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn records(value: Value) -> Vec<Record> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(record) => Some(record),
                    _ => None,
                })
                .collect(),
            other => panic!("not an array: {other}"),
        }
    }

    fn ids(rows: &[&Record]) -> Vec<String> {
        rows.iter()
            .filter_map(|r| Resource::Employees.record_id(r))
            .collect()
    }

    fn staff() -> Vec<Record> {
        records(json!([
            { "employeeID": "E1", "name": "Alice", "shortName": "Ali", "enrollNumber": 7 },
            { "employeeID": "E2", "name": "Bob", "shortName": "Bob", "enrollNumber": 8 },
            { "employeeID": 3, "name": "Carol", "email": "carol@nclock.pt", "enrollNumber": 9 }
        ]))
    }

    #[test]
    fn empty_selection_shows_all_employees() {
        let all = staff();
        assert_eq!(ids(&filter_employees(&all, &[], "")), vec!["E1", "E2", "3"]);
    }

    #[test]
    fn tree_selection_restricts_then_text_filters() {
        let all = staff();
        let selected = vec!["E1".to_string(), "3".to_string()];
        assert_eq!(ids(&filter_employees(&all, &selected, "")), vec!["E1", "3"]);
        assert_eq!(ids(&filter_employees(&all, &selected, "NCLOCK.PT")), vec!["3"]);
        assert!(filter_employees(&all, &selected, "bob").is_empty());
    }

    #[test]
    fn employee_type_narrows_before_selection() {
        let all = records(json!([
            { "employeeID": "E1", "name": "Alice", "type": "Funcionário" },
            { "employeeID": "V1", "name": "Vera", "type": "Visitante" },
            { "employeeID": "V2", "name": "Vasco", "type": "Visitante" },
            { "employeeID": "X1", "name": "Xavier" }
        ]));
        let visitors = || {
            all.iter()
                .filter(|record| employee_type_matches(record, Some("Visitante")))
        };
        assert_eq!(ids(&filter_employees(visitors(), &[], "")), vec!["V1", "V2"]);

        let selected = vec!["E1".to_string(), "V2".to_string()];
        assert_eq!(ids(&filter_employees(visitors(), &selected, "")), vec!["V2"]);
        assert_eq!(
            ids(&filter_employees(all.iter(), &selected, "")),
            vec!["E1", "V2"]
        );
        assert!(employee_type_matches(&all[3], None));
        assert!(!employee_type_matches(&all[3], Some("Visitante")));
    }

    #[test]
    fn text_filter_matches_numbers() {
        let all = staff();
        assert_eq!(ids(&filter_records(&all, "8")), vec!["E2"]);
    }

    #[test]
    fn defaults_and_overrides() {
        let mut overrides = BTreeMap::new();
        let keys: Vec<String> = visible_columns(ListView::Terminals, &overrides)
            .into_iter()
            .map(|c| c.key)
            .collect();
        assert_eq!(keys, vec!["deviceNumber", "deviceName", "ipAddress"]);

        assert!(toggle_column(ListView::Terminals, &mut overrides, "port"));
        assert!(toggle_column(ListView::Terminals, &mut overrides, "deviceNumber"));
        let keys: Vec<String> = visible_columns(ListView::Terminals, &overrides)
            .into_iter()
            .map(|c| c.key)
            .collect();
        assert_eq!(keys, vec!["deviceName", "ipAddress", "port"]);

        reset_columns(ListView::Terminals, &mut overrides);
        assert!(overrides.is_empty());
    }

    #[test]
    fn last_column_cannot_be_removed() {
        let mut overrides = BTreeMap::new();
        overrides.insert("groups".to_string(), vec!["name".to_string()]);
        assert!(!toggle_column(ListView::Groups, &mut overrides, "name"));
        select_all_columns(ListView::Groups, &mut overrides);
        assert_eq!(selected_keys(ListView::Groups, &overrides).len(), 3);
    }

    #[test]
    fn cells_render_scalars() {
        let row = &staff()[0];
        assert_eq!(cell_text(row, "enrollNumber"), "7");
        assert_eq!(cell_text(row, "missing"), "");
    }
}
