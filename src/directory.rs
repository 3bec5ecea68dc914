use crate::domain::{Department, Employee, Group, Record, Resource};
use crate::table::employee_type_matches;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Latest known records per resource, as last loaded or locally updated.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    records: BTreeMap<Resource, Vec<Record>>,
}

impl Directory {
    pub fn records(&self, resource: Resource) -> &[Record] {
        self.records
            .get(&resource)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn replace(&mut self, resource: Resource, records: Vec<Record>) {
        self.records.insert(resource, records);
    }

    /// Replaces the record with the same id, or appends when there is none.
    pub fn upsert(&mut self, resource: Resource, record: Record) {
        let list = self.records.entry(resource).or_default();
        let id = resource.record_id(&record);
        let existing = id.as_ref().and_then(|id| {
            list.iter()
                .position(|r| resource.record_id(r).as_ref() == Some(id))
        });
        match existing {
            Some(idx) => list[idx] = record,
            None => list.push(record),
        }
    }

    pub fn remove(&mut self, resource: Resource, id: &str) -> bool {
        let Some(list) = self.records.get_mut(&resource) else {
            return false;
        };
        let before = list.len();
        list.retain(|record| resource.record_id(record).as_deref() != Some(id));
        list.len() != before
    }

    pub fn find(&self, resource: Resource, id: &str) -> Option<&Record> {
        self.records(resource)
            .iter()
            .find(|record| resource.record_id(record).as_deref() == Some(id))
    }

    pub fn name_of(&self, resource: Resource, id: &str) -> Option<String> {
        self.find(resource, id)
            .map(|record| resource.record_name(record))
    }

    pub fn departments(&self) -> Vec<Department> {
        decode_all(Resource::Departments, self.records(Resource::Departments))
    }

    pub fn groups(&self) -> Vec<Group> {
        decode_all(Resource::Groups, self.records(Resource::Groups))
    }

    pub fn employees(&self) -> Vec<Employee> {
        self.employees_of_type(None)
    }

    pub fn employees_of_type(&self, employee_type: Option<&str>) -> Vec<Employee> {
        decode_all(
            Resource::Employees,
            self.records(Resource::Employees)
                .iter()
                .filter(|record| employee_type_matches(record, employee_type)),
        )
    }
}

/// Decodes typed entities, skipping records that do not fit the shape.
fn decode_all<'a, T, I>(resource: Resource, records: I) -> Vec<T>
where
    T: DeserializeOwned,
    I: IntoIterator<Item = &'a Record>,
{
    records
        .into_iter()
        .filter_map(|record| {
            match serde_json::from_value::<T>(Value::Object(record.clone())) {
                Ok(item) => Some(item),
                Err(err) => {
                    warn!(resource = %resource, error = %err, "skipped malformed record");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(record) => record,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn upsert_replaces_matching_id_and_appends_new() {
        let mut dir = Directory::default();
        dir.replace(
            Resource::Groups,
            vec![record(json!({ "groupID": 1, "name": "Day" }))],
        );
        dir.upsert(
            Resource::Groups,
            record(json!({ "groupID": "1", "name": "Day shift" })),
        );
        dir.upsert(Resource::Groups, record(json!({ "groupID": 2, "name": "Night" })));

        assert_eq!(dir.records(Resource::Groups).len(), 2);
        assert_eq!(dir.name_of(Resource::Groups, "1").as_deref(), Some("Day shift"));
    }

    #[test]
    fn remove_reports_whether_anything_changed() {
        let mut dir = Directory::default();
        dir.replace(
            Resource::Zones,
            vec![record(json!({ "zoneID": "Z1", "name": "Lobby" }))],
        );
        assert!(!dir.remove(Resource::Zones, "Z9"));
        assert!(dir.remove(Resource::Zones, "Z1"));
        assert!(dir.records(Resource::Zones).is_empty());
        assert!(!dir.remove(Resource::Terminals, "T1"));
    }

    #[test]
    fn typed_views_skip_malformed_records() {
        let mut dir = Directory::default();
        dir.replace(
            Resource::Employees,
            vec![
                record(json!({ "employeeID": "E1", "name": "Alice" })),
                record(json!({ "name": "no id" })),
            ],
        );
        let employees = dir.employees();
        assert_eq!(employees.len(), 1);
        assert_eq!(employees[0].id, "E1");
        assert!(dir.departments().is_empty());
    }
}
