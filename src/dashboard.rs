use crate::directory::Directory;
use crate::domain::Resource;
use chrono::{Datelike, NaiveDate};

pub const BIRTHDAY_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpcomingBirthday {
    pub name: String,
    pub date: NaiveDate,
    pub days_until: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DashboardSummary {
    pub employees: usize,
    pub departments: usize,
    pub groups: usize,
    pub terminals: usize,
    pub birthdays: Vec<UpcomingBirthday>,
}

impl DashboardSummary {
    pub fn compute(directory: &Directory, today: NaiveDate) -> Self {
        let mut birthdays: Vec<UpcomingBirthday> = directory
            .employees()
            .into_iter()
            .filter_map(|emp| {
                let born = parse_birthday(emp.birthday.as_deref()?)?;
                let date = next_occurrence(born, today)?;
                let days_until = (date - today).num_days();
                (days_until <= BIRTHDAY_WINDOW_DAYS).then(|| UpcomingBirthday {
                    name: emp.name.clone().unwrap_or_else(|| emp.id.clone()),
                    date,
                    days_until,
                })
            })
            .collect();
        birthdays.sort_by(|a, b| a.days_until.cmp(&b.days_until).then(a.name.cmp(&b.name)));

        Self {
            employees: directory.records(Resource::Employees).len(),
            departments: directory.records(Resource::Departments).len(),
            groups: directory.records(Resource::Groups).len(),
            terminals: directory.records(Resource::Terminals).len(),
            birthdays,
        }
    }
}

/// Accepts `YYYY-MM-DD` optionally followed by a time part.
fn parse_birthday(raw: &str) -> Option<NaiveDate> {
    let date = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Next anniversary on or after `today`. Feb 29 falls on Feb 28 in common years.
fn next_occurrence(born: NaiveDate, today: NaiveDate) -> Option<NaiveDate> {
    let in_year = |year: i32| {
        NaiveDate::from_ymd_opt(year, born.month(), born.day())
            .or_else(|| NaiveDate::from_ymd_opt(year, born.month(), born.day() - 1))
    };
    let this_year = in_year(today.year())?;
    if this_year >= today {
        Some(this_year)
    } else {
        in_year(today.year() + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn record(value: Value) -> crate::domain::Record {
        match value {
            Value::Object(record) => record,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn counts_and_upcoming_birthdays() {
        let mut dir = Directory::default();
        dir.replace(
            Resource::Employees,
            vec![
                record(json!({ "employeeID": "E1", "name": "Alice", "birthday": "1990-06-10T00:00:00" })),
                record(json!({ "employeeID": "E2", "name": "Bob", "birthday": "1985-06-01" })),
                record(json!({ "employeeID": "E3", "name": "Carol", "birthday": "1979-09-01" })),
                record(json!({ "employeeID": "E4", "name": "Dan", "birthday": "unknown" })),
                record(json!({ "employeeID": "E5", "name": "Eve" })),
            ],
        );
        dir.replace(Resource::Groups, vec![record(json!({ "groupID": "G1" }))]);

        let summary = DashboardSummary::compute(&dir, date(2024, 6, 1));
        assert_eq!(summary.employees, 5);
        assert_eq!(summary.groups, 1);
        assert_eq!(summary.terminals, 0);
        let names: Vec<(&str, i64)> = summary
            .birthdays
            .iter()
            .map(|b| (b.name.as_str(), b.days_until))
            .collect();
        assert_eq!(names, vec![("Bob", 0), ("Alice", 9)]);
    }

    #[test]
    fn birthday_wraps_into_next_year() {
        assert_eq!(
            next_occurrence(date(1990, 1, 5), date(2024, 12, 20)),
            Some(date(2025, 1, 5))
        );
    }

    #[test]
    fn leap_day_falls_back_in_common_years() {
        assert_eq!(
            next_occurrence(date(1992, 2, 29), date(2023, 2, 1)),
            Some(date(2023, 2, 28))
        );
        assert_eq!(
            next_occurrence(date(1992, 2, 29), date(2024, 2, 1)),
            Some(date(2024, 2, 29))
        );
    }
}
