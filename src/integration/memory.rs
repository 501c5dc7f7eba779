use std::collections::BTreeMap;

use super::rows::{project, DepartmentRow, DonationRow, EmployeeRow, RateRow, StatementRow};
use super::{InsertReport, StorageSink};
use crate::config::RateFieldNames;
use crate::dump::{Employee, Rate};
use crate::error::StorageError;

#[derive(Debug, Default)]
struct Tables {
    employees: BTreeMap<i64, EmployeeRow>,
    departments: BTreeMap<i64, DepartmentRow>,
    statements: BTreeMap<i64, StatementRow>,
    donations: BTreeMap<i64, DonationRow>,
    rates: BTreeMap<(String, String), RateRow>,
}

/// Store kept in process memory, with the same keys and insert-or-ignore
/// behaviour as the PostgreSQL schema. Used for dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Option<Tables>,
    rate_fields: RateFieldNames,
}

/// Rows whose key may be left to the store.
trait GeneratedKey {
    fn key(&self) -> Option<i64>;
    fn assign_key(&mut self, key: i64);
}

macro_rules! generated_key {
    ($row:ty) => {
        impl GeneratedKey for $row {
            fn key(&self) -> Option<i64> {
                self.id
            }

            fn assign_key(&mut self, key: i64) {
                self.id = Some(key);
            }
        }
    };
}

generated_key!(DepartmentRow);
generated_key!(StatementRow);
generated_key!(DonationRow);

fn insert_or_ignore<K: Ord, V>(table: &mut BTreeMap<K, V>, key: K, row: V, report: &mut InsertReport) {
    if table.contains_key(&key) {
        report.ignored += 1;
    } else {
        table.insert(key, row);
        report.inserted += 1;
    }
}

/// Rows carrying an id go first; the rest get keys above the highest stored one.
fn insert_with_generated<R: GeneratedKey>(table: &mut BTreeMap<i64, R>, rows: Vec<R>, report: &mut InsertReport) {
    let (keyed, keyless): (Vec<R>, Vec<R>) = rows.into_iter().partition(|r| r.key().is_some());

    for row in keyed {
        if let Some(key) = row.key() {
            insert_or_ignore(table, key, row, report);
        }
    }

    for mut row in keyless {
        let key = table.keys().next_back().map_or(1, |k| k + 1);
        row.assign_key(key);
        insert_or_ignore(table, key, row, report);
    }
}

impl MemoryStore {
    pub fn new(rate_fields: RateFieldNames) -> MemoryStore {
        MemoryStore { tables: None, rate_fields }
    }

    fn tables(&self) -> Option<&Tables> {
        self.tables.as_ref()
    }

    pub fn employees(&self) -> Vec<&EmployeeRow> {
        self.tables().map(|t| t.employees.values().collect()).unwrap_or_default()
    }

    pub fn departments(&self) -> Vec<&DepartmentRow> {
        self.tables().map(|t| t.departments.values().collect()).unwrap_or_default()
    }

    pub fn statements(&self) -> Vec<&StatementRow> {
        self.tables().map(|t| t.statements.values().collect()).unwrap_or_default()
    }

    pub fn donations(&self) -> Vec<&DonationRow> {
        self.tables().map(|t| t.donations.values().collect()).unwrap_or_default()
    }

    pub fn rates(&self) -> Vec<&RateRow> {
        self.tables().map(|t| t.rates.values().collect()).unwrap_or_default()
    }
}

impl StorageSink for MemoryStore {
    fn create_schema(&mut self) -> Result<(), StorageError> {
        if self.tables.is_none() {
            self.tables = Some(Tables::default());
        }
        Ok(())
    }

    fn insert_all(&mut self, employees: &[Employee], rates: &[Rate]) -> Result<InsertReport, StorageError> {
        let rows = project(employees, rates, &self.rate_fields);
        let tables = self.tables.as_mut().ok_or(StorageError::MissingSchema("Employee"))?;

        let mut report = InsertReport { skipped: rows.skipped, ..InsertReport::default() };

        for row in rows.employees {
            insert_or_ignore(&mut tables.employees, row.id, row, &mut report);
        }
        insert_with_generated(&mut tables.departments, rows.departments, &mut report);
        insert_with_generated(&mut tables.statements, rows.statements, &mut report);
        insert_with_generated(&mut tables.donations, rows.donations, &mut report);
        for row in rows.rates {
            insert_or_ignore(&mut tables.rates, (row.date.clone(), row.currency.clone()), row, &mut report);
        }

        Ok(report)
    }
}

#[cfg(test)]
const TEST_DUMP: &str = r#"
Employee
id: 1
name: Ann
surname: Lee
Department
id: 100
name: Eng
Statement
id: 10
amount: 1000
date: 2024-01
Statement
id: 11
amount: 1000.50
date: 2024-02
Donation
id: 20
amount: 120.50 USD
date: 2024-02
Employee
id: 2
name: Bob
surname: Ray
Department
id: 101
name: Sales
Donation
id: 21
amount: 15 EUR
date: 2024-03
Rate
date: 2024-03
sign: EUR
value: 1.08
Rate
date: 2024-03
sign: USD
value: 1
"#;

/// Dump with no ids on any sub-record.
#[cfg(test)]
const KEYLESS_DUMP: &str = "Employee\nid: 1\nname: Ann\nDepartment\nname: Eng\nStatement\namount: 1000\ndate: 2024-01\nDonation\namount: 50 USD\ndate: 2024-02\n";

#[cfg(test)]
fn empty_store() -> MemoryStore {
    let mut store = MemoryStore::new(RateFieldNames::default());
    store.create_schema().unwrap();
    store
}

#[test]
fn test_round_trip() {
    use crate::dump::parser::parse_dump;
    use rust_decimal::Decimal;

    let dump = parse_dump(TEST_DUMP).unwrap();
    let mut store = empty_store();

    let report = store.insert_all(&dump.employees, &dump.rates).unwrap();
    assert_eq!(report, InsertReport { inserted: 2 + 2 + 2 + 2 + 2, ignored: 0, skipped: 0 });

    let employees = store.employees();
    assert_eq!(employees.len(), dump.employees.len());
    assert_eq!(employees[1], &EmployeeRow { id: 2, name: Some("Bob".to_owned()), surname: Some("Ray".to_owned()) });

    let departments = store.departments();
    assert_eq!(departments.len(), 2);
    assert_eq!(departments[0].name.as_deref(), Some("Eng"));
    assert_eq!(departments[0].employee_id, 1);

    let statements = store.statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(statements[1].amount, Some(Decimal::new(100050, 2)));
    assert!(statements.iter().all(|s| s.employee_id == 1));

    let donations = store.donations();
    assert_eq!(donations.len(), 2);
    assert_eq!(donations[0].amount, Some(Decimal::new(12050, 2)));
    assert_eq!(donations[0].currency.as_deref(), Some("USD"));
    assert_eq!(donations[1].currency.as_deref(), Some("EUR"));
    assert_eq!(donations[1].employee_id, 2);

    let rates = store.rates();
    assert_eq!(rates.len(), dump.rates.len());
    assert_eq!(rates[0].currency, "EUR");
    assert_eq!(rates[0].rate, Some(Decimal::new(108, 2)));
}

#[test]
fn test_round_trip_without_sub_record_ids() {
    use crate::dump::parser::parse_dump;
    use rust_decimal::Decimal;

    let dump = parse_dump(KEYLESS_DUMP).unwrap();
    let mut store = empty_store();

    let report = store.insert_all(&dump.employees, &dump.rates).unwrap();
    assert_eq!(report, InsertReport { inserted: 4, ignored: 0, skipped: 0 });

    assert_eq!(store.employees(), vec![&EmployeeRow { id: 1, name: Some("Ann".to_owned()), surname: None }]);
    assert_eq!(store.departments(), vec![&DepartmentRow { id: Some(1), name: Some("Eng".to_owned()), employee_id: 1 }]);
    assert_eq!(store.statements(), vec![&StatementRow {
        id: Some(1),
        amount: Some(Decimal::new(1000, 0)),
        date: Some("2024-01".to_owned()),
        employee_id: 1,
    }]);
    assert_eq!(store.donations(), vec![&DonationRow {
        id: Some(1),
        amount: Some(Decimal::new(50, 0)),
        currency: Some("USD".to_owned()),
        date: Some("2024-02".to_owned()),
        employee_id: 1,
    }]);
    assert!(store.rates().is_empty());
}

#[test]
fn test_rerun_without_sub_record_ids() {
    use crate::dump::parser::parse_dump;

    let dump = parse_dump(KEYLESS_DUMP).unwrap();
    let mut store = empty_store();

    store.insert_all(&dump.employees, &dump.rates).unwrap();
    let second = store.insert_all(&dump.employees, &dump.rates).unwrap();

    // the employee key repeats and is ignored; keyless rows have no key to
    // repeat, so they get fresh ones
    assert_eq!(second, InsertReport { inserted: 3, ignored: 1, skipped: 0 });
    assert_eq!(store.employees().len(), 1);
    let keys: Vec<_> = store.statements().iter().map(|s| s.id).collect();
    assert_eq!(keys, vec![Some(1), Some(2)]);
}

#[test]
fn test_generated_keys_follow_stored_ones() {
    use crate::dump::parser::parse_dump;

    let mut store = empty_store();
    let dump = parse_dump("Employee\nid: 1\nStatement\namount: 1\nStatement\nid: 7\namount: 2\nStatement\namount: 3\n").unwrap();

    let report = store.insert_all(&dump.employees, &dump.rates).unwrap();
    assert_eq!(report.inserted, 4);

    let keys: Vec<_> = store.statements().iter().map(|s| s.id).collect();
    assert_eq!(keys, vec![Some(7), Some(8), Some(9)]);
}

#[test]
fn test_rerun_is_idempotent() {
    use crate::dump::parser::parse_dump;

    let dump = parse_dump(TEST_DUMP).unwrap();
    let mut store = empty_store();

    let first = store.insert_all(&dump.employees, &dump.rates).unwrap();
    store.create_schema().unwrap();
    let second = store.insert_all(&dump.employees, &dump.rates).unwrap();

    assert_eq!(second.inserted, 0);
    assert_eq!(second.ignored, first.inserted);
    assert_eq!(store.employees().len(), 2);
    assert_eq!(store.statements().len(), 2);
    assert_eq!(store.rates().len(), 2);
}

#[test]
fn test_existing_keys_are_not_overwritten() {
    use crate::dump::parser::parse_dump;

    let mut store = empty_store();
    let first = parse_dump("Employee\nid: 1\nname: Ann\n").unwrap();
    let second = parse_dump("Employee\nid: 1\nname: Changed\nStatement\nid: 5\namount: 1\n").unwrap();

    store.insert_all(&first.employees, &first.rates).unwrap();
    let report = store.insert_all(&second.employees, &second.rates).unwrap();

    assert_eq!(report, InsertReport { inserted: 1, ignored: 1, skipped: 0 });
    assert_eq!(store.employees()[0].name.as_deref(), Some("Ann"));
    assert_eq!(store.statements()[0].employee_id, 1);
}

#[test]
fn test_insert_requires_schema() {
    use crate::dump::parser::parse_dump;

    let dump = parse_dump(TEST_DUMP).unwrap();
    let mut store = MemoryStore::new(RateFieldNames::default());

    match store.insert_all(&dump.employees, &dump.rates) {
        Err(StorageError::MissingSchema(table)) => assert_eq!(table, "Employee"),
        other => panic!("expected missing schema, got {:?}", other),
    }
    assert!(store.employees().is_empty());
}

#[test]
fn test_structural_error_persists_nothing() {
    use crate::dump::parser::parse_dump;

    let mut store = empty_store();
    let result = parse_dump("Statement\nid: 1\nEmployee\nid: 1\n");

    assert!(result.is_err());
    if let Ok(dump) = result {
        store.insert_all(&dump.employees, &dump.rates).unwrap();
    }
    assert!(store.employees().is_empty());
    assert!(store.statements().is_empty());
}
