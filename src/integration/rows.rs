use rust_decimal::Decimal;

use crate::config::RateFieldNames;
use crate::dump::{Employee, Rate};
use crate::error::FieldError;

#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeRow {
    pub id: i64,
    pub name: Option<String>,
    pub surname: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepartmentRow {
    /// `None` when the dump gives no id; the store assigns one.
    pub id: Option<i64>,
    pub name: Option<String>,
    pub employee_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatementRow {
    /// `None` when the dump gives no id; the store assigns one.
    pub id: Option<i64>,
    pub amount: Option<Decimal>,
    pub date: Option<String>,
    pub employee_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DonationRow {
    /// `None` when the dump gives no id; the store assigns one.
    pub id: Option<i64>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub date: Option<String>,
    pub employee_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateRow {
    pub date: String,
    pub currency: String,
    pub rate: Option<Decimal>,
}

#[derive(Debug, Default, PartialEq)]
pub struct Rows {
    pub employees: Vec<EmployeeRow>,
    pub departments: Vec<DepartmentRow>,
    pub statements: Vec<StatementRow>,
    pub donations: Vec<DonationRow>,
    pub rates: Vec<RateRow>,
    /// Records that could not become a row.
    pub skipped: usize,
}

/// `Ok(None)` for an absent id, an error only for one that is present but malformed.
fn parse_key(id: Option<&str>) -> Result<Option<i64>, FieldError> {
    match id {
        Some(raw) => raw.parse::<i64>().map(Some).map_err(|_| FieldError::InvalidInteger {
            key: "id".to_owned(),
            value: raw.to_owned(),
        }),
        None => Ok(None),
    }
}

/// Employees are the foreign key target, so their id cannot be generated.
fn required_key(id: Option<&str>) -> Result<i64, FieldError> {
    parse_key(id)?.ok_or_else(|| FieldError::Missing("id".to_owned()))
}

fn describe(id: Option<i64>) -> String {
    match id {
        Some(id) => id.to_string(),
        None => "without id".to_owned(),
    }
}

/// Unparsable numbers are stored as NULL rather than dropping the row.
fn or_null<T>(result: Result<Option<T>, FieldError>, context: &str) -> Option<T> {
    match result {
        Ok(v) => v,
        Err(e) => {
            warn!("{}: {}, storing NULL", context, e);
            None
        }
    }
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_owned)
}

pub fn project(employees: &[Employee], rates: &[Rate], rate_fields: &RateFieldNames) -> Rows {
    let mut rows = Rows::default();

    for employee in employees {
        let employee_id = match required_key(employee.id()) {
            Ok(id) => id,
            Err(e) => {
                let dependents = employee.statements.len() + employee.donations.len()
                    + if employee.department.is_empty() { 0 } else { 1 };
                warn!("skipping employee {:?} and {} dependent records: {}", employee.name(), dependents, e);
                rows.skipped += 1 + dependents;
                continue;
            }
        };

        rows.employees.push(EmployeeRow {
            id: employee_id,
            name: owned(employee.name()),
            surname: owned(employee.surname()),
        });

        let department = &employee.department;
        if !department.is_empty() {
            match parse_key(department.id()) {
                Ok(id) => rows.departments.push(DepartmentRow {
                    id,
                    name: owned(department.name()),
                    employee_id,
                }),
                Err(e) => {
                    warn!("employee {}: skipping department: {}", employee_id, e);
                    rows.skipped += 1;
                }
            }
        }

        for statement in &employee.statements {
            let id = match parse_key(statement.id()) {
                Ok(id) => id,
                Err(e) => {
                    warn!("employee {}: skipping salary statement: {}", employee_id, e);
                    rows.skipped += 1;
                    continue;
                }
            };

            rows.statements.push(StatementRow {
                id,
                amount: or_null(statement.amount(), &format!("salary statement {}", describe(id))),
                date: owned(statement.date()),
                employee_id,
            });
        }

        for donation in &employee.donations {
            let id = match parse_key(donation.id()) {
                Ok(id) => id,
                Err(e) => {
                    warn!("employee {}: skipping donation: {}", employee_id, e);
                    rows.skipped += 1;
                    continue;
                }
            };

            let (amount, currency) = match or_null(donation.amount(), &format!("donation {}", describe(id))) {
                Some(a) => (Some(a.amount), Some(a.currency)),
                None => (None, None),
            };

            rows.donations.push(DonationRow {
                id,
                amount,
                currency,
                date: owned(donation.date()),
                employee_id,
            });
        }
    }

    for rate in rates {
        let (date, currency) = match (rate.date(), rate.currency(&rate_fields.currency_keys)) {
            (Some(date), Some(currency)) => (date, currency),
            _ => {
                warn!("skipping rate without date or currency: {:?}", rate.fields);
                rows.skipped += 1;
                continue;
            }
        };

        rows.rates.push(RateRow {
            date: date.to_owned(),
            currency: currency.to_owned(),
            rate: or_null(rate.value(&rate_fields.value_keys), &format!("rate {} {}", date, currency)),
        });
    }

    rows
}

#[test]
fn test_project_example() {
    use crate::dump::parser::parse_dump;

    let dump = parse_dump(r#"
Employee
id: 1
name: Ann
surname: Lee
Department
id: 3
name: Eng
Statement
id: 10
amount: 1000
date: 2024-01
Donation
id: 20
amount: 120.50 USD
date: 2024-02
Rate
date: 2024-02
sign: USD
value: 1
"#).unwrap();

    let rows = project(&dump.employees, &dump.rates, &RateFieldNames::default());

    assert_eq!(rows.skipped, 0);
    assert_eq!(rows.employees, vec![EmployeeRow { id: 1, name: Some("Ann".to_owned()), surname: Some("Lee".to_owned()) }]);
    assert_eq!(rows.departments, vec![DepartmentRow { id: Some(3), name: Some("Eng".to_owned()), employee_id: 1 }]);
    assert_eq!(rows.statements, vec![StatementRow {
        id: Some(10),
        amount: Some(Decimal::new(1000, 0)),
        date: Some("2024-01".to_owned()),
        employee_id: 1,
    }]);
    assert_eq!(rows.donations, vec![DonationRow {
        id: Some(20),
        amount: Some(Decimal::new(12050, 2)),
        currency: Some("USD".to_owned()),
        date: Some("2024-02".to_owned()),
        employee_id: 1,
    }]);
    assert_eq!(rows.rates, vec![RateRow {
        date: "2024-02".to_owned(),
        currency: "USD".to_owned(),
        rate: Some(Decimal::new(1, 0)),
    }]);
}

#[test]
fn test_project_keys() {
    use crate::dump::parser::parse_dump;

    let dump = parse_dump(r#"
Employee
name: No Id
Statement
id: 1
Donation
id: 2
Employee
id: seven
Employee
id: 7
Department
name: Ops
Statement
amount: 5
Statement
id: 8x
Donation
id: 9
amount: 12
Rate
sign: EUR
value: 1.1
"#).unwrap();

    let rows = project(&dump.employees, &dump.rates, &RateFieldNames::default());

    // employee without id plus its two sub-records, malformed employee id,
    // malformed statement id, rate without date
    assert_eq!(rows.skipped, 3 + 1 + 1 + 1);
    assert_eq!(rows.employees.len(), 1);
    assert_eq!(rows.employees[0].id, 7);
    assert!(rows.rates.is_empty());

    // absent ids are left for the store to assign
    assert_eq!(rows.departments, vec![DepartmentRow { id: None, name: Some("Ops".to_owned()), employee_id: 7 }]);
    assert_eq!(rows.statements.len(), 1);
    assert_eq!(rows.statements[0].id, None);
    assert_eq!(rows.statements[0].amount, Some(Decimal::new(5, 0)));

    // malformed amount keeps the row with NULL amount and currency
    assert_eq!(rows.donations.len(), 1);
    assert_eq!(rows.donations[0].id, Some(9));
    assert_eq!(rows.donations[0].amount, None);
    assert_eq!(rows.donations[0].currency, None);
}

#[test]
fn test_parse_key_missing_and_malformed() {
    assert_eq!(parse_key(None), Ok(None));
    assert_eq!(parse_key(Some("42")), Ok(Some(42)));
    assert_eq!(parse_key(Some("4 2")), Err(FieldError::InvalidInteger { key: "id".to_owned(), value: "4 2".to_owned() }));

    assert_eq!(required_key(Some("42")), Ok(42));
    assert_eq!(required_key(None), Err(FieldError::Missing("id".to_owned())));
    assert_eq!(required_key(Some("")), Err(FieldError::InvalidInteger { key: "id".to_owned(), value: "".to_owned() }));
    assert_eq!(required_key(None).unwrap_err().to_string(), "field `id` is missing");
}

#[test]
fn test_project_rate_field_names() {
    use crate::dump::parser::parse_dump;

    let dump = parse_dump("Rate\ndate: 2024-03\ncurrency: CHF\nrate: 0.9\nRate\ndate: 2024-03\nsign: JPY\nvalue: 0.006\n").unwrap();

    let rows = project(&dump.employees, &dump.rates, &RateFieldNames::default());
    assert_eq!(rows.rates.len(), 2);
    assert_eq!(rows.rates[0].currency, "CHF");
    assert_eq!(rows.rates[0].rate, Some(Decimal::new(9, 1)));
    assert_eq!(rows.rates[1].currency, "JPY");
    assert_eq!(rows.rates[1].rate, Some(Decimal::new(6, 3)));

    let only_sign = RateFieldNames {
        currency_keys: vec!["sign".to_owned()],
        value_keys: vec!["value".to_owned()],
    };
    let rows = project(&dump.employees, &dump.rates, &only_sign);
    assert_eq!(rows.rates.len(), 1);
    assert_eq!(rows.skipped, 1);
}
