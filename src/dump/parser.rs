use super::line::{classify, Line};
use super::{Donation, Dump, Employee, Rate, SalaryStatement, SectionKind};
use crate::error::ParseError;

/// Single-pass state machine over dump lines.
///
/// Sections have no closing markers: every header line closes whatever
/// section was open. Department, statement and donation sections attach to
/// the most recently opened employee; rates live in their own list.
#[derive(Debug, Default)]
pub struct DumpParser {
    section: Option<SectionKind>,
    open_employee: Option<Employee>,
    employees: Vec<Employee>,
    rates: Vec<Rate>,
    line_number: usize,
    dropped: usize,
}

impl DumpParser {
    pub fn new() -> DumpParser {
        DumpParser::default()
    }

    pub fn feed(&mut self, raw: &str) -> Result<(), ParseError> {
        self.line_number += 1;

        match classify(raw) {
            Line::Blank => Ok(()),
            Line::Header(kind) => self.open_section(kind),
            Line::Field(key, value) => {
                self.set_field(key, value);
                Ok(())
            },
            Line::Unrecognized => {
                debug!("line {}: dropping unrecognized line `{}`", self.line_number, raw.trim());
                self.dropped += 1;
                Ok(())
            }
        }
    }

    fn open_section(&mut self, kind: SectionKind) -> Result<(), ParseError> {
        match kind {
            SectionKind::Employee => {
                if let Some(employee) = self.open_employee.take() {
                    self.employees.push(employee);
                }
                self.open_employee = Some(Employee::default());
            },
            SectionKind::Rate => {
                self.rates.push(Rate::default());
            },
            SectionKind::Statement => {
                self.require_employee(kind)?.statements.push(SalaryStatement::default());
            },
            SectionKind::Donation => {
                self.require_employee(kind)?.donations.push(Donation::default());
            },
            SectionKind::Department => {
                self.require_employee(kind)?.department.fields.clear();
            }
        }

        self.section = Some(kind);
        Ok(())
    }

    fn require_employee(&mut self, section: SectionKind) -> Result<&mut Employee, ParseError> {
        let line = self.line_number;
        self.open_employee.as_mut().ok_or(ParseError::Structural { line, section })
    }

    fn set_field(&mut self, key: &str, value: &str) {
        let target = match self.section {
            Some(SectionKind::Rate) => self.rates.last_mut().map(|r| &mut r.fields),
            Some(SectionKind::Employee) => self.open_employee.as_mut().map(|e| &mut e.fields),
            Some(SectionKind::Department) => self.open_employee.as_mut().map(|e| &mut e.department.fields),
            Some(SectionKind::Statement) => self.open_employee.as_mut()
                .and_then(|e| e.statements.last_mut())
                .map(|s| &mut s.fields),
            Some(SectionKind::Donation) => self.open_employee.as_mut()
                .and_then(|e| e.donations.last_mut())
                .map(|d| &mut d.fields),
            None => None,
        };

        match target {
            Some(fields) => {
                fields.insert(key.to_owned(), value.to_owned());
            },
            None => {
                debug!("line {}: dropping field `{}` outside of any section", self.line_number, key);
                self.dropped += 1;
            }
        }
    }

    /// Closes the open employee and hands back the collected records.
    pub fn finish(mut self) -> Dump {
        if let Some(employee) = self.open_employee.take() {
            self.employees.push(employee);
        }

        if self.dropped > 0 {
            debug!("{} of {} lines dropped", self.dropped, self.line_number);
        }

        Dump {
            employees: self.employees,
            rates: self.rates,
        }
    }
}

pub fn parse_dump(text: &str) -> Result<Dump, ParseError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut parser = DumpParser::new();

    for line in text.split('\n') {
        parser.feed(line)?;
    }

    Ok(parser.finish())
}

#[test]
fn test_single_employee_with_every_section() {
    use rust_decimal::Decimal;

    let text = "Employee\nid: 1\nname: Ann\nDepartment\nname: Eng\nStatement\namount: 1000\ndate: 2024-01\nDonation\namount: 50 USD\ndate: 2024-02\n";
    let dump = parse_dump(text).unwrap();

    assert_eq!(dump.employees.len(), 1);
    assert!(dump.rates.is_empty());

    let ann = &dump.employees[0];
    assert_eq!(ann.id(), Some("1"));
    assert_eq!(ann.name(), Some("Ann"));
    assert_eq!(ann.department.name(), Some("Eng"));

    assert_eq!(ann.statements.len(), 1);
    assert_eq!(ann.statements[0].amount(), Ok(Some(Decimal::new(1000, 0))));
    assert_eq!(ann.statements[0].date(), Some("2024-01"));

    assert_eq!(ann.donations.len(), 1);
    let donation = ann.donations[0].amount().unwrap().unwrap();
    assert_eq!(donation.amount, Decimal::new(50, 0));
    assert_eq!(donation.currency, "USD");
    assert_eq!(ann.donations[0].date(), Some("2024-02"));
}

#[test]
fn test_sub_records_belong_to_nearest_employee() {
    let text = r#"
Employee
id: 1
Statement
id: 10
Statement
id: 11
Rate
date: 2024-01-01
sign: EUR
value: 1.1
Donation
id: 20
Employee
id: 2
Donation
id: 21
Statement
id: 12
Employee
id: 3
"#;
    let dump = parse_dump(text).unwrap();

    assert_eq!(dump.employees.len(), 3);
    assert_eq!(dump.rates.len(), 1);

    let ids = |statements: &[SalaryStatement]| statements.iter().map(|s| s.id().unwrap().to_owned()).collect::<Vec<_>>();
    assert_eq!(ids(&dump.employees[0].statements), vec!["10", "11"]);
    assert_eq!(ids(&dump.employees[1].statements), vec!["12"]);
    assert!(dump.employees[2].statements.is_empty());

    // a rate section in between does not detach the open employee
    assert_eq!(dump.employees[0].donations.len(), 1);
    assert_eq!(dump.employees[0].donations[0].id(), Some("20"));
    assert_eq!(dump.employees[1].donations[0].id(), Some("21"));
    assert!(dump.employees[2].donations.is_empty());
}

#[test]
fn test_employee_count_matches_headers() {
    let mut text = String::new();
    for i in 0..25 {
        text.push_str(&format!("Employee\nid: {}\nStatement\namount: {}\n\nnoise line\n", i, i * 100));
    }
    text.push_str("Rate\nsign: USD\n");

    let dump = parse_dump(&text).unwrap();
    assert_eq!(dump.employees.len(), 25);
    assert_eq!(dump.employees[24].id(), Some("24"));
    assert_eq!(dump.rates.len(), 1);
}

#[test]
fn test_department_last_write_wins() {
    let text = "Employee\nid: 1\nDepartment\nid: 5\nname: Sales\nfloor: 3\nDepartment\nid: 6\nname: Eng\n";
    let dump = parse_dump(text).unwrap();

    let department = &dump.employees[0].department;
    assert_eq!(department.id(), Some("6"));
    assert_eq!(department.name(), Some("Eng"));
    assert_eq!(department.fields.get("floor"), None);
}

#[test]
fn test_repeated_key_overwrites() {
    let dump = parse_dump("Employee\nname: Ann\nsurname: Lee\nname: Anna\n").unwrap();
    assert_eq!(dump.employees[0].name(), Some("Anna"));
    assert_eq!(dump.employees[0].surname(), Some("Lee"));
}

#[test]
fn test_fields_follow_the_latest_header() {
    let dump = parse_dump("Employee\nid: 1\nStatement\nid: 7\nname: Late\n").unwrap();
    assert_eq!(dump.employees[0].name(), None);
    assert_eq!(dump.employees[0].statements[0].fields.get("name").map(String::as_str), Some("Late"));
}

#[test]
fn test_statement_before_employee_is_structural_error() {
    let err = parse_dump("Rate\nsign: USD\n\nStatement\namount: 5\n").unwrap_err();
    assert_eq!(err, ParseError::Structural { line: 4, section: SectionKind::Statement });

    for header in &["Donation", "Department"] {
        let text = format!("{}\nid: 1\nEmployee\nid: 2\n", header);
        assert!(matches!(parse_dump(&text), Err(ParseError::Structural { line: 1, .. })));
    }
}

#[test]
fn test_fields_before_any_header_are_dropped() {
    let dump = parse_dump("id: 99\nname: Nobody\nEmployee\nid: 1\n").unwrap();
    assert_eq!(dump.employees.len(), 1);
    assert_eq!(dump.employees[0].id(), Some("1"));
    assert_eq!(dump.employees[0].name(), None);
}

#[test]
fn test_unknown_headers_and_noise_are_ignored() {
    let text = "Employee\r\nid: 1\r\nPayroll\r\nbroken line\r\n: orphan\r\nkey:\r\nname: Ann\r\n";
    let dump = parse_dump(text).unwrap();
    assert_eq!(dump.employees[0].fields.len(), 2);
    assert_eq!(dump.employees[0].name(), Some("Ann"));
}

#[test]
fn test_empty_input() {
    assert_eq!(parse_dump("").unwrap(), Dump::default());
    assert_eq!(parse_dump("\n\n   \n").unwrap(), Dump::default());
}

#[test]
fn test_rates_are_independent_of_employees() {
    let dump = parse_dump("Rate\ndate: 2024-01-01\nsign: EUR\nvalue: 1.1\nRate\ndate: 2024-01-01\nsign: GBP\nvalue: 1.3\n").unwrap();
    assert!(dump.employees.is_empty());
    assert_eq!(dump.rates.len(), 2);
    assert_eq!(dump.rates[1].currency(&["sign"]), Some("GBP"));
}

#[test]
fn test_leading_byte_order_mark() {
    let dump = parse_dump("\u{feff}Employee\nid: 1\nDepartment\nid: 2\nname: Eng\n").unwrap();

    assert_eq!(dump.employees.len(), 1);
    assert_eq!(dump.employees[0].id(), Some("1"));
    assert_eq!(dump.employees[0].department.id(), Some("2"));
    assert_eq!(dump.employees[0].department.name(), Some("Eng"));
}
