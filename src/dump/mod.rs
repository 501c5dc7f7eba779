use std::collections::HashMap;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub mod line;
pub mod parser;

use regex::Regex;
use rust_decimal::Decimal;

use crate::error::FieldError;

/// Scalar fields of a record, as read from the dump. Later writes to the same key win.
pub type Fields = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Employee,
    Statement,
    Department,
    Donation,
    Rate,
}

impl SectionKind {
    /// Exact, case-sensitive match of an already trimmed line.
    pub fn from_header(line: &str) -> Option<SectionKind> {
        match line {
            "Employee" => Some(SectionKind::Employee),
            "Statement" => Some(SectionKind::Statement),
            "Department" => Some(SectionKind::Department),
            "Donation" => Some(SectionKind::Donation),
            "Rate" => Some(SectionKind::Rate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Employee => "Employee",
            SectionKind::Statement => "Statement",
            SectionKind::Department => "Department",
            SectionKind::Donation => "Donation",
            SectionKind::Rate => "Rate",
        }
    }
}

impl Display for SectionKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn field<'a>(fields: &'a Fields, key: &str) -> Option<&'a str> {
    fields.get(key).map(String::as_str)
}

fn decimal_field(fields: &Fields, key: &str) -> Result<Option<Decimal>, FieldError> {
    match fields.get(key) {
        Some(raw) => parse_decimal(key, raw).map(Some),
        None => Ok(None),
    }
}

fn parse_decimal(key: &str, raw: &str) -> Result<Decimal, FieldError> {
    Decimal::from_str(raw).map_err(|_| FieldError::InvalidDecimal {
        key: key.to_owned(),
        value: raw.to_owned(),
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Department {
    pub fields: Fields,
}

impl Department {
    pub fn id(&self) -> Option<&str> {
        field(&self.fields, "id")
    }

    pub fn name(&self) -> Option<&str> {
        field(&self.fields, "name")
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SalaryStatement {
    pub fields: Fields,
}

impl SalaryStatement {
    pub fn id(&self) -> Option<&str> {
        field(&self.fields, "id")
    }

    pub fn amount(&self) -> Result<Option<Decimal>, FieldError> {
        decimal_field(&self.fields, "amount")
    }

    /// Kept as the opaque token found in the dump.
    pub fn date(&self) -> Option<&str> {
        field(&self.fields, "date")
    }
}

/// The `"<decimal> <currency>"` value of a donation's `amount` field.
#[derive(Debug, Clone, PartialEq)]
pub struct DonationAmount {
    pub amount: Decimal,
    pub currency: String,
}

impl FromStr for DonationAmount {
    type Err = FieldError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        lazy_static! {
            static ref RE_AMOUNT_CURRENCY: Regex = Regex::new(r"^(?P<amount>\S+)\s+(?P<currency>\S+)").unwrap();
        }

        let captures = match RE_AMOUNT_CURRENCY.captures(raw.trim()) {
            Some(x) => x,
            None => return Err(FieldError::MissingCurrency(raw.to_owned())),
        };

        Ok(DonationAmount {
            amount: parse_decimal("amount", &captures["amount"])?,
            currency: captures["currency"].to_owned(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Donation {
    pub fields: Fields,
}

impl Donation {
    pub fn id(&self) -> Option<&str> {
        field(&self.fields, "id")
    }

    pub fn amount(&self) -> Result<Option<DonationAmount>, FieldError> {
        match self.fields.get("amount") {
            Some(raw) => raw.parse().map(Some),
            None => Ok(None),
        }
    }

    pub fn date(&self) -> Option<&str> {
        field(&self.fields, "date")
    }
}

/// An exchange rate. The dump spells its fields either `sign`/`value` or
/// `currency`/`rate`, so lookups take the list of accepted names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rate {
    pub fields: Fields,
}

impl Rate {
    pub fn date(&self) -> Option<&str> {
        field(&self.fields, "date")
    }

    /// First present field among `keys`.
    pub fn currency<S: AsRef<str>>(&self, keys: &[S]) -> Option<&str> {
        keys.iter().find_map(|k| field(&self.fields, k.as_ref()))
    }

    pub fn value<S: AsRef<str>>(&self, keys: &[S]) -> Result<Option<Decimal>, FieldError> {
        match keys.iter().find(|k| self.fields.contains_key(k.as_ref())) {
            Some(key) => decimal_field(&self.fields, key.as_ref()),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Employee {
    pub fields: Fields,
    pub department: Department,
    pub statements: Vec<SalaryStatement>,
    pub donations: Vec<Donation>,
}

impl Employee {
    pub fn id(&self) -> Option<&str> {
        field(&self.fields, "id")
    }

    pub fn name(&self) -> Option<&str> {
        field(&self.fields, "name")
    }

    pub fn surname(&self) -> Option<&str> {
        field(&self.fields, "surname")
    }
}

/// Everything read from one or more dumps, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dump {
    pub employees: Vec<Employee>,
    pub rates: Vec<Rate>,
}

impl Dump {
    /// Appends another dump's records after this one's.
    pub fn merge(&mut self, other: Dump) {
        self.employees.extend(other.employees);
        self.rates.extend(other.rates);
    }
}

#[test]
fn test_donation_amount_split() {
    let parsed: DonationAmount = "120.50 USD".parse().unwrap();
    assert_eq!(parsed.amount, Decimal::new(12050, 2));
    assert_eq!(parsed.currency, "USD");

    let parsed: DonationAmount = "  7 \t EUR ".parse().unwrap();
    assert_eq!(parsed.amount, Decimal::new(7, 0));
    assert_eq!(parsed.currency, "EUR");
}

#[test]
fn test_donation_amount_errors() {
    assert_eq!(
        "50".parse::<DonationAmount>(),
        Err(FieldError::MissingCurrency("50".to_owned()))
    );
    assert_eq!(
        "fifty USD".parse::<DonationAmount>(),
        Err(FieldError::InvalidDecimal { key: "amount".to_owned(), value: "fifty".to_owned() })
    );
}

#[test]
fn test_rate_field_aliases() {
    let mut rate = Rate::default();
    rate.fields.insert("sign".to_owned(), "EUR".to_owned());
    rate.fields.insert("rate".to_owned(), "1.08".to_owned());

    let currency_keys = ["sign", "currency"];
    let value_keys = ["value", "rate"];
    assert_eq!(rate.currency(&currency_keys), Some("EUR"));
    assert_eq!(rate.value(&value_keys), Ok(Some(Decimal::new(108, 2))));
    assert_eq!(rate.value(&["missing"]), Ok(None));
}

#[test]
fn test_statement_amount() {
    let mut statement = SalaryStatement::default();
    assert_eq!(statement.amount(), Ok(None));

    statement.fields.insert("amount".to_owned(), "1000".to_owned());
    assert_eq!(statement.amount(), Ok(Some(Decimal::new(1000, 0))));

    statement.fields.insert("amount".to_owned(), "lots".to_owned());
    assert!(statement.amount().is_err());
}
