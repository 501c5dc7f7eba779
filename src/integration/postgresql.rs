use postgres::{Client, Config, NoTls, Statement, Transaction};

use super::rows::{project, Rows};
use super::{InsertReport, StorageSink};
use crate::config::RateFieldNames;
use crate::dump::{Employee, Rate};
use crate::error::StorageError;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS Employee (
        id bigint PRIMARY KEY,
        name text,
        surname text
    );

    CREATE TABLE IF NOT EXISTS Department (
        id bigint GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
        name text,
        employee_id bigint REFERENCES Employee(id)
    );

    CREATE TABLE IF NOT EXISTS SalaryStatement (
        id bigint GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
        amount numeric,
        date text,
        employee_id bigint REFERENCES Employee(id)
    );

    CREATE TABLE IF NOT EXISTS Donation (
        id bigint GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
        amount numeric,
        currency text,
        date text,
        employee_id bigint REFERENCES Employee(id)
    );

    CREATE TABLE IF NOT EXISTS Rate (
        date text NOT NULL,
        currency text NOT NULL,
        rate numeric,
        constraint rate_pkeys primary key (date, currency)
    );
"#;

pub fn connect(host: &str, port: u16, user: &str, dbname: &str, password: &str) -> Result<Client, StorageError> {
    let client = Config::new()
        .host(host)
        .port(port)
        .user(user)
        .dbname(dbname)
        .password(password)
        .connect(NoTls)?;

    Ok(client)
}

pub struct PostgresSink {
    client: Client,
    rate_fields: RateFieldNames,
}

impl PostgresSink {
    pub fn new(client: Client, rate_fields: RateFieldNames) -> PostgresSink {
        PostgresSink { client, rate_fields }
    }
}

/// Runs one prepared insert per row, counting rows the conflict clause swallowed.
fn insert_rows<'a, T: 'a>(
    tx: &mut Transaction,
    sql: &str,
    rows: impl IntoIterator<Item = &'a T>,
    execute: impl Fn(&mut Transaction, &Statement, &T) -> Result<u64, postgres::Error>,
    report: &mut InsertReport,
) -> Result<(), StorageError> {
    let statement = tx.prepare(sql)?;

    for row in rows {
        match execute(tx, &statement, row)? {
            0 => report.ignored += 1,
            n => report.inserted += n as usize,
        }
    }

    Ok(())
}

/// Moves the identity sequence past ids written explicitly, so generated
/// keys do not collide with them.
fn sync_identity(tx: &mut Transaction, table: &str) -> Result<(), StorageError> {
    let sql = format!(
        "SELECT setval(pg_get_serial_sequence('{0}', 'id'), COALESCE((SELECT MAX(id) FROM {0}), 0) + 1, false)",
        table);
    tx.execute(sql.as_str(), &[])?;
    Ok(())
}

fn insert_projection(tx: &mut Transaction, rows: &Rows) -> Result<InsertReport, StorageError> {
    let mut report = InsertReport { skipped: rows.skipped, ..InsertReport::default() };

    insert_rows(tx,
        "INSERT INTO Employee (id, name, surname) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        &rows.employees,
        |tx, st, r| tx.execute(st, &[&r.id, &r.name, &r.surname]),
        &mut report)?;

    insert_rows(tx,
        "INSERT INTO Department (id, name, employee_id) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        rows.departments.iter().filter(|r| r.id.is_some()),
        |tx, st, r| tx.execute(st, &[&r.id, &r.name, &r.employee_id]),
        &mut report)?;
    sync_identity(tx, "Department")?;
    insert_rows(tx,
        "INSERT INTO Department (name, employee_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        rows.departments.iter().filter(|r| r.id.is_none()),
        |tx, st, r| tx.execute(st, &[&r.name, &r.employee_id]),
        &mut report)?;

    insert_rows(tx,
        "INSERT INTO SalaryStatement (id, amount, date, employee_id) VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
        rows.statements.iter().filter(|r| r.id.is_some()),
        |tx, st, r| tx.execute(st, &[&r.id, &r.amount, &r.date, &r.employee_id]),
        &mut report)?;
    sync_identity(tx, "SalaryStatement")?;
    insert_rows(tx,
        "INSERT INTO SalaryStatement (amount, date, employee_id) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        rows.statements.iter().filter(|r| r.id.is_none()),
        |tx, st, r| tx.execute(st, &[&r.amount, &r.date, &r.employee_id]),
        &mut report)?;

    insert_rows(tx,
        "INSERT INTO Donation (id, amount, currency, date, employee_id) VALUES ($1, $2, $3, $4, $5) ON CONFLICT DO NOTHING",
        rows.donations.iter().filter(|r| r.id.is_some()),
        |tx, st, r| tx.execute(st, &[&r.id, &r.amount, &r.currency, &r.date, &r.employee_id]),
        &mut report)?;
    sync_identity(tx, "Donation")?;
    insert_rows(tx,
        "INSERT INTO Donation (amount, currency, date, employee_id) VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
        rows.donations.iter().filter(|r| r.id.is_none()),
        |tx, st, r| tx.execute(st, &[&r.amount, &r.currency, &r.date, &r.employee_id]),
        &mut report)?;

    insert_rows(tx,
        "INSERT INTO Rate (date, currency, rate) VALUES ($1, $2, $3) ON CONFLICT ON CONSTRAINT rate_pkeys DO NOTHING",
        &rows.rates,
        |tx, st, r| tx.execute(st, &[&r.date, &r.currency, &r.rate]),
        &mut report)?;

    Ok(report)
}

impl StorageSink for PostgresSink {
    fn create_schema(&mut self) -> Result<(), StorageError> {
        self.client.batch_execute(SCHEMA)?;
        Ok(())
    }

    /// All rows go in one transaction; any database error rolls the batch back.
    fn insert_all(&mut self, employees: &[Employee], rates: &[Rate]) -> Result<InsertReport, StorageError> {
        let rows = project(employees, rates, &self.rate_fields);

        let mut tx = self.client.transaction()?;
        let report = insert_projection(&mut tx, &rows)?;
        tx.commit()?;

        Ok(report)
    }
}

#[test]
#[ignore = "needs STAFF_DUMP_TEST_DATABASE_URL pointing at a scratch PostgreSQL database"]
fn test_postgres_round_trip() {
    use crate::dump::parser::parse_dump;
    use rust_decimal::Decimal;
    use std::env;

    let url = env::var("STAFF_DUMP_TEST_DATABASE_URL").expect("STAFF_DUMP_TEST_DATABASE_URL not set");
    let client = Client::connect(&url, NoTls).unwrap();
    let mut sink = PostgresSink::new(client, RateFieldNames::default());

    sink.client.batch_execute("DROP TABLE IF EXISTS Department, SalaryStatement, Donation, Rate, Employee").unwrap();
    sink.create_schema().unwrap();
    sink.create_schema().unwrap();

    let dump = parse_dump("Employee\nid: 1\nname: Ann\nDepartment\nid: 4\nname: Eng\nDonation\nid: 2\namount: 120.50 USD\nRate\ndate: 2024-01\nsign: USD\nvalue: 1\n").unwrap();

    let first = sink.insert_all(&dump.employees, &dump.rates).unwrap();
    assert_eq!(first, InsertReport { inserted: 4, ignored: 0, skipped: 0 });

    let second = sink.insert_all(&dump.employees, &dump.rates).unwrap();
    assert_eq!(second, InsertReport { inserted: 0, ignored: 4, skipped: 0 });

    let row = sink.client.query_one("SELECT amount, currency, employee_id FROM Donation WHERE id = 2", &[]).unwrap();
    let amount: Decimal = row.get(0);
    let currency: String = row.get(1);
    let employee_id: i64 = row.get(2);
    assert_eq!(amount, Decimal::new(12050, 2));
    assert_eq!(currency, "USD");
    assert_eq!(employee_id, 1);

    // sub-records without ids get keys from the identity column, above the explicit ones
    let keyless = parse_dump("Employee\nid: 5\nname: Bo\nDepartment\nname: Ops\nStatement\namount: 1000\ndate: 2024-01\nDonation\namount: 50 USD\ndate: 2024-02\n").unwrap();
    let report = sink.insert_all(&keyless.employees, &keyless.rates).unwrap();
    assert_eq!(report, InsertReport { inserted: 4, ignored: 0, skipped: 0 });

    let row = sink.client.query_one("SELECT id, amount FROM Donation WHERE employee_id = 5", &[]).unwrap();
    let id: i64 = row.get(0);
    let amount: Decimal = row.get(1);
    assert_eq!(id, 3);
    assert_eq!(amount, Decimal::new(50, 0));

    let count: i64 = sink.client.query_one("SELECT count(*) FROM SalaryStatement WHERE employee_id = 5", &[]).unwrap().get(0);
    assert_eq!(count, 1);
}
