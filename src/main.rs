use std::fs;
use std::path::Path;
use std::process;

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

use clap::{Arg, App, ArgMatches};
use rpassword::prompt_password_stdout;
use walkdir::{WalkDir, DirEntry};

mod config;
use config::ConvertConfig;

mod dump;
use dump::Dump;
use dump::parser::parse_dump;

mod error;
use error::AppError;

mod integration;
use integration::StorageSink;
use integration::memory::MemoryStore;
use integration::postgresql::{connect, PostgresSink};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5432;
const DEFAULT_USER: &str = "postgres";

fn command_usage<'a, 'b>() -> App<'a, 'b> {
    App::new("staff-dump")
    .about("Loads employee and exchange rate dumps into PostgreSQL")
    .arg(
        Arg::with_name("dump")
            .required(true)
            .takes_value(true)
            .help("A dump file, or a directory searched recursively for .txt dumps")
    )
    .arg(
        Arg::with_name("config")
            .long("config")
            .takes_value(true)
            .default_value("config/convert.toml")
            .help("Location of the configuration file (connection settings, rate field names)")
    )
    .arg(
        Arg::with_name("create")
            .short("c")
            .long("create")
            .takes_value(false)
            .help("Create the tables before inserting. Existing tables are left alone.")
    )
    .arg(
        Arg::with_name("dry-run")
            .long("dry-run")
            .takes_value(false)
            .help("Parse and load into an in-memory store only; no database connection is made")
    )
    .arg(
        Arg::with_name("host")
            .short("h")
            .long("host")
            .takes_value(true)
            .help("The hostname of the PostgreSQL server to connect to. Default: localhost")
    )
    .arg(
        Arg::with_name("database")
            .short("b")
            .long("database")
            .takes_value(true)
            .help("The database to USE on the PostgreSQL server.")
    )
    .arg(
        Arg::with_name("port")
            .short("p")
            .long("port")
            .takes_value(true)
            .help("The port to connect to the PostgreSQL server on. Default: 5432")
    )
    .arg(
        Arg::with_name("user")
            .short("u")
            .long("user")
            .takes_value(true)
            .help("The user to connect to the PostgreSQL server with. Default: postgres")
    )
}

fn report_filter(entry: &DirEntry) -> bool {
    if entry.file_type().is_dir() {
        return true;
    }

    match entry.file_name().to_str() {
        Some(name) => name.to_lowercase().ends_with(".txt"),
        None => false,
    }
}

/// A plain file is taken as is; a directory contributes every `.txt` below it, sorted by path.
fn collect_dumps(target: &str) -> Result<Vec<String>, AppError> {
    if Path::new(target).is_file() {
        return Ok(vec![target.to_owned()]);
    }

    let mut file_queue = Vec::new();
    for entry in WalkDir::new(target).into_iter().filter_entry(|e| report_filter(e)) {
        let entry = entry?;
        if entry.file_type().is_file() {
            file_queue.push(entry.path().to_string_lossy().into_owned());
        }
    }
    file_queue.sort();

    Ok(file_queue)
}

/// Parses every file before anything is persisted.
fn read_dumps(paths: &[String]) -> Result<Dump, AppError> {
    let mut result = Dump::default();

    for path in paths {
        let text = fs::read_to_string(path).map_err(|source| AppError::Io { path: path.to_owned(), source })?;
        let parsed = parse_dump(&text).map_err(|source| AppError::Parse { path: path.to_owned(), source })?;

        info!("{}: {} employees, {} rates", path, parsed.employees.len(), parsed.rates.len());
        result.merge(parsed);
    }

    Ok(result)
}

fn persist(sink: &mut dyn StorageSink, dump: &Dump, create: bool) -> Result<(), AppError> {
    if create {
        info!("Creating tables.");
        sink.create_schema()?;
    }

    let report = sink.insert_all(&dump.employees, &dump.rates)?;
    info!("Rows: {}", report);

    Ok(())
}

fn postgres_sink(matches: &ArgMatches, config: ConvertConfig) -> Result<PostgresSink, AppError> {
    let settings = config.postgres;

    let host = matches.value_of("host").map(str::to_owned)
        .or(settings.host)
        .unwrap_or_else(|| DEFAULT_HOST.to_owned());
    let user = matches.value_of("user").map(str::to_owned)
        .or(settings.user)
        .unwrap_or_else(|| DEFAULT_USER.to_owned());
    let port = match matches.value_of("port") {
        Some(p) => p.parse::<u16>().map_err(|_| AppError::InvalidArgument(format!("Invalid port specified: '{}'", p)))?,
        None => settings.port.unwrap_or(DEFAULT_PORT),
    };
    let dbname = match matches.value_of("database").map(str::to_owned).or(settings.dbname) {
        Some(d) => d,
        None => {
            return Err(AppError::InvalidArgument(
                "Must specify postgres dbname either by command line argument or via config".to_owned()
            ));
        }
    };

    info!("Connecting to PostgreSQL {}:{} as user '{}'.", host, port, user);
    let password = match settings.password {
        Some(p) => p,
        None => prompt_password_stdout("Password: ").map_err(|source| AppError::Io { path: "stdin".to_owned(), source })?,
    };

    let client = connect(&host, port, &user, &dbname, &password)?;
    Ok(PostgresSink::new(client, config.rate))
}

fn run(matches: &ArgMatches) -> Result<(), AppError> {
    let config_path = matches.value_of("config").unwrap_or("config/convert.toml");
    let config = ConvertConfig::load(config_path)?;

    let target = matches.value_of("dump").unwrap_or_default();
    let paths = collect_dumps(target)?;
    if paths.is_empty() {
        warn!("No dumps found under {}", target);
        return Ok(());
    }
    info!("Found {} dump file(s).", paths.len());

    let dump = read_dumps(&paths)?;
    let create = matches.is_present("create");

    if matches.is_present("dry-run") {
        let mut store = MemoryStore::new(config.rate);
        persist(&mut store, &dump, true)?;
        info!(
            "Dry run: {} employees, {} departments, {} salary statements, {} donations, {} rates",
            store.employees().len(), store.departments().len(), store.statements().len(),
            store.donations().len(), store.rates().len()
        );
        return Ok(());
    }

    let mut sink = postgres_sink(matches, config)?;
    persist(&mut sink, &dump, create)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = command_usage().get_matches();

    if let Err(e) = run(&matches) {
        error!("{}", e);
        process::exit(1);
    }
}

#[test]
fn test_read_dumps_merges_in_order() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("2024");
    fs::create_dir(&nested).unwrap();

    let mut first = fs::File::create(dir.path().join("a.txt")).unwrap();
    writeln!(first, "Employee\nid: 1\nRate\ndate: 2024-01\nsign: EUR\nvalue: 1.1").unwrap();
    let mut second = fs::File::create(nested.join("b.TXT")).unwrap();
    writeln!(second, "Employee\nid: 2").unwrap();
    fs::write(dir.path().join("notes.md"), "Employee\nid: 3\n").unwrap();

    let paths = collect_dumps(dir.path().to_str().unwrap()).unwrap();
    assert_eq!(paths.len(), 2);

    let dump = read_dumps(&paths).unwrap();
    let ids: Vec<_> = dump.employees.iter().map(|e| e.id().unwrap()).collect();
    assert_eq!(ids, vec!["2", "1"]);
    assert_eq!(dump.rates.len(), 1);
}

#[test]
fn test_read_dumps_aborts_on_structural_error() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.txt");
    let bad = dir.path().join("bad.txt");
    fs::write(&good, "Employee\nid: 1\n").unwrap();
    fs::write(&bad, "Donation\nid: 1\n").unwrap();

    let paths = vec![good.to_string_lossy().into_owned(), bad.to_string_lossy().into_owned()];
    match read_dumps(&paths) {
        Err(AppError::Parse { path, .. }) => assert!(path.ends_with("bad.txt")),
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn test_single_file_target() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dump.dat");
    fs::write(&path, "Employee\nid: 1\n").unwrap();

    let target = path.to_str().unwrap();
    assert_eq!(collect_dumps(target).unwrap(), vec![target.to_owned()]);
}
