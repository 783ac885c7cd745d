extern crate clap;
extern crate constdb;
extern crate constdbgen;
extern crate env_logger;
extern crate failure;
#[macro_use]
extern crate log;
extern crate tempfile;

use clap::{App, Arg, ArgMatches, SubCommand};
use constdb::{LoadOption, Result, CDB};
use constdbgen::{generate, GenSpec};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use tempfile::NamedTempFile;

fn gen(matches: &ArgMatches) -> Result<i32> {
    let output = matches.value_of("output").unwrap();
    let spec = GenSpec {
        count: matches.value_of("count").unwrap().parse()?,
        seed: matches.value_of("seed").unwrap().parse()?,
        value_size: matches.value_of("value-size").unwrap().parse()?,
    };

    // build next to the destination, then atomically replace it; readers of
    // a previous generation never observe a partial file
    let dir = match Path::new(output).parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    generate(tmp.as_file_mut(), &spec)?;
    tmp.persist(output)?;

    info!("wrote {} records to {}", spec.count, output);
    Ok(0)
}

fn get(matches: &ArgMatches) -> Result<i32> {
    let db = PathBuf::from(matches.value_of("db").unwrap());
    let lopt = if matches.is_present("heap") {
        LoadOption::HEAP
    } else {
        LoadOption::MMAP
    };

    let cdb = CDB::load(db.into(), lopt)?;
    match cdb.get(matches.value_of("key").unwrap().as_bytes())? {
        Some(val) => {
            io::stdout().write_all(&val)?;
            Ok(0)
        }
        None => Ok(1),
    }
}

fn run() -> Result<i32> {
    let matches = App::new("constdbgen")
        .about("generate and query constant database files")
        .subcommand(
            SubCommand::with_name("gen")
                .about("write a database of synthetic records")
                .arg(
                    Arg::with_name("output")
                        .required(true)
                        .help("path of the database to write"),
                )
                .arg(
                    Arg::with_name("count")
                        .short("n")
                        .long("count")
                        .takes_value(true)
                        .default_value("1000")
                        .help("number of records"),
                )
                .arg(
                    Arg::with_name("seed")
                        .long("seed")
                        .takes_value(true)
                        .default_value("0")
                        .help("seed for the value bytes"),
                )
                .arg(
                    Arg::with_name("value-size")
                        .long("value-size")
                        .takes_value(true)
                        .default_value("32")
                        .help("bytes per value"),
                ),
        )
        .subcommand(
            SubCommand::with_name("get")
                .about("look one key up and print its value")
                .arg(Arg::with_name("db").required(true).help("database file"))
                .arg(Arg::with_name("key").required(true).help("key to look up"))
                .arg(
                    Arg::with_name("heap")
                        .long("heap")
                        .help("load onto the heap instead of mmap"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        ("gen", Some(m)) => gen(m),
        ("get", Some(m)) => get(m),
        _ => {
            eprintln!("{}", matches.usage());
            Ok(2)
        }
    }
}

fn main() {
    env_logger::init();

    match run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            error!("{}", err);
            process::exit(64);
        }
    }
}
