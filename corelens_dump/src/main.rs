//! A program for converting a type from a binary's debug info to its exact
//! native layout.
//!
//! The output is json: the session's layout table plus the handle of the
//! requested root type. The binary must carry DWARF debug info.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

use std::{fs, process};

use clap::{App, Arg};
use corelens_data_type::{LayoutId, LayoutTable};
use corelens_layout::{convert, DwarfSource, Session};
use log::LevelFilter;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct DumpOutput<'a> {
    root: LayoutId,
    table: &'a LayoutTable,
}

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let matches = App::new("corelens_dump")
        .about("Outputs a type's native memory layout as json")
        .arg(
            Arg::with_name("binary")
                .value_name("FILE")
                .help("path to a binary with DWARF debug info")
                .required(true),
        )
        .arg(
            Arg::with_name("type")
                .short("t")
                .long("type")
                .value_name("NAME")
                .help("name of the root type to convert")
                .required(true),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .value_name("FILE")
                .help("path to the output JSON file"),
        )
        .get_matches();

    let binary_path = matches.value_of("binary").unwrap();
    let type_name = matches.value_of("type").unwrap();

    let source = DwarfSource::load(binary_path).unwrap_or_else(|error| {
        eprintln!("Error while parsing {}: {}", binary_path, error);
        process::exit(1);
    });

    let root = source.find_type_node(type_name).unwrap_or_else(|| {
        eprintln!("No type named {} found in {}", type_name, binary_path);
        process::exit(1);
    });

    let session = Session::with_pointer_size(source.pointer_size());
    let root_id = convert(&source, &session, root).unwrap_or_else(|error| {
        eprintln!("Error while converting {}: {}", type_name, error);
        process::exit(1);
    });

    let output = DumpOutput {
        root: root_id,
        table: session.table(),
    };
    let layout_json = serde_json::to_string_pretty(&output).unwrap_or_else(|error| {
        eprintln!("Error while serializing: {}", error);
        process::exit(1);
    });

    match matches.value_of("output") {
        Some(output_filename) => {
            fs::write(output_filename, &layout_json).unwrap_or_else(|error| {
                eprintln!("Error while writing {}: {}", output_filename, error);
                process::exit(1);
            });
        }
        None => println!("{}", layout_json),
    }
}
