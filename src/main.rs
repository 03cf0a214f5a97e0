use std::borrow::Cow;
use std::env;
use std::fs;
use std::io;
use std::io::{BufWriter, Write};
use std::process;

use dwarf_decode::dump::{dump, Flags};
use dwarf_decode::{DwarfData, Sections};
use object::{Object, ObjectSection};
use regex::bytes::Regex;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const WASM_MAGIC: &[u8] = b"\0asm";

fn print_usage(opts: &getopts::Options) -> ! {
    let program = env::args().next().unwrap_or_else(|| "dwarf-decode".to_string());
    let brief = format!("Usage: {} <options> <file>...", program);
    write!(&mut io::stderr(), "{}", opts.usage(&brief)).ok();
    process::exit(1);
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_logging();

    let mut opts = getopts::Options::new();
    opts.optflag("a", "", "print .debug_abbrev section");
    opts.optflag("s", "", "print .debug_str section");
    opts.optflag("i", "", "print .debug_info section");
    opts.optflag("l", "", "print .debug_line section");
    opts.optflag("p", "", "print .debug_pubnames and .debug_gnu_pubnames sections");
    opts.optflag("y", "", "print .debug_pubtypes and .debug_gnu_pubtypes sections");
    opts.optflag("r", "", "print .debug_aranges section");
    opts.optflag("R", "", "print .debug_ranges section");
    opts.optflag("G", "", "show global die offsets");
    opts.optopt(
        "u",
        "match-units",
        "print compilation units whose output matches a regex",
        "REGEX",
    );
    opts.optopt(
        "",
        "address-size",
        "address size to use when no compile unit states one",
        "N",
    );

    let matches = match opts.parse(env::args().skip(1)) {
        Ok(m) => m,
        Err(e) => {
            writeln!(&mut io::stderr(), "{}\n", e).ok();
            print_usage(&opts);
        }
    };
    if matches.free.is_empty() {
        print_usage(&opts);
    }

    let mut flags = Flags {
        abbrev: matches.opt_present("a"),
        strings: matches.opt_present("s"),
        info: matches.opt_present("i"),
        line: matches.opt_present("l"),
        pubnames: matches.opt_present("p"),
        pubtypes: matches.opt_present("y"),
        aranges: matches.opt_present("r"),
        ranges: matches.opt_present("R"),
        ..Flags::default()
    };
    let any_selected = flags.abbrev
        || flags.strings
        || flags.info
        || flags.line
        || flags.pubnames
        || flags.pubtypes
        || flags.aranges
        || flags.ranges;
    if !any_selected {
        flags = Flags::all();
    }
    // Cosmetic flags like -G must be set explicitly.
    flags.goff = matches.opt_present("G");
    flags.match_units = matches.opt_str("u").map(|r| match Regex::new(&r) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Invalid regular expression {}: {}", r, e);
            process::exit(1);
        }
    });
    let address_size = matches.opt_str("address-size").map(|n| match n.parse::<u8>() {
        Ok(n) => n,
        Err(e) => {
            eprintln!("Invalid address size {}: {}", n, e);
            process::exit(1);
        }
    });

    let mut failed = false;
    for file_path in &matches.free {
        if matches.free.len() != 1 {
            println!("# {}", file_path);
        }
        if let Err(err) = dump_file(file_path, &flags, address_size) {
            eprintln!("Failed to dump '{}': {}", file_path, err);
            failed = true;
        }
    }
    if failed {
        process::exit(1);
    }
}

fn dump_file(path: &str, flags: &Flags, address_size: Option<u8>) -> Result<(), BoxError> {
    let input = fs::read(path)?;

    let data = if input.starts_with(WASM_MAGIC) {
        let module = wasm_edit::parser::decode(&input)
            .map_err(|err| format!("failed to parse Wasm module: {}", err))?;
        let module = wasm_edit::traverse::WasmModule::new(std::sync::Arc::new(module));

        // Load a custom section, or nothing if the module lacks it.
        let sections = Sections::load(
            |name| -> Result<Cow<[u8]>, BoxError> {
                Ok(match module.get_custom_section(name) {
                    Some(bytes) => Cow::from(bytes),
                    None => Cow::Borrowed(&[][..]),
                })
            },
            address_size.unwrap_or(4),
        )?;
        decode_sections(&sections, gimli::RunTimeEndian::Little)?
    } else {
        let file = object::File::parse(&*input)?;
        let endian = if file.is_little_endian() {
            gimli::RunTimeEndian::Little
        } else {
            gimli::RunTimeEndian::Big
        };
        let default_size = if file.is_64() { 8 } else { 4 };

        let sections = Sections::load(
            |name| -> Result<Cow<[u8]>, BoxError> {
                match file.section_by_name(name) {
                    Some(section) => Ok(section.uncompressed_data()?),
                    None => Ok(Cow::Borrowed(&[][..])),
                }
            },
            address_size.unwrap_or(default_size),
        )?;
        decode_sections(&sections, endian)?
    };

    let w = &mut BufWriter::new(io::stdout());
    dump(w, &data, flags)?;
    Ok(())
}

fn decode_sections(
    sections: &Sections<Cow<[u8]>>,
    endian: gimli::RunTimeEndian,
) -> dwarf_decode::Result<DwarfData> {
    let sections = sections.borrow(|section| gimli::EndianSlice::new(&**section, endian));
    dwarf_decode::decode(&sections)
}
