mod demo;

use classgen::jvm::class_file::{ClassFile, StackMapTable};
use classgen::jvm::code::decode_instructions;
use classgen::jvm::verifier::expand_stack_map_table;
use classgen::jvm::{self, Name};
use classgen::translate;

use clap::{value_parser, Arg, ArgMatches, Command};
use std::fs;
use std::io;
use std::path::PathBuf;

fn main() -> Result<(), translate::Error> {
    env_logger::init();

    let matches = Command::new("classgen")
        .version(clap::crate_version!())
        .about("Generate and inspect class files")
        .subcommand_required(true)
        .subcommand(
            Command::new("dump")
                .about("Print the constants, code, and stack map frames of a class file")
                .arg(
                    Arg::new("INPUT")
                        .help("Class file to read")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("demo")
                .about("Generate a sample class")
                .arg(
                    Arg::new("output")
                        .long("output")
                        .value_name("DIR")
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory under which the class file is written"),
                )
                .arg(
                    Arg::new("package")
                        .long("package")
                        .value_name("PACKAGE")
                        .default_value("demo")
                        .help("Package of the generated class (eg. `foo/bar`)"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("dump", args)) => dump(args),
        Some(("demo", args)) => demo(args),
        _ => Ok(()),
    }
}

fn path_argument<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a PathBuf, translate::Error> {
    args.get_one::<PathBuf>(name).ok_or_else(|| {
        let msg = format!("Missing argument '{}'", name);
        jvm::Error::IoError(io::Error::new(io::ErrorKind::InvalidInput, msg)).into()
    })
}

fn dump(args: &ArgMatches) -> Result<(), translate::Error> {
    let input = path_argument(args, "INPUT")?;
    log::info!("Reading '{}'", input.display());
    let bytes = fs::read(input).map_err(jvm::Error::IoError)?;
    let class = ClassFile::parse(&bytes)?;

    println!(
        "class {} extends {}",
        class.class_name(class.this_class).unwrap_or("?"),
        class.class_name(class.super_class).unwrap_or("?"),
    );
    println!(
        "  version: {}.{}",
        class.version.major_version, class.version.minor_version
    );
    println!("  flags: {:?}", class.access_flags);

    println!("Constant pool:");
    let mut index = 1;
    for constant in &class.constants {
        println!("  #{} = {:?}", index, constant);
        index += constant.width();
    }

    for field in &class.fields {
        println!(
            "{} {} ({:?})",
            class.utf8(field.descriptor_index).unwrap_or("?"),
            class.utf8(field.name_index).unwrap_or("?"),
            field.access_flags
        );
    }

    for method in &class.methods {
        println!();
        println!(
            "{}{} ({:?})",
            class.utf8(method.name_index).unwrap_or("?"),
            class.utf8(method.descriptor_index).unwrap_or("?"),
            method.access_flags
        );
        let code = match class.method_code(method)? {
            Some(code) => code,
            None => continue,
        };
        println!(
            "  max_stack = {}, max_locals = {}",
            code.max_stack, code.max_locals
        );
        for instruction in decode_instructions(&code.code_array.0)? {
            println!("{:?}", instruction);
        }

        if let Some(table) = class.find_attribute::<StackMapTable>(&code.attributes)? {
            println!("  StackMapTable:");
            let entry_frame = class.entry_frame(method)?;
            let frames = expand_stack_map_table(&entry_frame, &table)
                .map_err(jvm::Error::MalformedClassFile)?;
            for ((offset, frame), encoded) in frames.iter().zip(&table.0) {
                println!("    {}: {:?}", offset, encoded);
                println!("      locals = {:?}, stack = {:?}", frame.locals, frame.stack);
            }
        }
    }

    Ok(())
}

fn demo(args: &ArgMatches) -> Result<(), translate::Error> {
    let output = path_argument(args, "output")?;
    let package = args
        .get_one::<String>("package")
        .map_or("demo", String::as_str);

    let settings = translate::Settings::default();
    let class = demo::counter_class(package)?;
    let class_file = translate::translate_class(&settings, &class)?;

    let path = output.join(format!("{}.class", class.name.as_str()));
    log::info!("Writing '{}'", path.display());
    class_file
        .save_to_path(&path, true)
        .map_err(jvm::Error::IoError)?;

    Ok(())
}
