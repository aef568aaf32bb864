use frameabi::abi::{self, CallArranger, FunctionDescriptor, LinkerOptions, MethodType, Platform};
use frameabi::jvm::class_file::{
    ClassConstantIndex, ConstantIndex, StackMapFrame, StackMapTable, UnsetFieldIndices,
};
use frameabi::jvm::code::RawOffsets;
use frameabi::jvm::verifier::{
    ConstantResolver, InitialFrame, MethodContext, StackMapDecoder, VerificationType,
};
use frameabi::jvm::{self, *};

use clap::{crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;

#[derive(Debug)]
enum CliError {
    Jvm(jvm::Error),
    Abi(abi::Error),
    Io(io::Error),
    Usage(String),
}

impl From<jvm::Error> for CliError {
    fn from(err: jvm::Error) -> CliError {
        CliError::Jvm(err)
    }
}

impl From<abi::Error> for CliError {
    fn from(err: abi::Error) -> CliError {
        CliError::Abi(err)
    }
}

impl From<io::Error> for CliError {
    fn from(err: io::Error) -> CliError {
        CliError::Io(err)
    }
}

/// Constants of a class file we don't have
///
/// Indices from the stack map print as `#N`. Classes mentioned by the method descriptor get
/// indices the table itself never uses, counting down from the top of the index space, so they
/// print by name.
struct SymbolicConstants {
    reserved: HashSet<u16>,
    by_name: HashMap<String, u16>,
    by_index: HashMap<u16, String>,
    next: u16,
}

impl SymbolicConstants {
    fn for_table(table: &StackMapTable) -> SymbolicConstants {
        let mut reserved = HashSet::new();
        for frame in &table.0 {
            reserve_frame(frame, &mut reserved);
        }
        SymbolicConstants {
            reserved,
            by_name: HashMap::new(),
            by_index: HashMap::new(),
            next: u16::MAX,
        }
    }

    /// Largest index at or below `next` that the table doesn't use (0 is never valid)
    fn allocate(&mut self) -> Option<u16> {
        while self.next > 0 {
            let candidate = self.next;
            self.next -= 1;
            if !self.reserved.contains(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

fn reserve_type(
    verification_type: &VerificationType<ClassConstantIndex, u16>,
    reserved: &mut HashSet<u16>,
) {
    if let VerificationType::Object(class) = verification_type {
        reserved.insert((class.0).0);
    }
}

fn reserve_frame(frame: &StackMapFrame, reserved: &mut HashSet<u16>) {
    match frame {
        StackMapFrame::SameLocalsNoStack { .. } | StackMapFrame::ChopLocalsNoStack { .. } => (),
        StackMapFrame::SameLocalsOneStack { stack, .. } => reserve_type(stack, reserved),
        StackMapFrame::AppendLocalsNoStack { locals, .. } => {
            locals.iter().for_each(|local| reserve_type(local, reserved))
        }
        StackMapFrame::Full { locals, stack, .. } => {
            locals
                .iter()
                .chain(stack.iter())
                .for_each(|item| reserve_type(item, reserved))
        }
        StackMapFrame::EarlyLarval { unset_fields, base } => {
            for field in unset_fields {
                reserved.insert((field.class.0).0);
            }
            reserve_frame(base, reserved);
        }
    }
}

impl ConstantResolver for SymbolicConstants {
    type Class = String;
    type Field = String;

    fn resolve_class(&self, index: ClassConstantIndex) -> Option<String> {
        let raw = (index.0).0;
        match self.by_index.get(&raw) {
            Some(name) => Some(name.clone()),
            None => Some(format!("#{}", raw)),
        }
    }

    fn resolve_field(&self, indices: UnsetFieldIndices) -> Option<String> {
        Some(format!("#{}.#{}", (indices.class.0).0, (indices.name_and_type.0).0))
    }

    fn class_index(&mut self, class: &String) -> Result<ClassConstantIndex, jvm::Error> {
        if let Some(raw) = class.strip_prefix('#').and_then(|raw| raw.parse().ok()) {
            return Ok(ClassConstantIndex(ConstantIndex(raw)));
        }
        if let Some(index) = self.by_name.get(class) {
            return Ok(ClassConstantIndex(ConstantIndex(*index)));
        }
        let index = self.allocate().ok_or_else(|| {
            jvm::Error::BadDescriptor(format!("No constant index left for class {}", class))
        })?;
        log::debug!("Class {} stands in for constant #{}", class, index);
        self.by_name.insert(class.clone(), index);
        self.by_index.insert(index, class.clone());
        Ok(ClassConstantIndex(ConstantIndex(index)))
    }

    fn field_indices(&mut self, field: &String) -> Result<UnsetFieldIndices, jvm::Error> {
        Err(jvm::Error::BadDescriptor(format!("No constant indices for field {}", field)))
    }
}

fn decode_stack_map_command(matches: &ArgMatches) -> Result<(), CliError> {
    let file = matches
        .get_one::<String>("FILE")
        .ok_or_else(|| CliError::Usage(String::from("Missing input file")))?;
    log::info!("Reading stack map table from '{}'", file);
    let bytes = fs::read(file)?;

    if matches.get_flag("raw") {
        let table = StackMapTable::read(&bytes)?;
        for (index, frame) in table.0.iter().enumerate() {
            println!("{:>4}: {:?}", index, frame);
        }
        return Ok(());
    }

    let descriptor = matches
        .get_one::<String>("descriptor")
        .ok_or_else(|| CliError::Usage(String::from("Decoding frames needs --descriptor (or use --raw)")))?;
    let class = matches
        .get_one::<String>("class")
        .map_or("Main", |class| class.as_str());
    let method = matches
        .get_one::<String>("method")
        .map_or("run", |method| method.as_str());
    let access_flags = if matches.get_flag("static") {
        MethodAccessFlags::STATIC
    } else {
        MethodAccessFlags::PUBLIC
    };

    let context = MethodContext::new(
        BinaryName::from_str(class).map_err(jvm::Error::BadDescriptor)?,
        UnqualifiedName::from_str(method).map_err(jvm::Error::BadDescriptor)?,
        access_flags,
        MethodDescriptor::parse(descriptor).map_err(jvm::Error::BadDescriptor)?,
    );
    let initial = context.initial_frame::<u16>();
    let initial = InitialFrame {
        locals: initial
            .locals
            .iter()
            .map(|local| local.map(|class| class.class_constant_name(), |offset| *offset))
            .collect(),
        unset_fields: vec![],
    };

    let table = StackMapTable::read(&bytes)?;
    let mut constants = SymbolicConstants::for_table(&table);
    let frames =
        StackMapDecoder::new(&initial, &mut RawOffsets, &mut constants)?.decode_table(&table)?;
    for frame in frames {
        print!(
            "{:>5} (type {:>3}): locals {:?} stack {:?}",
            frame.target, frame.frame_type, frame.locals, frame.stack
        );
        if frame.unset_fields.is_empty() {
            println!();
        } else {
            println!(" unset {:?}", frame.unset_fields);
        }
    }
    Ok(())
}

fn arrange_command(matches: &ArgMatches) -> Result<(), CliError> {
    let descriptor = matches
        .get_one::<String>("DESCRIPTOR")
        .ok_or_else(|| CliError::Usage(String::from("Missing function descriptor")))?;
    let platform_name = matches
        .get_one::<String>("platform")
        .map_or("linux-aarch64", |name| name.as_str());
    let platform = Platform::by_name(platform_name).ok_or_else(|| {
        let known: Vec<&str> = Platform::ALL.iter().map(|platform| platform.name).collect();
        CliError::Usage(format!(
            "Unknown platform '{}' (expected one of {})",
            platform_name,
            known.join(", ")
        ))
    })?;
    let options = LinkerOptions {
        first_variadic_index: matches.get_one::<usize>("variadic-start").copied(),
    };
    let for_upcall = matches.get_flag("upcall");

    let descriptor = FunctionDescriptor::parse(descriptor).map_err(abi::Error::InvalidLayout)?;
    let method_type = MethodType::from_descriptor(&descriptor)?;
    let bindings =
        CallArranger::new(platform).get_bindings(&method_type, &descriptor, for_upcall, &options)?;
    let sequence = &bindings.calling_sequence;

    println!(
        "{} {} on {}",
        if for_upcall { "upcall" } else { "downcall" },
        sequence.descriptor.render(),
        platform.name
    );
    if bindings.is_in_memory_return {
        println!("  return value passed in memory");
    }
    for (index, arguments) in sequence.argument_bindings.iter().enumerate() {
        let rendered: Vec<String> = arguments.iter().map(|binding| binding.to_string()).collect();
        let variadic = match sequence.first_variadic {
            Some(first) if index >= first => " (variadic)",
            _ => "",
        };
        println!("  argument {}{}: {}", index, variadic, rendered.join("; "));
    }
    if sequence.has_return_bindings() {
        let rendered: Vec<String> = sequence
            .return_bindings
            .iter()
            .map(|binding| binding.to_string())
            .collect();
        println!("  return: {}", rendered.join("; "));
    }
    Ok(())
}

fn main() -> Result<(), CliError> {
    env_logger::init();

    let matches = Command::new("frameabi")
        .version(crate_version!())
        .author("Alec Theriault <alec.theriault@gmail.com>")
        .about("Inspect stack map tables and native call arrangements")
        .subcommand_required(true)
        .subcommand(
            Command::new("decode-stack-map")
                .about("Decode the body of a `StackMapTable` attribute")
                .arg(
                    Arg::new("FILE")
                        .help("File containing the attribute body")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("raw")
                        .long("raw")
                        .action(ArgAction::SetTrue)
                        .help("Print frames as stored, without resolving them"),
                )
                .arg(
                    Arg::new("descriptor")
                        .long("descriptor")
                        .value_name("METHOD_DESCRIPTOR")
                        .help("Descriptor of the method (eg. `(IJ)V`)"),
                )
                .arg(
                    Arg::new("class")
                        .long("class")
                        .value_name("CLASS_NAME")
                        .help("Class declaring the method (eg. `foo/bar/Baz`)"),
                )
                .arg(
                    Arg::new("method")
                        .long("method")
                        .value_name("METHOD_NAME")
                        .help("Name of the method (`<init>` for constructors)"),
                )
                .arg(
                    Arg::new("static")
                        .long("static")
                        .action(ArgAction::SetTrue)
                        .help("The method is static"),
                ),
        )
        .subcommand(
            Command::new("arrange")
                .about("Show how a native call passes its arguments")
                .arg(
                    Arg::new("DESCRIPTOR")
                        .help("Layouts of the call (eg. `(I[JJ]A*D)F`)")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("platform")
                        .long("platform")
                        .value_name("PLATFORM")
                        .help("Calling convention (default `linux-aarch64`)"),
                )
                .arg(
                    Arg::new("variadic-start")
                        .long("variadic-start")
                        .value_name("INDEX")
                        .value_parser(value_parser!(usize))
                        .help("Index of the first variadic argument"),
                )
                .arg(
                    Arg::new("upcall")
                        .long("upcall")
                        .action(ArgAction::SetTrue)
                        .help("Arrange a call from native code instead of into it"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("decode-stack-map", matches)) => decode_stack_map_command(matches),
        Some(("arrange", matches)) => arrange_command(matches),
        _ => Err(CliError::Usage(String::from("Unknown command"))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn object(index: u16) -> VerificationType<ClassConstantIndex, u16> {
        VerificationType::Object(ClassConstantIndex(ConstantIndex(index)))
    }

    #[test]
    fn named_classes_avoid_indices_in_the_table() {
        let table = StackMapTable(vec![StackMapFrame::EarlyLarval {
            unset_fields: vec![],
            base: Box::new(StackMapFrame::Full {
                offset_delta: 0,
                locals: vec![object(65535)],
                stack: vec![object(65533)],
            }),
        }]);
        let mut constants = SymbolicConstants::for_table(&table);
        let string = constants.class_index(&String::from("java/lang/String")).unwrap();
        let root = constants.class_index(&String::from("java/lang/Object")).unwrap();
        assert_eq!(string, ClassConstantIndex(ConstantIndex(65534)));
        assert_eq!(root, ClassConstantIndex(ConstantIndex(65532)));
        assert_eq!(
            constants.class_index(&String::from("java/lang/String")).unwrap(),
            string
        );

        assert_eq!(constants.resolve_class(string), Some(String::from("java/lang/String")));
        assert_eq!(
            constants.resolve_class(ClassConstantIndex(ConstantIndex(65535))),
            Some(String::from("#65535"))
        );
    }

    #[test]
    fn decoded_frames_keep_raw_and_named_classes_apart() {
        let table = StackMapTable(vec![
            StackMapFrame::SameLocalsNoStack { offset_delta: 0 },
            StackMapFrame::Full {
                offset_delta: 3,
                locals: vec![object(65535)],
                stack: vec![],
            },
        ]);
        let initial = InitialFrame {
            locals: vec![VerificationType::Object(String::from("java/lang/String"))],
            unset_fields: vec![],
        };
        let mut constants = SymbolicConstants::for_table(&table);
        let frames = StackMapDecoder::new(&initial, &mut RawOffsets, &mut constants)
            .unwrap()
            .decode_table(&table)
            .unwrap();
        assert_eq!(
            frames[0].locals,
            vec![VerificationType::Object(String::from("java/lang/String"))]
        );
        assert_eq!(frames[1].target, 4);
        assert_eq!(
            frames[1].locals,
            vec![VerificationType::Object(String::from("#65535"))]
        );
    }

    #[test]
    fn running_out_of_indices() {
        let mut constants = SymbolicConstants::for_table(&StackMapTable(vec![]));
        constants.reserved = (1..=u16::MAX).collect();
        assert!(constants.class_index(&String::from("Foo")).is_err());
        assert_eq!(
            constants.class_index(&String::from("#7")).unwrap(),
            ClassConstantIndex(ConstantIndex(7))
        );
    }
}
