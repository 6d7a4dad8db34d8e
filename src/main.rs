use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::Result;

use xexasm::{evaluate_constant, Assembler, Assembly, Output};

/// xexasm is a multi-pass 6502 cross-assembler producing Atari binary-load (`.xex`) files.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.asm` file to compile
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a `.asm` file into a binary `.xex` file
    Compile {
        /// `.asm` file to compile
        name: PathBuf,
        /// Destination to output .xex file
        dest: Option<PathBuf>,
        /// Directory to search for `icl` files, may be repeated
        #[arg(short = 'I', long = "include")]
        include: Vec<PathBuf>,
        /// Scratch address for init stubs, e.g. `$0600`
        #[arg(long, value_parser = parse_address)]
        init_stub: Option<u16>,
        /// Print the segments written to the file
        #[arg(long)]
        segments: bool,
    },
    /// Check a `.asm` file without outputting binary
    Check {
        /// File to check
        name: PathBuf,
        /// Directory to search for `icl` files, may be repeated
        #[arg(short = 'I', long = "include")]
        include: Vec<PathBuf>,
    },
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    xexasm::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(xexasm::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    match args.command {
        Some(Command::Compile {
            name,
            dest,
            include,
            init_stub,
            segments,
        }) => {
            let dest = dest.unwrap_or_else(|| name.with_extension("xex"));
            compile(&name, &dest, include, init_stub, segments)
        }
        Some(Command::Check { name, include }) => {
            file_message(Green, "Checking", &name);
            let assembly = assembler(&name, include, None).assemble()?;
            message(Green, "Success", &summary(&assembly));
            Ok(())
        }
        None => {
            if let Some(path) = args.path {
                let dest = path.with_extension("xex");
                compile(&path, &dest, Vec::new(), None, false)
            } else {
                println!("\n~ xexasm v{VERSION} ~");
                println!("{SHORT_INFO}");
                std::process::exit(0);
            }
        }
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn assembler(name: &Path, include: Vec<PathBuf>, init_stub: Option<u16>) -> Assembler {
    let mut assembler = Assembler::new(name);
    for dir in include {
        assembler = assembler.search_path(dir);
    }
    match init_stub {
        Some(address) => assembler.init_stub(address),
        None => assembler,
    }
}

fn summary(assembly: &Assembly) -> String {
    format!(
        "{} passes, {} segments, {} bytes",
        assembly.passes,
        assembly.blocks.len(),
        assembly.image.len()
    )
}

/// The file is only written once the whole image has been built.
fn compile(
    name: &Path,
    dest: &Path,
    include: Vec<PathBuf>,
    init_stub: Option<u16>,
    segments: bool,
) -> Result<()> {
    file_message(MsgColor::Green, "Assembling", name);
    let assembly = assembler(name, include, init_stub).assemble()?;
    message(MsgColor::Green, "Finished", &summary(&assembly));
    if segments {
        Output::Normal.print_blocks(&assembly.blocks);
    }

    assembly.write(dest)?;
    file_message(MsgColor::Green, "Saved", dest);
    Ok(())
}

/// Command line addresses: `$hex`, `0xhex`, `%bin` or decimal.
fn parse_address(text: &str) -> std::result::Result<u16, String> {
    let text = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => format!("${hex}"),
        None => text.to_string(),
    };
    let value = evaluate_constant(&text).map_err(|e| e.to_string())?;
    u16::try_from(value).map_err(|_| format!("address ${value:X} is above $FFFF"))
}

const SHORT_INFO: &str = r"
Assembles 6502 source into binary load files for Atari 8-bit computers.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
