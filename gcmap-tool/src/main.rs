use std::path::PathBuf;

use clap::Parser;
use gcmap::{serialize::SerializableMethod, CompiledMethod};

#[derive(Parser)]
/// Tool for inspecting gcmap reference maps.
struct Args {
    /// Print the input method before compiling it.
    #[clap(short = 'v')]
    verbose: bool,

    /// Also dump the packed bytes of every table entry.
    #[clap(long)]
    bytes: bool,

    /// Input file containing a bincode-encoded SerializableMethod.
    input: PathBuf,
}

fn main() {
    pretty_env_logger::init();
    let args = Args::parse();

    let input = std::fs::read(&args.input).expect("could not read input file");
    let method: SerializableMethod =
        bincode::deserialize(&input).expect("could not deserialize input file");

    if args.verbose {
        println!("{method}");
    }

    let compiled = match method.compile() {
        Ok(compiled) => compiled,
        Err(e) => {
            panic!("Reference map construction failed: {e}");
        }
    };

    print!("{compiled}");
    if args.bytes {
        print_bytes(&compiled);
    }
}

fn print_bytes(compiled: &CompiledMethod) {
    let maps = compiled.reference_maps();
    println!(
        "table: {} frame bit(s), {} register bit(s) per entry",
        maps.frame_bits(),
        maps.register_bits()
    );
    for view in maps.iter() {
        let hex = |bytes: &[u8]| {
            bytes
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ")
        };
        println!(
            "  {:#06x}: {} | {}",
            view.pc(),
            hex(view.frame_bytes()),
            hex(view.register_bytes())
        );
    }
}
