//! Driver that compiles a typed syntax tree and dumps the pipeline stages.
//!
//! The tree is read as JSON, from a file or stdin, and compiled against a
//! recording host, so no C compiler is needed.
//!
//! # Usage
//!
//! ```bash
//! # IR and generated C of a tree produced by a front end
//! ravel-dump tree.json --print-ir --emit-c
//!
//! # CFG and dominators, with pipeline tracing
//! RUST_LOG=ravel=debug ravel-dump tree.json --print-cfg --print-dom
//! ```

use clap::Parser;
use ravel::codegen::RecordingHost;
use ravel::{CompilationSession, Compiler, CompilerOptions, SyntaxTree};
use std::fs;
use std::io::{self, Read};

#[derive(Parser)]
#[command(
    name = "ravel-dump",
    about = "Compile a typed syntax tree and dump IR, CFG and C",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// JSON syntax tree; stdin when omitted
    input: Option<String>,

    /// Print the linearized IR
    #[arg(long = "print-ir")]
    print_ir: bool,

    /// Print the control flow graph of every proc
    #[arg(long = "print-cfg")]
    print_cfg: bool,

    /// Print the immediate dominators of every proc
    #[arg(long = "print-dom")]
    print_dom: bool,

    /// Print the generated C unit
    #[arg(long = "emit-c")]
    emit_c: bool,

    /// Write the generated C unit to a file
    #[arg(short, long, value_name = "FILE")]
    output: Option<String>,

    /// Prefix of generated function names
    #[arg(long, default_value = ravel::config::DEFAULT_FUNCTION_PREFIX)]
    prefix: String,

    /// Leave the C preamble out of the unit
    #[arg(long = "no-preamble")]
    no_preamble: bool,

    /// Print session statistics to stderr
    #[arg(long)]
    stats: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let text = match &cli.input {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let tree = SyntaxTree::from_json(&text)?;

    let mut options = CompilerOptions::new().with_function_prefix(cli.prefix.clone());
    if cli.no_preamble {
        options = options.without_preamble();
    }

    let arena = bumpalo::Bump::new();
    let session = CompilationSession::new(&arena);
    let compiler = Compiler::new(&session, options);
    let mut host = RecordingHost::new();
    let root = host.root();
    let compiled = compiler.compile(&tree, &mut host, root)?;

    if cli.print_ir {
        print!("{}", compiled.module.dump());
    }
    for proc in compiled.module.procs() {
        if cli.print_cfg {
            if let Some(cfg) = &proc.cfg {
                println!("CFG for Proc%{}", proc.id.0);
                print!("{}", cfg);
            }
        }
        if cli.print_dom {
            if let Some(dominators) = &proc.dominators {
                println!("Dominators for Proc%{}", proc.id.0);
                print!("{}", dominators);
            }
        }
    }
    if cli.emit_c {
        print!("{}", compiled.unit.source);
    }
    if let Some(path) = &cli.output {
        fs::write(path, &compiled.unit.source)?;
        log::info!("wrote {} bytes to {}", compiled.unit.source.len(), path);
    }
    if cli.stats {
        eprint!("{}", session.stats());
    }
    Ok(())
}
