use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use silk::compiler::Compiler;
use silk::config::CompilerOptions;
use silk::diagnostic::ansi::AnsiRenderer;
use silk::diagnostic::{Diagnostic, json};
use silk::function::Arity;
use silk::host::HostRegistry;
use silk::program::CompiledProgram;
use silk::runtime::{Host, Runtime};
use silk::variable::Variable;

#[derive(Parser, Debug)]
#[command(name = "silk", version)]
#[command(about = "Compile, run and inspect Silk scripts")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Report diagnostics as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Disable coloured diagnostics
    #[arg(long = "no-color", global = true)]
    no_color: bool,

    /// JSON file with compiler options
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Errors tolerated before compilation stops
    #[arg(long = "max-errors", global = true)]
    max_errors: Option<usize>,

    /// Omit the source line map from compiled output
    #[arg(long = "no-line-numbers", global = true)]
    no_line_numbers: bool,

    /// Compile without the built-in function catalogue
    #[arg(long = "no-internals", global = true)]
    no_internals: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a source file to a program file
    Compile {
        source: PathBuf,

        /// Output path (defaults to the source path with a .silkc extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run a source or compiled program
    Run {
        file: PathBuf,

        /// Print Main's return value
        #[arg(long)]
        result: bool,
    },
    /// Print a program's disassembly
    Dump { file: PathBuf },
}

/// Host for command-line runs: `Print` and `PrintLine` write to stdout.
struct Console {
    out: io::StdoutLock<'static>,
}

impl Console {
    fn new() -> Self {
        Console { out: io::stdout().lock() }
    }

    fn register(registry: &mut HostRegistry) {
        registry
            .register_intrinsic("Print", Arity::ANY)
            .register_intrinsic("PrintLine", Arity::ANY);
    }
}

impl Host for Console {
    fn function(&mut self, name: &str, args: &[Variable]) -> Result<Variable, String> {
        let text: String = args.iter().map(Variable::to_string).collect();
        let written = match name {
            "Print" => write!(self.out, "{text}"),
            "PrintLine" => writeln!(self.out, "{text}"),
            _ => return Err(format!("no handler for {name}")),
        };
        written.map_err(|e| e.to_string())?;
        Ok(Variable::default())
    }

    fn end(&mut self) {
        let _ = self.out.flush();
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("silk=warn"));
    fmt().with_env_filter(filter).with_writer(io::stderr).with_target(false).init();
}

fn options(cli: &Cli) -> CompilerOptions {
    let mut options = match &cli.config {
        Some(path) => match CompilerOptions::from_json_file(path) {
            Ok(options) => options,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        },
        None => CompilerOptions::default(),
    };
    if let Some(max) = cli.max_errors {
        options.max_errors = max;
    }
    if cli.no_line_numbers {
        options.line_numbers = false;
    }
    if cli.no_internals {
        options.internal_functions = false;
    }
    options
}

fn report(cli: &Cli, path: &Path, source: &str, diagnostics: &[Diagnostic]) -> ! {
    if cli.json {
        println!("{}", json::render_all(diagnostics));
    } else {
        let renderer = AnsiRenderer { use_color: !cli.no_color && io::stderr().is_terminal() };
        let file = path.display().to_string();
        for d in diagnostics {
            eprint!("{}", renderer.render(d, Some(&file), Some(source)));
        }
        eprintln!("{} error(s) in {file}", diagnostics.len());
    }
    process::exit(1);
}

fn read(path: &Path) -> Vec<u8> {
    match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn compile_source(cli: &Cli, compiler: &Compiler, path: &Path, bytes: Vec<u8>) -> CompiledProgram {
    let source = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{} is not UTF-8 text: {}", path.display(), e);
            process::exit(1);
        }
    };
    match compiler.compile(&source) {
        Ok(program) => program,
        Err(diagnostics) => report(cli, path, &source, &diagnostics),
    }
}

/// Loads a compiled program, or compiles the file when it is source text.
fn load_or_compile(cli: &Cli, compiler: &Compiler, path: &Path) -> CompiledProgram {
    let bytes = read(path);
    if !CompiledProgram::is_program(&bytes) {
        return compile_source(cli, compiler, path, bytes);
    }
    match CompiledProgram::read_from(&mut bytes.as_slice(), &compiler.registry()) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Error loading {}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let mut registry = HostRegistry::new();
    Console::register(&mut registry);
    let compiler = Compiler::with_registry(options(&cli), registry);

    match &cli.command {
        Command::Compile { source, output } => {
            let program = compile_source(&cli, &compiler, source, read(source));
            let output = output.clone().unwrap_or_else(|| source.with_extension("silkc"));
            if let Err(e) = program.save(&output) {
                eprintln!("Error writing {}: {}", output.display(), e);
                process::exit(1);
            }
            info!("wrote {}", output.display());
        }
        Command::Run { file, result } => {
            let program = load_or_compile(&cli, &compiler, file);
            let mut console = Console::new();
            match Runtime::new(&program).run(&mut console) {
                Ok(value) => {
                    if *result {
                        println!("{value}");
                    }
                }
                Err(e) => {
                    let _ = console.out.flush();
                    eprintln!("Runtime error: {e}");
                    process::exit(1);
                }
            }
        }
        Command::Dump { file } => {
            let program = load_or_compile(&cli, &compiler, file);
            match program.disassemble() {
                Ok(text) => print!("{text}"),
                Err(e) => {
                    eprintln!("Error decoding {}: {}", file.display(), e);
                    process::exit(1);
                }
            }
        }
    }
}
