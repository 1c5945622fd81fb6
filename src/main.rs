use damc::driver;
use damc::manifest::DamConfig;
use std::env;
use std::fs;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let mut args: Vec<String> = env::args().collect();

    let verbose = args.iter().any(|a| a == "-v" || a == "--verbose");
    args.retain(|a| a != "-v" && a != "--verbose");
    init_logging(verbose);

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    match args[1].as_str() {
        "compile" => cmd_compile(&args[2..]),
        "check" => cmd_check(&args[2..]),
        "ast" => cmd_ast(&args[2..]),
        "build" => cmd_build(&args[2..]),
        "help" | "--help" | "-h" => print_usage(),
        "version" | "--version" => {
            println!("damc {}", env!("CARGO_PKG_VERSION"));
        }
        other => {
            // If it ends with .dam, treat it as an implicit compile
            if other.ends_with(".dam") {
                cmd_compile(&args[1..]);
            } else {
                eprintln!("error: unknown command '{}'\n", other);
                print_usage();
                process::exit(1);
            }
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage() {
    println!(
        "damc: compiler for the dam language, targeting the JVM via Jasmin\n\
         \n\
         Usage:\n\
         \x20 damc compile <file.dam> [-o out.j]         Compile to Jasmin assembly\n\
         \x20 damc check   <file.dam>                    Type-check and generate only\n\
         \x20 damc ast     <file.dam> [-o out.json]      Print AST as JSON\n\
         \x20 damc build   <file.dam> [--config dam.toml] Compile, assemble, place .class\n\
         \x20 damc help                                  Show this message\n\
         \x20 damc version                               Show version\n\
         \n\
         Options:\n\
         \x20 -v, --verbose   Debug logging (otherwise RUST_LOG, default warn)\n\
         \n\
         To assemble and run by hand:\n\
         \x20 damc compile hello.dam -o Hello.j\n\
         \x20 jasmin Hello.j && java Hello"
    );
}

fn cmd_compile(args: &[String]) {
    let (file, output) = parse_file_and_output(args);
    let source = read_source(&file);

    let path = Path::new(&file);
    let class_name = driver::class_name_for(path).unwrap_or_else(|e| fail(e));
    let source_file = path.file_name().map(|n| n.to_string_lossy().into_owned());

    match damc::compile_to_jasmin(&source, &class_name, source_file.as_deref()) {
        Ok(text) => {
            if let Some(out_path) = output {
                fs::write(&out_path, &text).unwrap_or_else(|e| {
                    eprintln!("error: cannot write '{}': {}", out_path, e);
                    process::exit(1);
                });
                eprintln!("wrote {}", out_path);
            } else {
                print!("{}", text);
            }
        }
        Err(e) => report_compile_error(&file, &e),
    }
}

fn cmd_check(args: &[String]) {
    let (file, _) = parse_file_and_output(args);
    let source = read_source(&file);

    let diagnostics = damc::check_diagnostics(&source);
    if diagnostics.is_empty() {
        eprintln!("ok: {} passed all checks", file);
        return;
    }
    for d in &diagnostics {
        match d.line {
            Some(line) => eprintln!("{}:{}: {}", file, line, d.message),
            None => eprintln!("{}: {}", file, d.message),
        }
    }
    process::exit(1);
}

fn cmd_ast(args: &[String]) {
    let (file, output) = parse_file_and_output(args);
    let source = read_source(&file);

    match damc::source_to_ast_json(&source) {
        Ok(json) => {
            if let Some(out_path) = output {
                fs::write(&out_path, &json).unwrap_or_else(|e| {
                    eprintln!("error: cannot write '{}': {}", out_path, e);
                    process::exit(1);
                });
            } else {
                println!("{}", json);
            }
        }
        Err(e) => report_compile_error(&file, &e),
    }
}

fn cmd_build(args: &[String]) {
    if args.is_empty() {
        eprintln!("error: no input file specified");
        process::exit(1);
    }
    let file = Path::new(&args[0]);

    let mut config_path = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --config requires an argument");
                    process::exit(1);
                }
                config_path = Some(args[i].clone());
            }
            _ => {
                eprintln!("warning: unknown option '{}'", args[i]);
            }
        }
        i += 1;
    }

    // Explicit --config, else dam.toml in the source's directory or a parent
    let config = match config_path {
        Some(p) => DamConfig::load(Path::new(&p)).unwrap_or_else(|e| fail(e)),
        None => {
            let start = match file.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
                _ => env::current_dir().unwrap_or_else(|e| fail(e)),
            };
            DamConfig::discover(&start)
                .unwrap_or_else(|e| fail(e))
                .map(|(_, config)| config)
                .unwrap_or_default()
        }
    };

    match driver::build(file, &config) {
        Ok(artifacts) => {
            if let Some(j) = &artifacts.assembly {
                eprintln!("wrote {}", j.display());
            }
            eprintln!("wrote {}", artifacts.class_file.display());
        }
        Err(e) => fail(e),
    }
}

fn report_compile_error(file: &str, err: &damc::CompileError) -> ! {
    for d in err.diagnostics() {
        match d.line {
            Some(line) => eprintln!("{}:{}: {}", file, line, d.message),
            None => eprintln!("{}: {}", file, d.message),
        }
    }
    process::exit(1);
}

fn fail(err: impl std::fmt::Display) -> ! {
    eprintln!("error: {}", err);
    process::exit(1);
}

fn parse_file_and_output(args: &[String]) -> (String, Option<String>) {
    if args.is_empty() {
        eprintln!("error: no input file specified");
        process::exit(1);
    }

    let file = args[0].clone();
    let mut output = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-o" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: -o requires an argument");
                    process::exit(1);
                }
                output = Some(args[i].clone());
            }
            _ => {
                eprintln!("warning: unknown option '{}'", args[i]);
            }
        }
        i += 1;
    }

    (file, output)
}

fn read_source(path: &str) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("error: cannot read '{}': {}", path, e);
        process::exit(1);
    })
}
