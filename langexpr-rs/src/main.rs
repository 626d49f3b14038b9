use std::io::{self, BufRead, IsTerminal, Write};
use std::process::ExitCode;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use langexpr::cli::{self, CliArgs, ConfigFile, Mode};
use langexpr::config::Config;
use langexpr::{Engine, TypeTag, Value};

fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("langexpr: {e}");
            eprintln!("{}", cli::USAGE);
            return ExitCode::FAILURE;
        }
    };

    // RUST_LOG wins; -d only raises the fallback level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.debug { "debug" } else { "warn" }));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    let mut engine = Engine::new();
    let mut ok = load_config(&args, &mut engine);
    if args.debug {
        engine.set_debug_mode(true);
    }
    for (name, value) in &args.defines {
        if let Err(e) = engine.set_variable(name, Value::from_bare(value)) {
            eprintln!("langexpr: -D{name}: {e}");
            ok = false;
        }
    }

    if args.exprs.is_empty() {
        ok &= repl(&args, &mut engine);
    } else {
        for src in &args.exprs {
            ok &= report(run_one(&args, &mut engine, src));
        }
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Load and apply the settings file.  `false` if anything in it failed.
fn load_config(args: &CliArgs, engine: &mut Engine) -> bool {
    let path = match &args.config {
        ConfigFile::Skip => return true,
        ConfigFile::Explicit(path) => path.clone(),
        ConfigFile::Search => match cli::find_user_config() {
            Some(path) => path,
            None => return true,
        },
    };
    tracing::debug!(path = %path.display(), "loading settings");
    match Config::load_file(&path) {
        Ok((config, errors)) => {
            for e in &errors {
                eprintln!("langexpr: {}: {e}", path.display());
            }
            config.apply(engine);
            errors.is_empty()
        }
        Err(e) => {
            eprintln!("langexpr: {}: {e}", path.display());
            false
        }
    }
}

/// Read expressions from stdin, one per line.
fn repl(args: &CliArgs, engine: &mut Engine) -> bool {
    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    let mut ok = true;
    let mut lines = stdin.lock().lines();
    loop {
        if interactive {
            print!("> ");
            let _ = io::stdout().flush();
        }
        let Some(line) = lines.next() else { break };
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("langexpr: {e}");
                return false;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        ok &= report(run_one(args, engine, &line));
    }
    ok
}

fn run_one(args: &CliArgs, engine: &mut Engine, src: &str) -> Result<String, String> {
    match args.mode {
        Mode::Evaluate => {
            let value = match &args.result_type {
                Some(ty) => engine.parse_as(src, &TypeTag::parse(ty)),
                None => engine.evaluate(src),
            };
            value.map(|v| v.to_string()).map_err(|e| e.to_string())
        }
        Mode::Validate => match engine.validate(src) {
            None => Ok("ok".to_owned()),
            Some(msg) => Err(msg),
        },
        Mode::Format => engine.format_expression(src, false).map_err(|e| e.to_string()),
        Mode::Pretty => engine.format_expression(src, true).map_err(|e| e.to_string()),
    }
}

fn report(result: Result<String, String>) -> bool {
    match result {
        Ok(out) => {
            println!("{out}");
            true
        }
        Err(e) => {
            eprintln!("langexpr: {e}");
            false
        }
    }
}
