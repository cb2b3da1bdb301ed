// Copyright (c) 2026 Weird Constructor <weirdconstructor@gmail.com>
// This is a part of RXL. See README.md and COPYING for details.

use std::io::Write;
use std::path::PathBuf;
use std::process::exit;

use rxl::vm::Vm;
use tracing_subscriber::EnvFilter;

fn usage() -> ! {
    eprintln!("usage: rxl <entry-source-file> [--dump-bytecode]");
    exit(2);
}

fn main() {
    // Runtime diagnostics go to stderr; RUST_LOG widens the filter
    // (e.g. RUST_LOG=debug for GC and VM state events).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut file: Option<PathBuf> = None;
    let mut dump_bytecode = false;

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--dump-bytecode" => dump_bytecode = true,
            _ if arg.starts_with("--") => usage(),
            _ if file.is_none() => file = Some(PathBuf::from(arg)),
            _ => usage(),
        }
    }

    let file = match file {
        Some(f) => f,
        None => usage(),
    };

    let source = match std::fs::read_to_string(&file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("could not read {}: {}", file.display(), e);
            exit(2);
        }
    };

    let prog = match rxl::compile_str(&source) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            exit(e.exit_code());
        }
    };

    if dump_bytecode {
        print!("{}", prog.dump());
        let _ = std::io::stdout().flush();
        return;
    }

    let mut vm = Vm::new();
    vm.set_module_root(
        file.parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
    );

    let result = vm.run(&prog);

    // `print` may leave a partial line; make sure it reaches the pipe.
    let _ = std::io::stdout().flush();

    if let Err(e) = result {
        eprintln!("{}", e);
        exit(e.exit_code());
    }
}
