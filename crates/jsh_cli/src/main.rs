mod args;
mod commands;

use tracing_subscriber::EnvFilter;

use commands::{EXIT_FAILURE, run::run};

fn main() {
    init_tracing();
    let args = match args::parse_args() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            std::process::exit(EXIT_FAILURE);
        }
    };
    let code = match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e:#}");
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

/// `JSH_LOG` takes precedence over `RUST_LOG`; warnings only by default.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("JSH_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
