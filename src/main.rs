use colored::Colorize;
use std::process;
use taskrun::Error;
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();

    if let Err(e) = taskrun::cli::run() {
        match &e {
            Error::Exit(_) => {}
            Error::Abort { message, .. } => eprintln!("{}", message),
            _ => eprintln!("{} {}", "Error:".red().bold(), e),
        }
        process::exit(e.exit_code());
    }
}

/// Console diagnostics controlled by RUST_LOG (default: warn)
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
