use ringpump::error::exit_code;
use ringpump::options::{self, Command};
use ringpump::worker;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    ExitCode::from(run())
}

fn run() -> u8 {
    match options::parse(std::env::args()) {
        Ok(Command::Run(opts)) => match worker::run(&opts) {
            Ok(code) => code,
            Err(err) => {
                error!("{err}");
                err.exit_code()
            }
        },
        Ok(Command::Usage { program }) => {
            eprint!("{}", options::usage(&program));
            exit_code::USAGE
        }
        Err(err) => {
            eprintln!("{err}");
            exit_code::SYNTAX
        }
    }
}
