use clap::Parser;
use tickloom::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
