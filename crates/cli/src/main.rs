use std::process::ExitCode;

fn main() -> ExitCode {
    wincomp_cli::run()
}
