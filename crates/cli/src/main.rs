use std::process::ExitCode;

fn main() -> ExitCode {
    skinfit_cli::run()
}
