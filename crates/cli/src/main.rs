use std::process::ExitCode;

fn main() -> ExitCode {
    advocado_cli::run()
}
