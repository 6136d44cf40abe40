use std::process::ExitCode;

fn main() -> ExitCode {
    mystyle_cli::run()
}
