use std::error::Error;
use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    let Err(error) = meshsdd::run_daemon() else {
        return ExitCode::SUCCESS;
    };
    let mut stderr = io::stderr().lock();
    let mut message: Option<&dyn Error> = Some(&error);
    let mut prefix = "meshsdd";
    while let Some(cause) = message {
        if writeln!(stderr, "{prefix}: {cause}").is_err() {
            break;
        }
        prefix = "  caused by";
        message = cause.source();
    }
    ExitCode::FAILURE
}
