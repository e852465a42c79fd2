use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match ensembled::run_server() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(io::stderr().lock(), "ensembled: {error}");
            ExitCode::FAILURE
        }
    }
}
