use colored::Colorize;
use std::process::ExitCode;

fn main() -> ExitCode {
    match delve::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".bright_red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
