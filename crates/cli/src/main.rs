use std::process::ExitCode;

fn main() -> ExitCode {
    signcfg_cli::run()
}
