use std::process::ExitCode;

fn main() -> ExitCode {
    match manga_translator_lib::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
