mod device;
mod session;

use std::env;
use std::io;
use std::process::ExitCode;

use session::{Session, TranscriptProfile};

const USAGE: &str = "Usage: logger-emulator [--profile <bench|field>] | logger-emulator <bench|field>";

fn main() -> ExitCode {
    let profile = match TranscriptProfile::from_args(env::args().skip(1)) {
        Ok(profile) => profile,
        Err(err) => {
            eprintln!("{err}");
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let outcome =
        Session::new(profile).and_then(|mut session| session.run(stdin.lock(), stdout.lock()));
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("logger-emulator: {err}");
            ExitCode::FAILURE
        }
    }
}
