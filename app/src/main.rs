use std::process::ExitCode;

use tandem_app::{App, AppArgs, DefaultAppArgs};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = DefaultAppArgs::parse();
    match App::run(args) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
