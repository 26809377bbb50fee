mod auth;
mod cli;
mod config;
mod datagen;
mod environment;
mod error;
mod history;
mod http;
mod logging;
mod report;
mod resolver;
mod resources;
mod runner;
mod schema;
mod storage;
mod testing;
mod ui;

use std::process::ExitCode;

use clap::Parser;

use cli::{Cli, Command};

fn main() -> ExitCode {
    config::load_dotenv();
    let Cli { command } = Cli::parse();
    logging::init(command.log_level());

    let outcome = match command {
        Command::Test { modules, settings } => cli::test(&modules, &settings),
        Command::History { limit, report_dir } => cli::history(limit, &report_dir),
        Command::Ui { settings } => match ui::run(settings) {
            Ok(()) => Ok(0),
            Err(err) => {
                tracing::error!(error = %err, "Dashboard exited with an error");
                Ok(1)
            }
        },
    };

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(cli::EXIT_SETUP)
        }
    }
}
