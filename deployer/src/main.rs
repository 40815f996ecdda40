//! Fly Deployer - Entry Point
//!
//! Runs the release command on a throwaway machine, then starts the app
//! machine directly or hands off to terraform.

use std::env;
use std::process;

use fly_deployer::app::options::{Command, RunOptions};
use fly_deployer::app::run::run;
use fly_deployer::utils::version_info;

#[tokio::main]
async fn main() {
    let options = match RunOptions::from_args(env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{e}");
            process::exit(e.exit_code());
        }
    };

    // Print version and exit
    if options.command == Command::Version {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(version) => println!("{version}"),
            Err(e) => eprintln!("{e}"),
        }
        return;
    }

    if let Err(e) = run(options).await {
        eprintln!("{e}");
        if let Some(diagnostics) = e.diagnostics() {
            eprintln!("{diagnostics}");
        }
        process::exit(e.exit_code());
    }
}
