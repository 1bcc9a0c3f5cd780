use anyhow::Result;

use umbra::config::USAGE;
use umbra::{app, probe_display, run_validation, CliOptions, DisplayCapability};

fn main() {
    env_logger::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            -1
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let options = CliOptions::parse()?;
    if options.show_help {
        println!("{USAGE}");
        return Ok(0);
    }
    let config = options.to_config();

    if options.validate_only {
        return Ok(run_validation(&config).exit_code());
    }

    match probe_display() {
        DisplayCapability::Available => {
            app::run_interactive(config)?;
            Ok(0)
        }
        DisplayCapability::Unavailable(reason) => {
            eprintln!("{reason}. Falling back to --test mode (set DISPLAY to enable rendering).");
            Ok(run_validation(&config).exit_code())
        }
    }
}
