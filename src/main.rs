use std::env;
use std::io;
use std::process::ExitCode;
use tracing::error;

use meetup_export::config::{API_KEY_ENV, DEFAULT_SETTINGS_PATH, QueryConfig, Settings};
use meetup_export::credentials::resolve_api_key;
use meetup_export::ingest::meetup::HttpPageSource;
use meetup_export::logging::{self, Stage};
use meetup_export::model::Result;
use meetup_export::pipeline::{self, RunSummary};
use meetup_export::prompt::Prompter;

const BANNER: &str = "
#=======================================================
# Automatic CSV File Generator for Meetup.com API Data
#=======================================================
";

fn run(settings: &Settings) -> Result<RunSummary> {
    let stdin = io::stdin();
    let mut prompter = Prompter::new(stdin.lock(), io::stdout());

    let (api_key, _) = resolve_api_key(
        &settings.api_key_path,
        env::var(API_KEY_ENV).ok(),
        || prompter.ask_api_key(),
    )?;
    let zipcode = prompter.ask_zipcode()?;
    let radius = prompter.ask_radius()?;

    let query = QueryConfig::new(api_key, zipcode, radius)?;
    let source = HttpPageSource::new(settings, query)?;
    pipeline::run(source, settings)
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    println!("{}", BANNER);

    let settings = match Settings::load(DEFAULT_SETTINGS_PATH) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };
    let _guard = logging::init_logging(settings.log_level, settings.log_file.as_deref());

    match run(&settings) {
        Ok(summary) => {
            println!(
                "***Successfully exported {} groups as '{}'***",
                summary.rows,
                summary.output_path.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(stage = %Stage::System, "Export failed: {}", e);
            eprintln!("❌ Export failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
