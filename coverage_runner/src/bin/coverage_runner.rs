use anyhow::Result;
use clap::Parser;
use coverage_runner::app::{self, Args, HarnessConfig};

fn main() -> Result<()> {
    let args = Args::parse();
    app::init_tracing();
    let config = HarnessConfig::from(args);
    let summary = app::run(&config)?;

    let code = summary.exit_code(config.exit_policy);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
