use std::path::{Path, PathBuf};

use clap::Parser;
use csv_diff_llm::{ApiConfig, PollPolicy};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
	/// Baseline CSV
	old: PathBuf,
	/// Updated CSV
	new: PathBuf,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
	v_utils::clientside!();
	let cli = Cli::parse();

	let config = ApiConfig::from_env()?;
	let outcome = csv_diff_llm::assistant_diff(&config, &cli.old, &cli.new, &PollPolicy::default(), Path::new(".")).await?;

	tracing::info!(status = %outcome.status, "run finished");
	println!("{}", outcome.summary);
	if let Some(path) = outcome.saved_file {
		println!("\n-> wrote {}", path.display());
	}
	Ok(())
}
