use std::path::Path;

use csv_diff_llm::{ApiConfig, Model};

// input names are fixed; run from the directory holding them
const LEFT: &str = "file1.csv";
const RIGHT: &str = "file2.csv";

#[tokio::main]
async fn main() -> eyre::Result<()> {
	v_utils::clientside!();

	let config = ApiConfig::from_env()?;
	let response = csv_diff_llm::prompt_diff(&config, Path::new(LEFT), Path::new(RIGHT), Model::Medium, Some(2048)).await?;

	println!("{}", response.text);
	Ok(())
}
