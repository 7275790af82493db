use std::path::Path;

use csv_diff_llm::{ApiConfig, Model};

#[tokio::main]
async fn main() {
	v_utils::clientside!();

	let config = ApiConfig::from_env().unwrap();
	let response = csv_diff_llm::prompt_diff(&config, Path::new("file1.csv"), Path::new("file2.csv"), Model::Fast, Some(512)).await.unwrap();
	println!("{response:#?}");
}
