use std::path::Path;

use csv_diff_llm::{ApiConfig, PollPolicy, blocking};

fn main() {
	v_utils::clientside!();

	let config = ApiConfig::from_env().unwrap();
	let outcome = blocking::assistant_diff(&config, Path::new("old.csv"), Path::new("new.csv"), &PollPolicy::default(), Path::new(".")).unwrap();

	println!("{}", outcome.summary);
	if let Some(path) = outcome.saved_file {
		println!("wrote {}", path.display());
	}
}
