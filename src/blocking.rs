use std::path::Path;

use eyre::Result;

use crate::{ApiConfig, JobOutcome, Model, PollPolicy, Response};

pub fn prompt_diff(config: &ApiConfig, left: &Path, right: &Path, model: Model, max_tokens: Option<usize>) -> Result<Response> {
	let runtime = tokio::runtime::Runtime::new()?;
	runtime.block_on(crate::prompt_diff(config, left, right, model, max_tokens))
}

pub fn assistant_diff(config: &ApiConfig, old: &Path, new: &Path, policy: &PollPolicy, out_dir: &Path) -> Result<JobOutcome> {
	let runtime = tokio::runtime::Runtime::new()?;
	runtime.block_on(crate::assistant_diff(config, old, new, policy, out_dir))
}
