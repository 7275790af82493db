use std::path::Path;

use eyre::{Result, WrapErr as _};

pub mod assistants;
pub mod blocking;
mod chat;
pub mod config;

pub use assistants::{AssistantsBackend, DIFF_FILENAME, FileMeta, FileRef, JobOutcome, OpenAiClient, PollPolicy, RunPollTimeout, RunStatus, RunStep, run_diff_job};
pub use config::ApiConfig;

/// Reads both files, embeds their full text into one prompt and asks for a human-readable
/// list of line-level differences. One blocking request, no chunking: the endpoint's input
/// cap is the only bound on file size.
pub async fn prompt_diff(config: &ApiConfig, left: &Path, right: &Path, model: Model, max_tokens: Option<usize>) -> Result<Response> {
	let left_text = std::fs::read_to_string(left).wrap_err_with(|| format!("reading {}", left.display()))?;
	let right_text = std::fs::read_to_string(right).wrap_err_with(|| format!("reading {}", right.display()))?;

	let mut conv = Conversation::new_with_system(chat::DIFF_SYSTEM_PROMPT);
	conv.add(Role::User, chat::build_diff_prompt(&display_name(left), &left_text, &display_name(right), &right_text));
	chat::ask_openai(config, &conv, model, max_tokens).await
}

/// Uploads both files to a remote code-execution assistant, runs it, waits out the run, then
/// returns its summary and (when the run produced one) the downloaded `diff.csv` artifact.
pub async fn assistant_diff(config: &ApiConfig, old: &Path, new: &Path, policy: &PollPolicy, out_dir: &Path) -> Result<JobOutcome> {
	let client = OpenAiClient::new(config.clone())?;
	assistants::run_diff_job(&client, old, new, policy, out_dir).await
}

fn display_name(path: &Path) -> String {
	match path.file_name() {
		Some(name) => name.to_string_lossy().into_owned(),
		_ => path.display().to_string(),
	}
}

#[derive(Clone, Copy, Debug, derive_more::FromStr)]
pub enum Model {
	Fast,
	Medium,
	Slow,
}
#[derive(Clone, Copy, Debug)]
pub enum Role {
	System,
	User,
	Assistant,
}

#[derive(Clone, Debug)]
pub struct Message {
	role: Role,
	content: String,
}
impl Message {
	fn new<T: AsRef<str>>(role: Role, content: T) -> Self {
		Self {
			role,
			content: content.as_ref().to_string(),
		}
	}
}

#[derive(Clone, Debug, Default)]
pub struct Conversation(pub Vec<Message>);

impl Conversation {
	pub fn new() -> Self {
		Self(Vec::new())
	}

	pub fn new_with_system<T: AsRef<str>>(system_message: T) -> Self {
		Self(vec![Message::new(Role::System, system_message)])
	}

	pub fn add<T: AsRef<str>>(&mut self, role: Role, content: T) {
		self.0.push(Message::new(role, content));
	}
}

#[derive(Debug, derive_new::new)]
pub struct Response {
	pub text: String,
	pub cost_cents: f32,
}
impl std::fmt::Display for Response {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Response: {}\nCost (cents): {}", self.text, self.cost_cents)
	}
}
