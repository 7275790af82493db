use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use bytes::Bytes;
use eyre::{Result, WrapErr as _};
use reqwest::{
	Client,
	header::{AUTHORIZATION, HeaderMap, HeaderValue},
	multipart,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::ApiConfig;

/// Name of the artifact the run is asked to produce remotely, and of its local copy.
pub const DIFF_FILENAME: &str = "diff.csv";

const ASSISTANT_NAME: &str = "CSV Diff Bot";
const ASSISTANT_MODEL: &str = "gpt-4o-mini";
const ASSISTANT_INSTRUCTIONS: &str = "You are a data engineer. Given two CSV files with the same schema, load them with pandas, detect row-level differences (added, removed, updated rows), and write the result to diff.csv. Return a concise natural-language summary as well.";
const DIFF_REQUEST: &str = "Compare these two CSVs and generate diff.csv.";

// Remote records {{{
// One record per remote entity, carrying only the fields this crate consumes. The service's
// full response shapes stay behind [`OpenAiClient`].

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct FileRef {
	pub id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AssistantRef {
	pub id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ThreadRef {
	pub id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RunRef {
	pub id: String,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
	#[display("queued")]
	Queued,
	#[display("in_progress")]
	InProgress,
	#[display("cancelling")]
	Cancelling,
	#[display("requires_action")]
	RequiresAction,
	#[display("completed")]
	Completed,
	#[display("failed")]
	Failed,
	#[display("cancelled")]
	Cancelled,
	#[serde(other)]
	#[display("unknown")]
	Other,
}
impl RunStatus {
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
	}
}

/// One logged action of a run. The only thing a step is consumed for is locating output files.
#[derive(Clone, Debug)]
pub struct RunStep {
	pub id: String,
	pub output_file_ids: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FileMeta {
	pub id: String,
	pub filename: String,
}
//,}}}

#[derive(Debug, derive_new::new)]
pub struct JobOutcome {
	/// Terminal status the run ended in. On [`RunStatus::Failed`] or [`RunStatus::Cancelled`]
	/// the summary is still whatever the thread's newest message holds.
	pub status: RunStatus,
	pub summary: String,
	pub saved_file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, derive_new::new)]
pub struct PollPolicy {
	pub interval: Duration,
	pub max_attempts: usize,
}
impl Default for PollPolicy {
	fn default() -> Self {
		Self::new(Duration::from_secs(5), 120)
	}
}

/// The run was still not terminal after the whole poll budget.
#[derive(Clone, Copy, Debug)]
pub struct RunPollTimeout {
	pub attempts: usize,
	pub waited: Duration,
}
impl std::fmt::Display for RunPollTimeout {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "run still not terminal after {} status checks over {:?}", self.attempts, self.waited)
	}
}
impl std::error::Error for RunPollTimeout {}

/// The remote operations the diff job consumes, one method per call. [`OpenAiClient`] is the
/// hosted implementation; tests drive [`run_diff_job`] against their own.
#[allow(async_fn_in_trait)]
pub trait AssistantsBackend {
	async fn upload_file(&self, path: &Path) -> Result<FileRef>;
	async fn create_assistant(&self) -> Result<AssistantRef>;
	async fn create_thread(&self) -> Result<ThreadRef>;
	async fn post_message(&self, thread: &ThreadRef, text: &str, attachments: &[FileRef]) -> Result<()>;
	async fn start_run(&self, thread: &ThreadRef, assistant: &AssistantRef) -> Result<RunRef>;
	async fn run_status(&self, thread: &ThreadRef, run: &RunRef) -> Result<RunStatus>;
	/// Text of the newest message on the thread, empty if the thread holds none.
	async fn latest_message_text(&self, thread: &ThreadRef) -> Result<String>;
	async fn list_run_steps(&self, thread: &ThreadRef, run: &RunRef) -> Result<Vec<RunStep>>;
	async fn file_metadata(&self, file_id: &str) -> Result<FileMeta>;
	async fn file_content(&self, file_id: &str) -> Result<Bytes>;
}

/// Drives one diff job end to end: upload both inputs, set up the assistant and thread, start
/// the run, wait it out, then collect the summary and any produced artifact.
pub async fn run_diff_job<B: AssistantsBackend>(backend: &B, old: &Path, new: &Path, policy: &PollPolicy, out_dir: &Path) -> Result<JobOutcome> {
	let old_ref = backend.upload_file(old).await?;
	let new_ref = backend.upload_file(new).await?;

	let assistant = backend.create_assistant().await?;
	let thread = backend.create_thread().await?;
	backend.post_message(&thread, DIFF_REQUEST, &[old_ref, new_ref]).await?;
	let run = backend.start_run(&thread, &assistant).await?;

	let status = wait_for_run(backend, &thread, &run, policy).await?;
	if status != RunStatus::Completed {
		// the newest message may then be unrelated or empty; callers get the status to judge by
		tracing::warn!(%status, "run did not complete cleanly");
	}

	let summary = backend.latest_message_text(&thread).await?;
	let saved_file = download_output(backend, &thread, &run, out_dir).await?;

	Ok(JobOutcome::new(status, summary, saved_file))
}

async fn wait_for_run<B: AssistantsBackend>(backend: &B, thread: &ThreadRef, run: &RunRef, policy: &PollPolicy) -> Result<RunStatus> {
	for attempt in 1..=policy.max_attempts {
		let status = backend.run_status(thread, run).await?;
		if status.is_terminal() {
			return Ok(status);
		}
		tracing::info!(%status, attempt, "waiting on run");
		tokio::time::sleep(policy.interval).await;
	}
	Err(RunPollTimeout {
		attempts: policy.max_attempts,
		waited: policy.interval * policy.max_attempts as u32,
	}
	.into())
}

/// Walks the run's steps looking for an output file the service reports under the expected
/// name; first match is downloaded next to `out_dir` and wins. No match, no local write.
async fn download_output<B: AssistantsBackend>(backend: &B, thread: &ThreadRef, run: &RunRef, out_dir: &Path) -> Result<Option<PathBuf>> {
	for step in backend.list_run_steps(thread, run).await? {
		for file_id in &step.output_file_ids {
			let meta = backend.file_metadata(file_id).await?;
			if meta.filename != DIFF_FILENAME {
				continue;
			}
			tracing::info!(%file_id, step_id = %step.id, "downloading {DIFF_FILENAME}");
			let content = backend.file_content(file_id).await?;
			let target = out_dir.join(DIFF_FILENAME);
			std::fs::write(&target, &content).wrap_err_with(|| format!("writing {}", target.display()))?;
			return Ok(Some(target));
		}
	}
	Ok(None)
}

/// Hosted-service implementation of [`AssistantsBackend`].
///
///docs: https://platform.openai.com/docs/api-reference/assistants
#[derive(Clone, Debug)]
pub struct OpenAiClient {
	http: Client,
	config: ApiConfig,
}

impl OpenAiClient {
	pub fn new(config: ApiConfig) -> Result<Self> {
		// Header {{{
		let mut headers = HeaderMap::new();
		headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", config.api_key))?);
		headers.insert("OpenAI-Beta", HeaderValue::from_static("assistants=v2"));
		//,}}}
		let http = Client::builder().default_headers(headers).build()?;
		Ok(Self { http, config })
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.config.base_url, path)
	}
}

impl AssistantsBackend for OpenAiClient {
	async fn upload_file(&self, path: &Path) -> Result<FileRef> {
		let bytes = std::fs::read(path).wrap_err_with(|| format!("reading {}", path.display()))?;
		let filename = match path.file_name() {
			Some(name) => name.to_string_lossy().into_owned(),
			_ => path.display().to_string(),
		};
		tracing::info!(%filename, "uploading");

		let part = multipart::Part::bytes(bytes).file_name(filename).mime_str("text/csv")?;
		let form = multipart::Form::new().text("purpose", "assistants").part("file", part);
		let response = self.http.post(self.url("/files")).multipart(form).send().await?.error_for_status()?;
		decode(response).await
	}

	async fn create_assistant(&self) -> Result<AssistantRef> {
		tracing::info!("creating assistant");
		let payload = json!({
			"name": ASSISTANT_NAME,
			"model": ASSISTANT_MODEL,
			"instructions": ASSISTANT_INSTRUCTIONS,
			"tools": [{"type": "code_interpreter"}],
		});
		let response = self.http.post(self.url("/assistants")).json(&payload).send().await?.error_for_status()?;
		decode(response).await
	}

	async fn create_thread(&self) -> Result<ThreadRef> {
		let response = self.http.post(self.url("/threads")).json(&json!({})).send().await?.error_for_status()?;
		decode(response).await
	}

	async fn post_message(&self, thread: &ThreadRef, text: &str, attachments: &[FileRef]) -> Result<()> {
		let attachments = attachments
			.iter()
			.map(|file| json!({"file_id": file.id, "tools": [{"type": "code_interpreter"}]}))
			.collect::<Vec<_>>();
		let payload = json!({
			"role": "user",
			"content": text,
			"attachments": attachments,
		});
		self.http
			.post(self.url(&format!("/threads/{}/messages", thread.id)))
			.json(&payload)
			.send()
			.await?
			.error_for_status()?;
		Ok(())
	}

	async fn start_run(&self, thread: &ThreadRef, assistant: &AssistantRef) -> Result<RunRef> {
		let payload = json!({"assistant_id": assistant.id});
		let response = self.http.post(self.url(&format!("/threads/{}/runs", thread.id))).json(&payload).send().await?.error_for_status()?;
		decode(response).await
	}

	async fn run_status(&self, thread: &ThreadRef, run: &RunRef) -> Result<RunStatus> {
		#[derive(Debug, Deserialize)]
		struct RunObject {
			status: RunStatus,
		}
		let response = self.http.get(self.url(&format!("/threads/{}/runs/{}", thread.id, run.id))).send().await?.error_for_status()?;
		let run: RunObject = decode(response).await?;
		Ok(run.status)
	}

	async fn latest_message_text(&self, thread: &ThreadRef) -> Result<String> {
		let response = self.http.get(self.url(&format!("/threads/{}/messages", thread.id))).send().await?.error_for_status()?;
		let list: MessageList = decode(response).await?;
		Ok(first_text(&list).unwrap_or_default())
	}

	async fn list_run_steps(&self, thread: &ThreadRef, run: &RunRef) -> Result<Vec<RunStep>> {
		let response = self
			.http
			.get(self.url(&format!("/threads/{}/runs/{}/steps", thread.id, run.id)))
			.send()
			.await?
			.error_for_status()?;
		let list: StepList = decode(response).await?;
		Ok(list.data.into_iter().map(StepObject::into_step).collect())
	}

	async fn file_metadata(&self, file_id: &str) -> Result<FileMeta> {
		let response = self.http.get(self.url(&format!("/files/{file_id}"))).send().await?.error_for_status()?;
		decode(response).await
	}

	async fn file_content(&self, file_id: &str) -> Result<Bytes> {
		let response = self.http.get(self.url(&format!("/files/{file_id}/content"))).send().await?.error_for_status()?;
		Ok(response.bytes().await?)
	}
}

/// Decodes a response body into the typed record, logging the raw JSON when the shape is off.
async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
	let value = response.json::<Value>().await?;
	tracing::debug!(?value);
	serde_json::from_value::<T>(value.clone()).map_err(|e| {
		tracing::error!(
			"Unexpected response shape. Response JSON: {}",
			serde_json::to_string_pretty(&value).unwrap_or_else(|_| format!("{value:?}"))
		);
		eyre::Report::from(e)
	})
}

// Wire shapes {{{
// Only decoded here; the rest of the crate sees [`RunStep`] and plain strings.

#[derive(Debug, Deserialize)]
struct MessageList {
	data: Vec<MessageObject>,
}
#[derive(Debug, Deserialize)]
struct MessageObject {
	content: Vec<ContentBlock>,
}
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
	#[serde(rename = "text")]
	Text { text: TextBlock },
	#[serde(other)]
	Other,
}
#[derive(Debug, Deserialize)]
struct TextBlock {
	value: String,
}

// newest message first; a run that died early may not have written one at all
fn first_text(list: &MessageList) -> Option<String> {
	list.data.first().and_then(|message| {
		message.content.iter().find_map(|block| match block {
			ContentBlock::Text { text } => Some(text.value.clone()),
			ContentBlock::Other => None,
		})
	})
}

#[derive(Debug, Deserialize)]
struct StepList {
	data: Vec<StepObject>,
}
#[derive(Debug, Deserialize)]
struct StepObject {
	id: String,
	// pre-v2 deployments report produced files directly on the step
	#[serde(default)]
	file_ids: Vec<String>,
	#[serde(default)]
	step_details: Option<StepDetails>,
}
#[derive(Debug, Deserialize)]
struct StepDetails {
	#[serde(default)]
	tool_calls: Vec<ToolCall>,
}
#[derive(Debug, Deserialize)]
struct ToolCall {
	#[serde(default)]
	code_interpreter: Option<CodeInterpreterCall>,
}
#[derive(Debug, Deserialize)]
struct CodeInterpreterCall {
	#[serde(default)]
	outputs: Vec<ToolOutput>,
}
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ToolOutput {
	#[serde(rename = "image")]
	Image { image: OutputFile },
	#[serde(other)]
	Other,
}
#[derive(Debug, Deserialize)]
struct OutputFile {
	file_id: String,
}

impl StepObject {
	fn into_step(self) -> RunStep {
		let mut output_file_ids = self.file_ids;
		if let Some(details) = self.step_details {
			for call in details.tool_calls {
				let Some(interpreter) = call.code_interpreter else { continue };
				for output in interpreter.outputs {
					if let ToolOutput::Image { image } = output {
						output_file_ids.push(image.file_id);
					}
				}
			}
		}
		RunStep { id: self.id, output_file_ids }
	}
}
//,}}}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn terminal_statuses() {
		for status in [RunStatus::Completed, RunStatus::Failed, RunStatus::Cancelled] {
			assert!(status.is_terminal());
		}
		for status in [RunStatus::Queued, RunStatus::InProgress, RunStatus::Cancelling, RunStatus::RequiresAction, RunStatus::Other] {
			assert!(!status.is_terminal());
		}
	}

	#[test]
	fn deser_run_status() {
		assert_eq!(serde_json::from_str::<RunStatus>("\"in_progress\"").unwrap(), RunStatus::InProgress);
		assert_eq!(serde_json::from_str::<RunStatus>("\"completed\"").unwrap(), RunStatus::Completed);
		// unrecognized statuses decode rather than error, and never read as terminal
		assert_eq!(serde_json::from_str::<RunStatus>("\"expired\"").unwrap(), RunStatus::Other);
	}

	#[test]
	fn default_poll_policy() {
		let policy = PollPolicy::default();
		assert_eq!(policy.interval, Duration::from_secs(5));
		assert_eq!(policy.max_attempts, 120);
	}

	#[test]
	fn newest_message_text_wins() {
		let raw = json!({
			"data": [
				{"id": "msg-2", "role": "assistant", "content": [{"type": "text", "text": {"value": "3 rows changed", "annotations": []}}]},
				{"id": "msg-1", "role": "user", "content": [{"type": "text", "text": {"value": "Compare these two CSVs and generate diff.csv.", "annotations": []}}]},
			],
		});
		let list = serde_json::from_value::<MessageList>(raw).unwrap();
		assert_eq!(first_text(&list).as_deref(), Some("3 rows changed"));
	}

	#[test]
	fn empty_thread_has_no_text() {
		let list = serde_json::from_value::<MessageList>(json!({"data": []})).unwrap();
		assert_eq!(first_text(&list), None);
	}

	#[test]
	fn step_collects_output_files_from_both_shapes() {
		let raw = json!({
			"id": "step-1",
			"type": "tool_calls",
			"file_ids": ["file-a"],
			"step_details": {
				"type": "tool_calls",
				"tool_calls": [{
					"id": "call-1",
					"type": "code_interpreter",
					"code_interpreter": {
						"input": "df.to_csv('diff.csv')",
						"outputs": [
							{"type": "logs", "logs": "wrote diff.csv"},
							{"type": "image", "image": {"file_id": "file-b"}},
						],
					},
				}],
			},
		});
		let step = serde_json::from_value::<StepObject>(raw).unwrap().into_step();
		assert_eq!(step.id, "step-1");
		assert_eq!(step.output_file_ids, vec!["file-a".to_string(), "file-b".to_string()]);
	}

	#[test]
	fn step_without_details_decodes() {
		let step = serde_json::from_value::<StepObject>(json!({"id": "step-2", "type": "message_creation"})).unwrap().into_step();
		assert!(step.output_file_ids.is_empty());
	}
}
