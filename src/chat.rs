use std::str::FromStr as _;

use eyre::{Result, bail};
use reqwest::{
	Client,
	header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{ApiConfig, Conversation, Model, Response, Role};

pub(crate) const DIFF_SYSTEM_PROMPT: &str = "You are an expert at extracting the differences between CSV files.";

//TODO: chunk oversized inputs instead of relying on the endpoint's input cap.
pub(crate) fn build_diff_prompt(left_name: &str, left: &str, right_name: &str, right: &str) -> String {
	format!(
		"Below are the contents of two CSV files.\n{left_name}:\n{left}\n\n{right_name}:\n{right}\n\nExtract the differences between the two files (rows present in {left_name} but missing from {right_name}, and rows present in {right_name} but missing from {left_name}) and list them in a clear, human-readable form."
	)
}

#[derive(Debug, Eq, PartialEq)]
/// ref: https://platform.openai.com/docs/models
enum OpenAiModel {
	Gpt4oMini,
	Gpt4o,
	Gpt4Turbo,
}
impl OpenAiModel {
	fn to_str(&self) -> &str {
		match self {
			OpenAiModel::Gpt4oMini => "gpt-4o-mini",
			OpenAiModel::Gpt4o => "gpt-4o",
			OpenAiModel::Gpt4Turbo => "gpt-4-turbo",
		}
	}

	///NB: could end up being outdated, prices move independently of model ids
	pub fn cost(&self) -> Cost {
		match self {
			Self::Gpt4oMini => Cost {
				million_input_tokens: 0.15,
				million_output_tokens: 0.6,
			},
			Self::Gpt4o => Cost {
				million_input_tokens: 2.5,
				million_output_tokens: 10.0,
			},
			Self::Gpt4Turbo => Cost {
				million_input_tokens: 10.0,
				million_output_tokens: 30.0,
			},
		}
	}

	pub fn max_tokens(&self) -> usize {
		match self {
			Self::Gpt4oMini => 16_384,
			Self::Gpt4o => 16_384,
			Self::Gpt4Turbo => 4_096,
		}
	}
}
impl std::str::FromStr for OpenAiModel {
	type Err = eyre::Report;

	fn from_str(s: &str) -> Result<Self> {
		Ok(match s {
			_ if s.to_lowercase().contains("4o-mini") => Self::Gpt4oMini,
			_ if s.to_lowercase().contains("4o") => Self::Gpt4o,
			_ if s.to_lowercase().contains("4-turbo") || s.to_lowercase().contains("1106-preview") => Self::Gpt4Turbo,
			_ => bail!("Unknown model: {s}"),
		})
	}
}

impl From<Model> for OpenAiModel {
	fn from(model: Model) -> Self {
		match model {
			Model::Fast => Self::Gpt4oMini,
			Model::Medium => Self::Gpt4o,
			Model::Slow => Self::Gpt4Turbo,
		}
	}
}
pub struct Cost {
	pub million_input_tokens: f32,
	pub million_output_tokens: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
	role: &'static str,
	content: String,
}
#[derive(Debug, Serialize)]
struct ChatConversation {
	messages: Vec<ChatMessage>,
}
impl From<&Conversation> for ChatConversation {
	fn from(conversation: &Conversation) -> Self {
		let mut messages = Vec::new();
		for message in &conversation.0 {
			let role = match message.role {
				Role::System => "system",
				Role::User => "user",
				Role::Assistant => "assistant",
			};
			messages.push(ChatMessage {
				role,
				content: message.content.clone(),
			});
		}
		Self { messages }
	}
}

///docs: https://platform.openai.com/docs/api-reference/chat
pub(crate) async fn ask_openai(config: &ApiConfig, conversation: &Conversation, model: Model, requested_max_tokens: Option<usize>) -> Result<Response> {
	let conversation = ChatConversation::from(conversation);

	let url = format!("{}/chat/completions", config.base_url);

	// Header {{{
	let mut headers = HeaderMap::new();
	headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", config.api_key))?);
	headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
	//,}}}

	let openai_model = OpenAiModel::from(model);
	let max_tokens = match requested_max_tokens {
		Some(max_tokens) => max_tokens.min(openai_model.max_tokens()),
		_ => openai_model.max_tokens(),
	};

	// Payload {{{
	let payload = json!({
		"model": openai_model.to_str(),
		"temperature": 0.0,
		"max_tokens": max_tokens,
		"messages": conversation.messages,
	});
	//,}}}
	tracing::debug!(?payload);

	let value = Client::new().post(&url).headers(headers).json(&payload).send().await?.json::<Value>().await?;
	let response = serde_json::from_value::<ChatResponse>(value.clone()).map_err(|e| {
		tracing::error!(
			"Failed to parse chat completion. Response JSON: {}",
			serde_json::to_string_pretty(&value).unwrap_or_else(|_| format!("{value:?}"))
		);
		eyre::Report::from(e)
	})?;

	if response.choices.first().is_some_and(|c| c.finish_reason.as_deref() == Some("content_filter")) {
		bail!("The model refused to process the request. This may be due to content policy restrictions.");
	}
	let response = Response::from(response);
	if response.text.is_empty() {
		bail!("chat completion came back empty");
	}
	Ok(response)
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
	model: String,
	choices: Vec<ChatChoice>,
	usage: ChatUsage,
}
#[derive(Debug, Deserialize)]
struct ChatChoice {
	message: ChatChoiceMessage,
	finish_reason: Option<String>,
}
#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
	content: Option<String>,
}
#[derive(Debug, Deserialize)]
struct ChatUsage {
	prompt_tokens: u32,
	completion_tokens: u32,
}
impl ChatResponse {
	fn text(&self) -> String {
		let contents = self.choices.iter().filter_map(|c| c.message.content.as_deref().map(str::to_owned)).collect::<Vec<String>>();
		contents.join("\n")
	}

	fn cost_cents(&self) -> f32 {
		let model = OpenAiModel::from_str(&self.model).unwrap();
		let cost = model.cost();
		(self.usage.prompt_tokens as f32 * cost.million_input_tokens + self.usage.completion_tokens as f32 * cost.million_output_tokens) / 10_000.0
	}
}
impl From<ChatResponse> for Response {
	fn from(response: ChatResponse) -> Self {
		Response::new(response.text(), response.cost_cents())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn deser_model() {
		let model = "gpt-4o-mini-2024-07-18".parse::<OpenAiModel>().unwrap();
		assert_eq!(model, OpenAiModel::Gpt4oMini);
		let model = "gpt-4o-2024-08-06".parse::<OpenAiModel>().unwrap();
		assert_eq!(model, OpenAiModel::Gpt4o);
	}

	#[test]
	fn prompt_embeds_both_files_verbatim() {
		let prompt = build_diff_prompt("file1.csv", "a,b\n1,2", "file2.csv", "a,b\n3,4");
		assert!(prompt.contains("file1.csv:\na,b\n1,2"));
		assert!(prompt.contains("file2.csv:\na,b\n3,4"));
	}

	#[test]
	fn decode_chat_completion() {
		let raw = json!({
			"id": "chatcmpl-1",
			"model": "gpt-4o-mini-2024-07-18",
			"choices": [{"index": 0, "message": {"role": "assistant", "content": "row 3 was added"}, "finish_reason": "stop"}],
			"usage": {"prompt_tokens": 100, "completion_tokens": 50, "total_tokens": 150},
		});
		let decoded = serde_json::from_value::<ChatResponse>(raw).unwrap();
		assert_eq!(decoded.text(), "row 3 was added");

		let response = Response::from(decoded);
		// (100 * 0.15 + 50 * 0.6) / 10_000
		assert!((response.cost_cents - 0.0045).abs() < 1e-6);
	}
}
