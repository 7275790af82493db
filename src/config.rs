use eyre::{Result, WrapErr as _};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Passed explicitly into every remote-call helper; nothing here is process-global.
#[derive(Clone, Debug, derive_new::new)]
pub struct ApiConfig {
	pub api_key: String,
	/// Service root, without a trailing slash. Overridable so demos and stand-in servers can
	/// point the client elsewhere.
	pub base_url: String,
}

impl ApiConfig {
	pub fn from_env() -> Result<Self> {
		let api_key = std::env::var("OPENAI_API_KEY").wrap_err("OPENAI_API_KEY environment variable not set")?;
		Ok(Self {
			api_key,
			base_url: DEFAULT_BASE_URL.to_string(),
		})
	}
}
