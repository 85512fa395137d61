//! HTTP-backed [`Persistence`](super::Persistence) implementation: batches
//! metrics events to the Superface insights endpoint and writes developer
//! dumps as timestamped files.

use super::Persistence;
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

/// The default, production `Persistence` collaborator.
pub struct HttpPersistence {
	client: reqwest::blocking::Client,
	insights_url: String,
	token: Option<String>,
	user_agent: String,
}

impl HttpPersistence {
	pub fn new(superface_api_url: &str, token: Option<String>, user_agent: String) -> Self {
		HttpPersistence {
			client: reqwest::blocking::Client::new(),
			insights_url: format!("{}/insights/sdk_event", superface_api_url.trim_end_matches('/')),
			token,
			user_agent,
		}
	}
}

impl Persistence for HttpPersistence {
	fn persist_metrics(&self, events: &[String]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
		if events.is_empty() {
			return Ok(());
		}

		let body = format!("[{}]", events.join(","));
		let mut request = self
			.client
			.post(format!("{}/batch", self.insights_url))
			.header("content-type", "application/json")
			.header("user-agent", &self.user_agent)
			.body(body);

		if let Some(token) = &self.token {
			request = request.header("authorization", format!("SUPERFACE-SDK-TOKEN {token}"));
		}

		request.send()?.error_for_status()?;
		Ok(())
	}

	fn persist_developer_dump(&self, events: &[String]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
		if events.is_empty() {
			return Ok(());
		}

		let timestamp = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.unwrap_or_default()
			.as_millis();
		let file_name = format!("onesdk_devlog_dump_{timestamp}.txt");

		let mut file = std::fs::File::create(&file_name)?;
		for event in events {
			file.write_all(event.as_bytes())?;
		}

		log::info!("wrote developer dump to {file_name}");
		Ok(())
	}
}
