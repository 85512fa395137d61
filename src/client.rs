//! The user-facing façade: `Client → Profile → UseCase.perform(...)`.
//!
//! Thin wrappers around [`WasiApp`] that resolve asset URLs on the local
//! filesystem and route to `perform`. Grounded on
//! `original_source/packages/python_host/src/one_sdk/client.py`
//! (`OneClient`/`Profile`/`UseCase`/`InternalClient`): the URL-resolution
//! rules and the re-init-on-`WebAssemblyRuntimeError` policy are carried
//! over unchanged.

use crate::app::WasiApp;
use crate::errors::RuntimeError;
use crate::platform::{HttpPersistence, ReqwestNetwork, StdFilesystem};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const DEFAULT_CORE_PATH: &str = "superface/assets/core.wasm";
const DEFAULT_SUPERFACE_API_URL: &str = "https://superface.ai";

/// Construction-time configuration, collected once per [`Client`].
///
/// The only ambient environment override is `core_path`, which defaults to
/// `CORE_PATH` when unset (spec §6, "Core binary location").
#[derive(Debug, Clone)]
pub struct ClientConfig {
	pub assets_path: PathBuf,
	pub core_path: PathBuf,
	pub token: Option<String>,
	pub superface_api_url: String,
}

impl Default for ClientConfig {
	fn default() -> Self {
		let core_path = std::env::var("CORE_PATH").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(DEFAULT_CORE_PATH));
		ClientConfig {
			assets_path: PathBuf::from("superface"),
			core_path,
			token: None,
			superface_api_url: DEFAULT_SUPERFACE_API_URL.to_string(),
		}
	}
}

impl ClientConfig {
	pub fn new(assets_path: impl Into<PathBuf>) -> Self {
		ClientConfig {
			assets_path: assets_path.into(),
			..Default::default()
		}
	}

	pub fn with_token(mut self, token: impl Into<String>) -> Self {
		self.token = Some(token.into());
		self
	}

	pub fn with_superface_api_url(mut self, url: impl Into<String>) -> Self {
		self.superface_api_url = url.into();
		self
	}
}

/// Resolves profile/provider/map asset URLs and owns the lazily-initialized
/// [`WasiApp`]; re-initializes transparently after a trap, per spec §4.6/§7.
struct InternalClient {
	assets_path: PathBuf,
	core_path: PathBuf,
	app: WasiApp,
	ready: bool,
}

impl InternalClient {
	fn new(config: ClientConfig) -> Self {
		let user_agent = WasiApp::user_agent();
		let app = WasiApp::new(
			Box::new(StdFilesystem::new()),
			Box::new(ReqwestNetwork::new()),
			Box::new(HttpPersistence::new(&config.superface_api_url, config.token, user_agent)),
		);
		InternalClient {
			assets_path: config.assets_path,
			core_path: config.core_path,
			app,
			ready: false,
		}
	}

	fn resolve_profile_url(&self, profile: &str) -> String {
		let resolved = profile.replace('/', ".");
		let path = self.assets_path.join(format!("{resolved}.profile"));
		format!("file://{}", absolute_display(&path))
	}

	fn resolve_map_url(&self, profile: &str, provider: &str) -> String {
		let resolved = profile.replace('/', ".");
		let path = self.assets_path.join(format!("{resolved}.{provider}.map.js"));
		format!("file://{}", absolute_display(&path))
	}

	fn resolve_provider_url(&self, provider: &str) -> String {
		let path = self.assets_path.join(format!("{provider}.provider.json"));
		format!("file://{}", absolute_display(&path))
	}

	fn init(&mut self) -> Result<(), RuntimeError> {
		if self.ready {
			return Ok(());
		}
		let wasm = std::fs::read(&self.core_path)
			.map_err(|e| RuntimeError::unexpected_with_source("CoreNotLoaded", format!("failed to read core at {}", self.core_path.display()), e))?;
		self.app.load_core(&wasm)?;
		self.app.init()?;
		self.ready = true;
		Ok(())
	}

	fn destroy(&mut self) -> Result<(), RuntimeError> {
		if !self.ready {
			return Ok(());
		}
		self.app.destroy()?;
		self.ready = false;
		Ok(())
	}

	#[allow(clippy::too_many_arguments)]
	fn perform(
		&mut self,
		profile: &str,
		provider: &str,
		usecase: &str,
		input: Value,
		parameters: Value,
		security: Value,
	) -> Result<Value, RuntimeError> {
		self.init()?;

		let profile_url = self.resolve_profile_url(profile);
		let provider_url = self.resolve_provider_url(provider);
		let map_url = self.resolve_map_url(profile, provider);

		let result = self.app.perform(profile_url, provider_url, map_url, usecase.to_string(), input, parameters, security);

		if let Err(err) = &result {
			if err.name() == "WebAssemblyRuntimeError" {
				log::warn!("core trapped during perform, re-initializing");
				self.destroy()?;
				self.init()?;
			}
		}
		result
	}

	fn send_metrics(&mut self) -> Result<(), RuntimeError> {
		self.app.send_metrics()
	}
}

fn absolute_display(path: &Path) -> String {
	std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()).display().to_string()
}

/// Entry point of the façade. Cheap to clone: internally `Arc<Mutex<...>>`
/// over a single [`WasiApp`], matching the single-perform-at-a-time contract
/// of spec §5.
#[derive(Clone)]
pub struct Client {
	internal: Arc<Mutex<InternalClient>>,
}

impl Client {
	pub fn new(config: ClientConfig) -> Self {
		Client {
			internal: Arc::new(Mutex::new(InternalClient::new(config))),
		}
	}

	pub fn init(&self) -> Result<(), RuntimeError> {
		self.internal.lock().expect("client mutex poisoned").init()
	}

	pub fn destroy(&self) -> Result<(), RuntimeError> {
		self.internal.lock().expect("client mutex poisoned").destroy()
	}

	pub fn get_profile(&self, name: impl Into<String>) -> Profile {
		Profile {
			internal: self.internal.clone(),
			name: name.into(),
		}
	}

	pub fn send_metrics_to_superface(&self) -> Result<(), RuntimeError> {
		self.internal.lock().expect("client mutex poisoned").send_metrics()
	}
}

/// A named profile within a [`Client`]; `get_usecase` binds the use case to
/// it without performing any I/O.
pub struct Profile {
	internal: Arc<Mutex<InternalClient>>,
	pub name: String,
}

impl Profile {
	pub fn get_usecase(&self, name: impl Into<String>) -> UseCase {
		UseCase {
			internal: self.internal.clone(),
			profile_name: self.name.clone(),
			name: name.into(),
		}
	}
}

/// A single named operation inside a profile.
pub struct UseCase {
	internal: Arc<Mutex<InternalClient>>,
	profile_name: String,
	pub name: String,
}

impl UseCase {
	pub fn perform(&self, input: Value, provider: &str, parameters: Value, security: Value) -> Result<Value, RuntimeError> {
		self.internal
			.lock()
			.expect("client mutex poisoned")
			.perform(&self.profile_name, provider, &self.name, input, parameters, security)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resolve_profile_url_replaces_slashes_with_dots() {
		let internal = InternalClient::new(ClientConfig::new("assets"));
		let url = internal.resolve_profile_url("communication/send-email");
		assert!(url.starts_with("file://"));
		assert!(url.ends_with("communication.send-email.profile"));
	}

	#[test]
	fn resolve_map_url_includes_provider() {
		let internal = InternalClient::new(ClientConfig::new("assets"));
		let url = internal.resolve_map_url("example", "my-provider");
		assert!(url.ends_with("example.my-provider.map.js"));
	}

	#[test]
	fn resolve_provider_url_uses_provider_json_suffix() {
		let internal = InternalClient::new(ClientConfig::new("assets"));
		let url = internal.resolve_provider_url("my-provider");
		assert!(url.ends_with("my-provider.provider.json"));
	}

	#[test]
	fn default_config_reads_core_path_env_override() {
		std::env::set_var("CORE_PATH", "/tmp/onesdk-test-core.wasm");
		let config = ClientConfig::default();
		assert_eq!(config.core_path, PathBuf::from("/tmp/onesdk-test-core.wasm"));
		std::env::remove_var("CORE_PATH");
	}
}
