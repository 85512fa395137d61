//! `reqwest::blocking`-backed [`Network`](super::Network) implementation.
//!
//! `fetch` performs the HTTP exchange eagerly and returns an
//! already-resolved [`DeferredResponse`]; see DESIGN.md open question 4.

use super::{Headers, Network};
use crate::abi::Errno;
use crate::errors::{HostError, WasiError};
use crate::stream::Stream;
use std::io::Read;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A queued HTTP exchange whose status/headers/body are retrieved on
/// demand via [`DeferredResponse::resolve`].
pub trait DeferredResponse: Send + std::fmt::Debug {
	fn resolve(self: Box<Self>) -> Result<Box<dyn HttpResponse>, HostError>;
}

/// A resolved HTTP response: status, headers, and a byte-stream body.
pub trait HttpResponse: Send {
	fn status(&self) -> u16;
	fn headers(&self) -> Headers;
	fn into_body_stream(self: Box<Self>) -> Box<dyn Stream>;
}

/// The default, production `Network` collaborator.
pub struct ReqwestNetwork {
	client: reqwest::blocking::Client,
}

impl ReqwestNetwork {
	pub fn new() -> Self {
		let client = reqwest::blocking::Client::builder()
			.timeout(DEFAULT_TIMEOUT)
			.build()
			.expect("building the default HTTP client must not fail");
		ReqwestNetwork { client }
	}
}

impl Default for ReqwestNetwork {
	fn default() -> Self {
		Self::new()
	}
}

impl Network for ReqwestNetwork {
	fn fetch(
		&self,
		url: &str,
		method: &str,
		headers: &Headers,
		body: Option<Vec<u8>>,
	) -> Result<Box<dyn DeferredResponse>, HostError> {
		let method = reqwest::Method::from_bytes(method.as_bytes())
			.map_err(|_| HostError::network_invalid_url(format!("invalid HTTP method: {method}")))?;

		let mut builder = self.client.request(method, url);
		for (name, values) in headers {
			for value in values {
				builder = builder.header(name, value);
			}
		}
		if let Some(body) = body {
			builder = builder.body(body);
		}

		match builder.send() {
			Ok(response) => Ok(Box::new(ResolvedDeferredResponse {
				outcome: Ok(response),
			})),
			Err(err) => {
				let host_error = classify_reqwest_error(&err, url);
				Ok(Box::new(ResolvedDeferredResponse {
					outcome: Err(host_error),
				}))
			}
		}
	}
}

fn classify_reqwest_error(err: &reqwest::Error, url: &str) -> HostError {
	if err.is_builder() {
		return HostError::network_invalid_url(format!("invalid URL: {url}"));
	}
	if err.is_connect() {
		let message = err.to_string();
		if message.contains("refused") {
			return HostError::network_connection_refused(message);
		}
		if message.contains("dns") || message.contains("resolve") || message.contains("lookup") {
			return HostError::network_host_not_found(message);
		}
	}
	HostError::network_error(err.to_string())
}

#[derive(Debug)]
struct ResolvedDeferredResponse {
	outcome: Result<reqwest::blocking::Response, HostError>,
}

impl DeferredResponse for ResolvedDeferredResponse {
	fn resolve(self: Box<Self>) -> Result<Box<dyn HttpResponse>, HostError> {
		let response = self.outcome?;
		Ok(Box::new(ReqwestHttpResponse { response }))
	}
}

struct ReqwestHttpResponse {
	response: reqwest::blocking::Response,
}

impl HttpResponse for ReqwestHttpResponse {
	fn status(&self) -> u16 {
		self.response.status().as_u16()
	}

	fn headers(&self) -> Headers {
		let mut headers: Headers = Headers::new();
		for (name, value) in self.response.headers() {
			if let Ok(value) = value.to_str() {
				headers
					.entry(name.as_str().to_ascii_lowercase())
					.or_default()
					.push(value.to_string());
			}
		}
		headers
	}

	fn into_body_stream(self: Box<Self>) -> Box<dyn Stream> {
		Box::new(HttpBodyStream {
			response: self.response,
		})
	}
}

#[derive(Debug)]
struct HttpBodyStream {
	response: reqwest::blocking::Response,
}

impl Stream for HttpBodyStream {
	fn read(&mut self, max_len: usize) -> Result<Vec<u8>, WasiError> {
		let mut buf = vec![0u8; max_len];
		let n = self
			.response
			.read(&mut buf)
			.map_err(|_| WasiError::new(Errno::Io))?;
		buf.truncate(n);
		Ok(buf)
	}

	fn write(&mut self, _data: &[u8]) -> Result<usize, WasiError> {
		Err(WasiError::new(Errno::Badf))
	}

	fn close(&mut self) -> Result<(), WasiError> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn invalid_method_is_invalid_url_error() {
		let net = ReqwestNetwork::new();
		let err = net
			.fetch("http://localhost:1", "BAD METHOD\n", &Headers::new(), None)
			.unwrap_err();
		assert_eq!(err.code(), crate::errors::network_error_code::INVALID_URL);
	}

	#[test]
	fn connection_failure_is_captured_not_raised_from_fetch() {
		let net = ReqwestNetwork::new();
		// `fetch` performs the request eagerly but never fails itself: any
		// connection error is captured and only surfaces from `resolve()`.
		let deferred = net
			.fetch("http://127.0.0.1:0", "GET", &Headers::new(), None)
			.unwrap();
		let result = deferred.resolve();
		assert!(result.is_err());
	}
}
