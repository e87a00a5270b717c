use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

/// Header names whose values must never reach the log record.
const SENSITIVE_HEADERS: [&str; 4] = ["authorization", "api-key", "x-api-key", "cookie"];

/// Persists one file per LLM API call: the outgoing request and the raw
/// response (or error), tagged with the caller-supplied `api_name`.
///
/// Logging is diagnostic only — failures are logged at warn and swallowed.
pub struct ApiLogger {
    dir: PathBuf,
}

impl ApiLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write a `{timestamp}_log_{api_name}.txt` record. Returns the path on
    /// success, `None` when the write failed.
    pub fn save(
        &self,
        url: &str,
        headers: &[(String, String)],
        request: &Value,
        response: &Value,
        api_name: &str,
    ) -> Option<PathBuf> {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S%.3f");
        let path = self.dir.join(format!("{timestamp}_log_{api_name}.txt"));
        match self.write(&path, url, headers, request, response) {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(api_name, error = %e, "failed to write API log");
                None
            }
        }
    }

    fn write(
        &self,
        path: &Path,
        url: &str,
        headers: &[(String, String)],
        request: &Value,
        response: &Value,
    ) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let redacted = redact_headers(headers);
        let headers_json = serde_json::to_string_pretty(&redacted).unwrap_or_default();
        let request_json = serde_json::to_string_pretty(request).unwrap_or_default();
        let response_json = serde_json::to_string_pretty(response).unwrap_or_default();

        let body = format!(
            "=== API Request ===\n\
             URL: {url}\n\
             Headers: {headers_json}\n\
             Data: {request_json}\n\
             ==================\n\n\
             === API Response ===\n\
             {response_json}\n\
             ===================\n"
        );
        fs::write(path, body)
    }
}

/// Replace credential header values before they enter any record.
fn redact_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let lowered = name.to_ascii_lowercase();
            if SENSITIVE_HEADERS.iter().any(|s| lowered.contains(s)) {
                (name.clone(), "[redacted]".to_string())
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}
