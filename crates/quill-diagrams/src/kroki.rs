//! Kroki HTTP rendering for grammars without a local tool.

use std::time::Duration;

use ureq::Agent;

use crate::error::DiagramError;
use crate::language::DiagramLanguage;

/// Blocking Kroki client.
#[derive(Debug, Clone)]
pub struct KrokiClient {
    server_url: String,
    agent: Agent,
}

impl KrokiClient {
    /// Create a client for `server_url` (trailing slashes are ignored).
    #[must_use]
    pub fn new(server_url: &str, timeout: Duration) -> Self {
        Self {
            server_url: server_url.trim_end_matches('/').to_owned(),
            agent: create_agent(timeout),
        }
    }

    /// Server URL without trailing slash.
    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Render a diagram to SVG.
    pub fn render_svg(&self, language: DiagramLanguage, source: &str) -> Result<String, DiagramError> {
        let url = format!("{}/{}/svg", self.server_url, language.kroki_endpoint());

        let response = self
            .agent
            .post(&url)
            .header("Content-Type", "text/plain")
            .send(source.as_bytes())
            .map_err(|e| DiagramError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let mut body = response.into_body();

        if status >= 400 {
            let error_body = body
                .read_to_string()
                .unwrap_or_else(|_| String::from("(unable to read error body)"));
            return Err(DiagramError::Http(format!("HTTP {status}: {error_body}")));
        }

        let svg = body
            .read_to_string()
            .map_err(|e| DiagramError::Http(e.to_string()))?;
        tracing::debug!(endpoint = language.kroki_endpoint(), bytes = svg.len(), "Kroki rendered diagram");
        crate::tool::svg_from_bytes(svg.as_bytes())
    }
}

/// Create an HTTP agent that reports error statuses as responses.
fn create_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}
