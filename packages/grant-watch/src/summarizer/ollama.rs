//! Ollama-backed change summarizer.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::SummaryError;
use crate::traits::summarizer::{ChangeAnalysis, ChangeSummarizer};
use crate::types::{ChangeEvent, Priority};

/// Characters of a free-form answer kept as the summary.
const FREE_TEXT_SUMMARY_CHARS: usize = 150;

/// Summarizes changes with a local Ollama model.
#[derive(Clone)]
pub struct OllamaSummarizer {
    http_client: Client,
    base_url: String,
    model: String,
    health_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// JSON the model is asked to answer with.
#[derive(Debug, Deserialize)]
struct ModelAnswer {
    summary: String,
    #[serde(default)]
    relevance: String,
    #[serde(default)]
    keywords: Vec<String>,
}

impl OllamaSummarizer {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            health_timeout: Duration::from_secs(5),
        }
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    /// Set the health probe timeout.
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_prompt(events: &[ChangeEvent], source_name: &str) -> String {
        let changes: Vec<String> = events
            .iter()
            .map(|e| format!("- [{}] {}", e.priority, e.describe()))
            .collect();

        format!(
            "Eres un asistente experto en analizar cambios en páginas web de convocatorias de ayudas y subvenciones.\n\n\
             Fuente: {}\n\n\
             Cambios detectados:\n{}\n\n\
             Analiza estos cambios y proporciona:\n\
             1. Un resumen breve (máximo 2 líneas) de qué cambió\n\
             2. Nivel de relevancia: ALTA, MEDIA o BAJA\n\
             3. Hasta 5 palabras clave relacionadas\n\n\
             Responde en formato JSON:\n\
             {{\"summary\": \"descripción del cambio\", \"relevance\": \"ALTA|MEDIA|BAJA\", \"keywords\": [\"palabra1\", \"palabra2\"]}}",
            source_name,
            changes.join("\n")
        )
    }
}

/// Map the model's relevance label to a priority.
pub fn relevance_to_priority(relevance: &str) -> Priority {
    match relevance.trim().to_uppercase().as_str() {
        "ALTA" | "HIGH" => Priority::Urgent,
        "BAJA" | "LOW" => Priority::Low,
        _ => Priority::Normal,
    }
}

/// Interpret the model's text answer.
///
/// JSON answers (optionally wrapped in prose or code fences) are parsed;
/// anything else becomes a truncated free-text summary at normal priority.
fn parse_answer(text: &str) -> ChangeAnalysis {
    let json = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    };

    if let Ok(answer) = serde_json::from_str::<ModelAnswer>(json) {
        return ChangeAnalysis {
            summary: answer.summary,
            priority: relevance_to_priority(&answer.relevance),
            keywords: answer.keywords.into_iter().take(5).collect(),
            ai_generated: true,
        };
    }

    let summary: String = text.trim().chars().take(FREE_TEXT_SUMMARY_CHARS).collect();
    ChangeAnalysis {
        summary: if summary.is_empty() {
            "Changes detected".to_string()
        } else {
            summary
        },
        priority: Priority::Normal,
        keywords: Vec::new(),
        ai_generated: true,
    }
}

#[async_trait]
impl ChangeSummarizer for OllamaSummarizer {
    async fn is_available(&self) -> bool {
        let result = self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(self.health_timeout)
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Ollama health check failed");
                false
            }
        }
    }

    async fn summarize(
        &self,
        events: &[ChangeEvent],
        source_name: &str,
    ) -> Result<ChangeAnalysis, SummaryError> {
        let start = std::time::Instant::now();
        let request = GenerateRequest {
            model: &self.model,
            prompt: Self::build_prompt(events, source_name),
            stream: false,
            options: GenerateOptions {
                temperature: 0.3,
                num_predict: 200,
            },
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Ollama request failed");
                SummaryError::Http(Box::new(e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Ollama API error");
            return Err(SummaryError::InvalidResponse(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| SummaryError::InvalidResponse(e.to_string()))?;

        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "Ollama summary generated"
        );

        Ok(parse_answer(&body.response))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Change;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn events() -> Vec<ChangeEvent> {
        vec![ChangeEvent::new(
            Change::HeadingsAdded {
                items: vec!["Convocatoria 2025".to_string()],
            },
            Priority::High,
        )]
    }

    #[test]
    fn test_relevance_mapping() {
        assert_eq!(relevance_to_priority("ALTA"), Priority::Urgent);
        assert_eq!(relevance_to_priority("high"), Priority::Urgent);
        assert_eq!(relevance_to_priority("MEDIA"), Priority::Normal);
        assert_eq!(relevance_to_priority("Medium"), Priority::Normal);
        assert_eq!(relevance_to_priority("BAJA"), Priority::Low);
        assert_eq!(relevance_to_priority("LOW"), Priority::Low);
        assert_eq!(relevance_to_priority("???"), Priority::Normal);
    }

    #[test]
    fn test_parse_fenced_json() {
        let answer = parse_answer(
            "```json\n{\"summary\": \"Nueva convocatoria\", \"relevance\": \"ALTA\", \"keywords\": [\"beca\"]}\n```",
        );
        assert_eq!(answer.summary, "Nueva convocatoria");
        assert_eq!(answer.priority, Priority::Urgent);
        assert_eq!(answer.keywords, vec!["beca".to_string()]);
    }

    #[test]
    fn test_parse_free_text_truncates() {
        let text = "x".repeat(400);
        let answer = parse_answer(&text);
        assert_eq!(answer.summary.chars().count(), 150);
        assert_eq!(answer.priority, Priority::Normal);
        assert!(answer.keywords.is_empty());
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"models": []})))
            .mount(&server)
            .await;

        assert!(OllamaSummarizer::new(server.uri(), "llama3.1").is_available().await);
        assert!(
            !OllamaSummarizer::new("http://127.0.0.1:1", "llama3.1")
                .with_health_timeout(Duration::from_millis(200))
                .is_available()
                .await
        );
    }

    #[tokio::test]
    async fn test_summarize_parses_json_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama3.1",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llama3.1",
                "response": "{\"summary\": \"Se abre la convocatoria 2025\", \"relevance\": \"MEDIA\", \"keywords\": [\"convocatoria\", \"2025\"]}",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let analysis = OllamaSummarizer::new(server.uri(), "llama3.1")
            .summarize(&events(), "Fundación Ejemplo")
            .await
            .unwrap();

        assert_eq!(analysis.summary, "Se abre la convocatoria 2025");
        assert_eq!(analysis.priority, Priority::Normal);
        assert_eq!(analysis.keywords.len(), 2);
        assert!(analysis.ai_generated);
    }

    #[tokio::test]
    async fn test_summarize_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let err = OllamaSummarizer::new(server.uri(), "llama3.1")
            .summarize(&events(), "Fundación Ejemplo")
            .await
            .unwrap_err();

        assert!(matches!(err, SummaryError::InvalidResponse(_)));
    }
}
