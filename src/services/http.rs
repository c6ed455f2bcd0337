use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::StatusCode;

use crate::config::ServiceConfig;
use crate::foundation::error::{ReelError, ReelResult};
use crate::services::{Planner, PlanningError, SynthesisError, Synthesizer};
use crate::step::Step;

const HTTP_RETRY_MAX_ATTEMPTS: usize = 3;
const HTTP_RETRY_BASE_BACKOFF_MS: u64 = 250;

fn build_client(cfg: &ServiceConfig) -> ReelResult<(reqwest::Client, String)> {
    let url = cfg
        .url
        .clone()
        .ok_or_else(|| ReelError::validation("service url is not configured"))?;
    let client = reqwest::Client::builder()
        .user_agent(concat!("sketchreel/", env!("CARGO_PKG_VERSION")))
        .timeout(cfg.timeout)
        .build()
        .map_err(|e| ReelError::validation(format!("build http client: {e}")))?;
    Ok((client, url))
}

fn is_retriable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retriable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn retry_backoff(attempt: usize) -> Duration {
    let exp = attempt.saturating_sub(1).min(4) as u32;
    Duration::from_millis(HTTP_RETRY_BASE_BACKOFF_MS * (1 << exp))
}

/// Outcome of one POST after retries.
enum Posted {
    Ok(reqwest::Response),
    RateLimited,
}

async fn post_json(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    body: &serde_json::Value,
    op_name: &str,
) -> Result<Posted, String> {
    let mut last_error = None;
    for attempt in 1..=HTTP_RETRY_MAX_ATTEMPTS {
        let mut req = client.post(url).json(body);
        if let Some(key) = api_key {
            req = req.bearer_auth(key);
        }
        match req.send().await {
            Ok(resp) => {
                let status = resp.status();
                if status == StatusCode::TOO_MANY_REQUESTS {
                    return Ok(Posted::RateLimited);
                }
                if status.is_success() {
                    return Ok(Posted::Ok(resp));
                }
                if is_retriable_status(status) && attempt < HTTP_RETRY_MAX_ATTEMPTS {
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    continue;
                }
                let text = resp.text().await.unwrap_or_default();
                let snippet: String = text.chars().take(200).collect();
                last_error = Some(format!("{op_name} failed with status {status}: {snippet}"));
                break;
            }
            Err(err) => {
                if is_retriable_error(&err) && attempt < HTTP_RETRY_MAX_ATTEMPTS {
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    continue;
                }
                last_error = Some(format!("{op_name} request failed: {err}"));
                break;
            }
        }
    }
    Err(last_error.unwrap_or_else(|| format!("{op_name} failed")))
}

/// Speech service client: `POST {"text": ...}`.
///
/// A `429` maps to [`SynthesisError::RateLimited`]. A JSON response must carry base64 audio in
/// `audio`; any other content type is taken as the audio bytes themselves.
#[derive(Clone, Debug)]
pub struct HttpSynthesizer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpSynthesizer {
    pub fn new(cfg: &ServiceConfig) -> ReelResult<Self> {
        let (client, url) = build_client(cfg)?;
        Ok(Self {
            client,
            url,
            api_key: cfg.api_key.clone(),
        })
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let body = serde_json::json!({ "text": text });
        let resp = match post_json(
            &self.client,
            &self.url,
            self.api_key.as_deref(),
            &body,
            "synthesize",
        )
        .await
        .map_err(SynthesisError::Failed)?
        {
            Posted::Ok(resp) => resp,
            Posted::RateLimited => return Err(SynthesisError::RateLimited),
        };

        let is_json = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SynthesisError::Failed(format!("read audio body: {e}")))?;
        if is_json {
            decode_audio_json(&bytes)
        } else {
            Ok(bytes.to_vec())
        }
    }
}

fn decode_audio_json(bytes: &[u8]) -> Result<Vec<u8>, SynthesisError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| SynthesisError::Failed(format!("parse synthesis json: {e}")))?;
    if value.get("error").and_then(|e| e.get("code")).and_then(|c| c.as_u64()) == Some(429) {
        return Err(SynthesisError::RateLimited);
    }
    let audio = value
        .get("audio")
        .and_then(|a| a.as_str())
        .ok_or_else(|| SynthesisError::Failed("synthesis json has no 'audio' field".to_owned()))?;
    base64::engine::general_purpose::STANDARD
        .decode(audio.trim())
        .map_err(|e| SynthesisError::Failed(format!("decode base64 audio: {e}")))
}

/// Planning service client.
///
/// `POST {url}` with `{"query"}` returns `{"steps": [...]}` (or a bare array);
/// `POST {url}/code` with `{"title", "description"}` returns `{"code"}`.
#[derive(Clone, Debug)]
pub struct HttpPlanner {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpPlanner {
    pub fn new(cfg: &ServiceConfig) -> ReelResult<Self> {
        let (client, url) = build_client(cfg)?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_owned(),
            api_key: cfg.api_key.clone(),
        })
    }

    async fn post(&self, url: &str, body: serde_json::Value) -> Result<serde_json::Value, PlanningError> {
        match post_json(&self.client, url, self.api_key.as_deref(), &body, "plan")
            .await
            .map_err(PlanningError::Failed)?
        {
            Posted::Ok(resp) => resp
                .json()
                .await
                .map_err(|e| PlanningError::Failed(format!("parse planner json: {e}"))),
            Posted::RateLimited => Err(PlanningError::Failed(
                "planner rate limited".to_owned(),
            )),
        }
    }
}

#[async_trait]
impl Planner for HttpPlanner {
    async fn generate_steps(&self, query: &str) -> Result<Vec<Step>, PlanningError> {
        let value = self.post(&self.url, serde_json::json!({ "query": query })).await?;
        parse_steps_value(value)
    }

    async fn regenerate_step_code(
        &self,
        title: &str,
        description: &str,
    ) -> Result<String, PlanningError> {
        let url = format!("{}/code", self.url);
        let value = self
            .post(
                &url,
                serde_json::json!({ "title": title, "description": description }),
            )
            .await?;
        value
            .get("code")
            .and_then(|c| c.as_str())
            .filter(|c| !c.trim().is_empty())
            .map(str::to_owned)
            .ok_or_else(|| PlanningError::Failed("planner returned no code".to_owned()))
    }
}

fn parse_steps_value(value: serde_json::Value) -> Result<Vec<Step>, PlanningError> {
    let array = match value {
        serde_json::Value::Object(mut obj) => obj
            .remove("steps")
            .ok_or_else(|| PlanningError::Failed("planner json has no 'steps'".to_owned()))?,
        other => other,
    };
    let steps: Vec<Step> = serde_json::from_value(array)
        .map_err(|e| PlanningError::Failed(format!("invalid steps: {e}")))?;
    if steps.is_empty() {
        return Err(PlanningError::Empty);
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_json_is_base64_decoded() {
        let body = br#"{"audio": "UklGRg=="}"#;
        assert_eq!(decode_audio_json(body).unwrap(), b"RIFF");
        assert_eq!(
            decode_audio_json(br#"{"error": {"code": 429}}"#).unwrap_err(),
            SynthesisError::RateLimited
        );
        assert!(matches!(
            decode_audio_json(br#"{"text": "x"}"#),
            Err(SynthesisError::Failed(_))
        ));
    }

    #[test]
    fn steps_accept_object_or_array() {
        let obj = serde_json::json!({"steps": [{"title": "t", "description": "d", "code": "c"}]});
        assert_eq!(parse_steps_value(obj).unwrap().len(), 1);
        let arr = serde_json::json!([{"title": "t", "description": "d", "code": "c"}]);
        assert_eq!(parse_steps_value(arr).unwrap().len(), 1);
        assert_eq!(
            parse_steps_value(serde_json::json!({"steps": []})).unwrap_err(),
            PlanningError::Empty
        );
    }

    #[test]
    fn clients_require_a_url() {
        assert!(HttpSynthesizer::new(&ServiceConfig::default()).is_err());
        let cfg = ServiceConfig {
            url: Some("http://localhost:9/plan/".to_owned()),
            ..ServiceConfig::default()
        };
        assert_eq!(HttpPlanner::new(&cfg).unwrap().url, "http://localhost:9/plan");
    }

    #[test]
    fn backoff_grows() {
        assert!(retry_backoff(2) > retry_backoff(1));
    }
}
