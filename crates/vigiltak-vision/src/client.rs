//! Chat-completions client for the vision endpoint.

use crate::assessment::{extract_assessment, Assessment};
use crate::media::MediaFile;
use crate::VisionError;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use vigiltak_core::VisionConfig;

/// Identifies the agent to the endpoint.
pub const USER_AGENT: &str = "vigiltak-vision";

const ASSESSMENT_PROMPT: &str = "\
You are a visual analysis model focused on situational awareness.

Analyze the image and return a single raw JSON object with these exact keys:

{
  \"peopleCount\": <integer>,
  \"hostiles\": true/false,
  \"weaponsDetected\": true/false,
  \"Hazards\": true/false,
  \"rubble\": true/false
}

Definitions:
- peopleCount: number of distinct human people visible (ignore mannequins, posters, photos, statues).
- weaponsDetected: true if any weapons (guns, knives, explosives, etc.) are visible.
- hostiles: assume true if weapons are present, false otherwise.
- Hazards: true if hazards like fire, smoke, chemical spill, collapsed structures, or flood are visible.
- rubble: true if debris from destruction (collapsed walls, broken concrete, wreckage) is visible.

Rules:
- Always output all five keys.
- Use lowercase boolean true/false.
- If unsure, lean towards false, except peopleCount which should be your best estimate.
- Output must be only the JSON object with no commentary or formatting.";

pub struct VisionClient {
    http: reqwest::Client,
    config: VisionConfig,
}

impl VisionClient {
    pub fn new(config: VisionConfig) -> Result<Self, VisionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http, config })
    }

    /// Submits one image and returns the parsed assessment.
    pub async fn assess(&self, media: &MediaFile) -> Result<Assessment, VisionError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": ASSESSMENT_PROMPT },
                    { "type": "image_url", "image_url": { "url": media.data_url() } }
                ]
            }]
        });

        let mut request = self.http.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        debug!(
            path = %media.path.display(),
            model = %self.config.model,
            "submitting image for assessment"
        );
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(VisionError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VisionError::Endpoint {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let completion: ChatCompletion = response.json().await?;
        let content = completion
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or(VisionError::EmptyResponse)?;
        extract_assessment(content)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}
