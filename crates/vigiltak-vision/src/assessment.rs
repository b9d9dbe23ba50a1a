//! Assessment extraction from model output.
//!
//! Vision models rarely return bare JSON even when told to: answers come
//! fenced in markdown, prefixed with prose, or with a trailing comma
//! that strict JSON rejects. Extraction takes the first balanced object
//! out of the text and repairs trailing commas before giving up.

use crate::VisionError;
use serde::{Deserialize, Serialize};

/// What the model saw in one image. Every field is optional; models
/// omit keys they are unsure about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    #[serde(default)]
    pub people_count: Option<i64>,

    #[serde(default)]
    pub hostiles: Option<bool>,

    #[serde(default)]
    pub weapons_detected: Option<bool>,

    /// The prompt asks for a capitalized `Hazards` key, so both
    /// spellings are accepted.
    #[serde(default, alias = "Hazards")]
    pub hazards: Option<bool>,

    #[serde(default)]
    pub rubble: Option<bool>,
}

/// Pulls an [`Assessment`] out of raw model text.
pub fn extract_assessment(text: &str) -> Result<Assessment, VisionError> {
    let object = first_balanced_object(text).ok_or_else(|| VisionError::MalformedAssessment {
        reason: format!("no JSON object in response: {}", preview(text)),
    })?;
    match serde_json::from_str(object) {
        Ok(assessment) => Ok(assessment),
        Err(strict_err) => {
            let repaired = strip_trailing_commas(object);
            serde_json::from_str(&repaired).map_err(|_| VisionError::MalformedAssessment {
                reason: format!("{strict_err}: {}", preview(object)),
            })
        }
    }
}

/// First `{...}` with balanced braces, string-aware.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drops commas that sit directly before a closing brace or bracket.
fn strip_trailing_commas(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;
    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > 120 {
        let cut: String = trimmed.chars().take(120).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}
