//! Tolerant parsing of oracle replies and application of their edits.

use mender_core::util::truncate;
use serde::Deserialize;

/// Marker the oracle may emit anywhere in its reply to hand the issue to a human.
pub const NEEDS_HUMAN_REVIEW: &str = "NEEDS_HUMAN_REVIEW";

const MAX_ERROR_CONTENT_LEN: usize = 200;

/// Redact anything that looks like a credential and cap the length.
pub(crate) fn sanitize_api_response(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "api_key",
        "apikey",
        "secret",
        "password",
        "credential",
        "bearer",
        "sk-",
    ];

    let truncated = truncate(content, MAX_ERROR_CONTENT_LEN);
    let lower = truncated.to_lowercase();
    if SECRET_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
        return "(response details redacted - may contain sensitive data)".to_string();
    }
    truncated
}

fn push_unique_candidate(candidates: &mut Vec<String>, candidate: impl Into<String>) {
    let candidate = candidate.into();
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return;
    }
    if !candidates.iter().any(|existing| existing == trimmed) {
        candidates.push(trimmed.to_string());
    }
}

fn strip_markdown_fences(content: &str) -> Option<String> {
    let trimmed = content.trim();
    let without_open = trimmed.strip_prefix("```")?;
    let body = match without_open.find('\n') {
        Some(newline) => &without_open[newline + 1..],
        None => without_open,
    };
    let end = body.rfind("```")?;
    Some(body[..end].trim().to_string())
}

fn extract_balanced_object(content: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in content[start..].char_indices() {
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
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&content[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

fn extract_object_candidates(content: &str, max_candidates: usize) -> Vec<String> {
    let mut out = Vec::new();
    for (idx, ch) in content.char_indices() {
        if out.len() >= max_candidates {
            break;
        }
        if ch == '{' {
            if let Some(candidate) = extract_balanced_object(content, idx) {
                push_unique_candidate(&mut out, candidate);
            }
        }
    }
    out
}

/// Parse JSON out of a reply that may carry fences, prose, or leading junk.
pub fn parse_structured_content<T>(content: &str) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let mut candidates = Vec::new();
    push_unique_candidate(&mut candidates, content);
    if let Some(stripped) = strip_markdown_fences(content) {
        push_unique_candidate(&mut candidates, stripped);
    }

    let mut idx = 0usize;
    while idx < candidates.len() {
        let current = candidates[idx].clone();
        for extracted in extract_object_candidates(&current, 4) {
            push_unique_candidate(&mut candidates, extracted);
        }
        idx += 1;
    }

    let mut last_err: Option<String> = None;
    for candidate in candidates {
        match serde_json::from_str::<T>(&candidate) {
            Ok(data) => return Ok(data),
            Err(err) => last_err = Some(err.to_string()),
        }
    }

    Err(anyhow::anyhow!(
        "Failed to parse structured response: {}\nContent: {}",
        last_err.unwrap_or_else(|| "unknown parse error".to_string()),
        sanitize_api_response(content)
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Fixed,
    NeedsReview,
    CannotFix,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EditOp {
    pub old_string: String,
    pub new_string: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FixReply {
    pub status: ReplyStatus,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub edits: Vec<EditOp>,
}

/// What a reply amounts to once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyVerdict {
    Edits { edits: Vec<EditOp>, reasoning: String },
    NeedsReview(String),
    Declined(String),
}

pub fn interpret_reply(content: &str) -> anyhow::Result<ReplyVerdict> {
    let parsed = parse_structured_content::<FixReply>(content);
    if content.contains(NEEDS_HUMAN_REVIEW) {
        let reason = parsed
            .as_ref()
            .map(|reply| reply.reasoning.trim().to_string())
            .ok()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "oracle flagged the change as ambiguous".to_string());
        return Ok(ReplyVerdict::NeedsReview(reason));
    }

    let reply = parsed?;
    let reasoning = reply.reasoning.trim().to_string();
    Ok(match reply.status {
        ReplyStatus::NeedsReview => ReplyVerdict::NeedsReview(reasoning),
        ReplyStatus::CannotFix => ReplyVerdict::Declined(reasoning),
        ReplyStatus::Fixed if reply.edits.is_empty() => {
            ReplyVerdict::Declined("reply marked fixed but carried no edits".to_string())
        }
        ReplyStatus::Fixed => ReplyVerdict::Edits {
            edits: reply.edits,
            reasoning,
        },
    })
}

/// Apply edits in order. Each `old_string` must occur exactly once in the
/// content as it stands when the edit is applied.
pub fn apply_edits(content: &str, edits: &[EditOp]) -> Result<String, String> {
    let mut out = content.to_string();
    for (i, edit) in edits.iter().enumerate() {
        if edit.old_string.is_empty() {
            return Err(format!("edit {}: old_string is empty", i + 1));
        }
        let count = out.matches(edit.old_string.as_str()).count();
        match count {
            1 => {
                if let Some(start) = out.find(edit.old_string.as_str()) {
                    out.replace_range(start..start + edit.old_string.len(), &edit.new_string);
                }
            }
            0 => {
                return Err(format!(
                    "edit {}: old_string not found: {:?}",
                    i + 1,
                    truncate(&edit.old_string, 60)
                ))
            }
            n => {
                return Err(format!(
                    "edit {}: old_string matches {} times (must be unique)",
                    i + 1,
                    n
                ))
            }
        }
    }
    Ok(out)
}
