//! System prompts for each fixer and ladder rung, plus the shared user prompt.

use super::parse::NEEDS_HUMAN_REVIEW;
use mender_core::Issue;

const RESPONSE_CONTRACT: &str = r#"
OUTPUT FORMAT (JSON only, no prose outside it):
{
  "status": "fixed" | "needs_review" | "cannot_fix",
  "reasoning": "one sentence explaining the change",
  "edits": [{"old_string": "exact text copied from the file", "new_string": "replacement"}]
}

EDIT RULES:
- old_string must appear exactly once in the file. Include surrounding lines when needed.
- Copy old_string verbatim, with the file's indentation. No ellipses or placeholders.
- Change only what the issue requires. Do not reformat unrelated code.
- If you cannot produce a safe fix, answer with status "cannot_fix" and no edits."#;

pub const GENERIC_MINIMAL: &str = "You are a careful maintenance engineer fixing one reported problem in a JavaScript/TypeScript codebase.
Make the smallest change that resolves the issue. Preserve behaviour, structure, and public signatures.";

pub const GENERIC_AGGRESSIVE: &str = "You are a maintenance engineer. A minimal fix for this issue already failed validation.
You may restructure the surrounding code, add guards or null checks, and adjust local types, as long as the module's exported behaviour is preserved.";

pub const GENERIC_LAST_RESORT: &str = "You are a maintenance engineer making a final attempt at an issue that resisted two earlier fixes.
You may use escape hatches (type assertions, `any`, disabling a lint rule on one line with a comment) when nothing cleaner works. The result must still parse and must not change runtime behaviour.";

pub const TYPE_MINIMAL: &str = "You fix TypeScript compiler errors.
Make a minimal, structure-preserving change: correct the types, imports, or signatures involved. Do not add casts or suppressions.";

pub const TYPE_GUARDED: &str = "You fix TypeScript compiler errors. A structure-preserving fix already failed.
You may add type assertions, type guards, optional chaining, and explicit null checks.";

pub const TYPE_LOOSENED: &str = "You fix TypeScript compiler errors as a last resort.
Loosened typing (`as unknown as T`, `any`, non-null assertions) is acceptable if the file stays syntactically valid and the runtime behaviour is unchanged.";

pub const COMPONENT: &str = "You fix bugs in React components and hooks. Follow these rules:
- Hooks are called unconditionally, at the top level, in the same order on every render.
- Effect, memo, and callback dependency arrays list every reactive value they read.
- Event handlers are typed (React.ChangeEvent, React.MouseEvent, ...), never `any`.
- State is updated immutably; derived values are not stored in state.
- Lists render with stable keys.";

/// The review sentinel is spelled out for the security prompt only.
pub fn security_system() -> String {
    format!(
        "You fix security problems. Correctness matters more than completeness.
- Never remove authentication, authorization, validation, sanitization, escaping, or permission checks.
- Never introduce eval, new Function, innerHTML assignment, dangerouslySetInnerHTML, or document.write.
- If the right fix depends on business rules you cannot see, reply with status \"needs_review\" and put {} in the reasoning.{}",
        NEEDS_HUMAN_REVIEW, RESPONSE_CONTRACT
    )
}

pub fn with_contract(system: &str) -> String {
    format!("{}\n{}", system, RESPONSE_CONTRACT)
}

/// Number each line so the oracle can relate the report to the code.
pub fn numbered_window(content: &str, center: u32, radius: u32) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() || center == 0 {
        return None;
    }
    let center = (center as usize).min(lines.len());
    let start = center.saturating_sub(radius as usize + 1);
    let end = (center + radius as usize).min(lines.len());
    Some(
        lines[start..end]
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let number = start + i + 1;
                let marker = if number == center { ">" } else { " " };
                format!("{}{:>5} | {}", marker, number, line)
            })
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

pub fn fix_user_prompt(issue: &Issue, content: &str, window: Option<&str>) -> String {
    let mut prompt = format!(
        "File: {}\nLocation: {}\nIssue type: {}\nSeverity: {}\n",
        issue.file.display(),
        issue.location_label(),
        issue.kind,
        issue.severity.as_str()
    );
    if let Some(rule) = &issue.rule {
        prompt.push_str(&format!("Rule: {}\n", rule));
    }
    prompt.push_str(&format!("Problem: {}\n", issue.description));
    if let Some(window) = window {
        prompt.push_str(&format!(
            "\nCode around the reported line:\n```\n{}\n```\n",
            window
        ));
    }
    prompt.push_str(&format!("\nCurrent file:\n```\n{}\n```\n", content));
    prompt.push_str("\nReturn the JSON object described above.");
    prompt
}
