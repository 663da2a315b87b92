// Shared prompt constants.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with a single valid JSON object only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended to every prompt that carries candidate material.
pub const FAIRNESS_INSTRUCTION: &str = "\
    Judge only demonstrated skills, experience and qualifications. \
    Personal details have been redacted and replaced with placeholders such as [EMAIL], \
    [PHONE], [ADDRESS], [AGE] or [GENDER]. Never speculate about them and never let \
    them, or a candidate's name, influence the assessment.";

/// Fills `{name}` placeholders in a single pass over the template.
///
/// Substituted values are never rescanned, so user text that contains a
/// placeholder stays literal. Braces that name no known key are kept as is.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let extra: usize = values.iter().map(|(_, v)| v.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let known = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match known {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
