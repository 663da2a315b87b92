// All LLM prompt constants for the screening module.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for requirement extraction.
pub const REQUIREMENTS_SYSTEM: &str = "You are an experienced technical recruiter. \
    You read job descriptions and list the concrete, checkable requirements a CV can be screened against.";

/// Requirement extraction prompt template. Replace `{json_only}` and `{job_text}` before sending.
pub const REQUIREMENTS_PROMPT_TEMPLATE: &str = r#"{json_only}

List the requirements in the job description below.

Return a JSON object with this EXACT schema:
{
  "requirements": [
    {"text": "5+ years of backend development", "must_have": true},
    {"text": "Experience with Kubernetes", "must_have": false}
  ]
}

Rules:
- One requirement per item, phrased so it can be verified from a CV.
- must_have = true for explicit must-haves ("required", "must", "minimum", "you have").
- must_have = false for nice-to-haves ("preferred", "bonus", "a plus").
- Never include personal attributes (age, gender, nationality, family status).
- At most 20 items, most important first.

JOB DESCRIPTION:
{job_text}"#;

/// System prompt for CV assessment.
pub const ASSESSMENT_SYSTEM: &str = "You are a meticulous, impartial recruiter screening CVs \
    against a fixed list of requirements. You only credit what the CV actually shows.";

/// CV assessment prompt template.
/// Replace: {json_only}, {fairness_instruction}, {job_text}, {requirements_json}, {cv_text}
pub const ASSESSMENT_PROMPT_TEMPLATE: &str = r#"{json_only}

{fairness_instruction}

JOB DESCRIPTION:
{job_text}

REQUIREMENTS TO ASSESS (numbered):
{requirements_json}

CANDIDATE CV (anonymized excerpt):
{cv_text}

Assess the CV against EVERY numbered requirement. Return a JSON object:
{
  "candidate_name": "Name as written on the CV, or null",
  "requirements": [
    {
      "index": 1,
      "requirement": "the requirement text, copied exactly",
      "status": "met",
      "evidence": "Short quote or paraphrase from the CV that supports the status"
    }
  ],
  "summary": "Two sentences on overall fit for this role"
}

HARD RULES:
1. `status` is exactly one of "met", "partial", "missing"
2. "met" needs explicit evidence in the CV; related but weaker evidence is "partial"
3. No evidence at all is "missing" with an empty evidence string
4. Return one item per numbered requirement, in the same order"#;
