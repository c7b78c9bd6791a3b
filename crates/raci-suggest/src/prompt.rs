use raci_core::{MAX_ROLES, MAX_ROLE_NAME_LEN};

use crate::InferenceRequest;

/// Hard limit on the user prompt sent to the inference endpoint.
pub const PROMPT_BUDGET: usize = 1900;
/// Description characters kept before seed roles are dropped.
const MIN_DESCRIPTION_ROOM: usize = 200;
const ELLIPSIS: &str = "...";

pub fn system_prompt() -> String {
    format!(
        "You are a project-organisation assistant. From a project description, infer the roles \
involved, the main tasks, and a RACI matrix assigning each role to each task.\n\n\
Output ONLY a JSON object with this shape:\n\
{{\"roles\":[{{\"id\":\"role-1\",\"name\":\"Project Manager\"}}],\
\"tasks\":[{{\"id\":\"task-1\",\"name\":\"Planning\"}}],\
\"matrix\":{{\"task-1\":{{\"Project Manager\":\"A\"}}}},\
\"followUpQuestions\":[\"...\"]}}\n\n\
- The matrix is keyed by task id, then by role name. Each cell is one of \"R\", \"A\", \"C\", \"I\" or \"\".\n\
- Use 3-8 roles and 5-10 tasks unless the description clearly calls for fewer.\n\
- Ask at most 3 follow-up questions, only when an answer would change the matrix. \
Use an empty array when the description is clear.\n\
- Keep names short (roles at most 50 characters, tasks at most 100).\n\n\
## RACI Rules\n{}\n\n\
Output ONLY the JSON object, nothing else.",
        raci_core::rules::RULES
    )
}

/// Seed names as they would be stored: trimmed, clipped, at most [`MAX_ROLES`].
fn seed_names(req: &InferenceRequest) -> Vec<String> {
    req.seed_roles
        .iter()
        .map(|r| r.trim().chars().take(MAX_ROLE_NAME_LEN).collect::<String>())
        .filter(|r| !r.is_empty())
        .take(MAX_ROLES)
        .collect()
}

fn section_seed_roles(roles: &[String]) -> String {
    if roles.is_empty() {
        return String::new();
    }
    format!(
        "\nUse these roles (add others only if clearly needed): {}\n",
        roles.join(", ")
    )
}

fn section_existing(req: &InferenceRequest) -> String {
    let Some(existing) = req.existing.as_ref().filter(|_| req.keep_existing_data) else {
        return String::new();
    };
    let mut out = String::new();
    if !existing.roles.is_empty() {
        let names: Vec<&str> = existing.roles.iter().map(|r| r.name.as_str()).collect();
        out.push_str("\nExisting roles: ");
        out.push_str(&names.join(", "));
        out.push('\n');
    }
    if !existing.tasks.is_empty() {
        let names: Vec<&str> = existing.tasks.iter().map(|t| t.name.as_str()).collect();
        out.push_str("Existing tasks: ");
        out.push_str(&names.join(", "));
        out.push('\n');
    }
    out
}

fn section_answers(req: &InferenceRequest) -> String {
    if req.previous_answers.is_empty() {
        return String::new();
    }
    let mut out = String::from("\nAnswers to earlier follow-up questions:\n");
    for (question, answer) in &req.previous_answers {
        out.push_str("Q: ");
        out.push_str(question.trim());
        out.push_str("\nA: ");
        out.push_str(answer.trim());
        out.push('\n');
    }
    out
}

fn compose(description: &str, sections: &[&str]) -> String {
    let mut out = String::with_capacity(PROMPT_BUDGET);
    out.push_str("Create a RACI matrix for this project.\n\nProject description:\n");
    out.push_str(description.trim());
    out.push('\n');
    for s in sections {
        out.push_str(s);
    }
    out
}

fn fits(prompt: &str) -> bool {
    prompt.chars().count() <= PROMPT_BUDGET
}

/// Assemble the user prompt within [`PROMPT_BUDGET`].
///
/// Sections are dropped in order (earlier answers, then existing names) and
/// only then is the description truncated. Trailing seed roles give way when
/// they would leave the description less than [`MIN_DESCRIPTION_ROOM`].
pub fn build_prompt(req: &InferenceRequest) -> String {
    let mut seeds = seed_names(req);
    let mut seed_section = section_seed_roles(&seeds);
    let existing = section_existing(req);
    let answers = section_answers(req);

    for sections in [
        vec![seed_section.as_str(), existing.as_str(), answers.as_str()],
        vec![seed_section.as_str(), existing.as_str()],
        vec![seed_section.as_str()],
    ] {
        let prompt = compose(&req.description, &sections);
        if fits(&prompt) {
            return prompt;
        }
    }

    let description_len = req.description.trim().chars().count();
    let wanted = description_len.min(MIN_DESCRIPTION_ROOM) + ELLIPSIS.len();
    let overhead = |section: &str| compose("", &[section]).chars().count();
    while !seeds.is_empty() && overhead(&seed_section) + wanted > PROMPT_BUDGET {
        seeds.pop();
        seed_section = section_seed_roles(&seeds);
    }

    let prompt = compose(&req.description, &[seed_section.as_str()]);
    if fits(&prompt) {
        return prompt;
    }
    let room = PROMPT_BUDGET.saturating_sub(overhead(&seed_section) + ELLIPSIS.len());
    let mut truncated: String = req.description.trim().chars().take(room).collect();
    truncated.push_str(ELLIPSIS);
    compose(&truncated, &[seed_section.as_str()])
}

pub fn title_system_prompt() -> &'static str {
    "You name projects. Reply with a short title (2 to 6 words) for the project described by the \
user. Output only the title, without quotes or punctuation at the end."
}

pub fn title_prompt(description: &str) -> String {
    let room = PROMPT_BUDGET - 40;
    let description: String = description.trim().chars().take(room).collect();
    format!("Project description:\n{}\n\nTitle:", description)
}
