//! Deterministic matrix generation used when the AI call fails.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use crate::matrix::create_empty_matrix;
use crate::reconcile::{generate_suggestions, Confidence, InferenceResult};
use crate::{name_key, RaciKey, RaciValue, Role, Task, MAX_ROLES, MAX_ROLE_NAME_LEN};

/// Pattern → canonical role name. Checked in this order.
const ROLE_KEYWORDS: &[(&str, &str)] = &[
    (r"(?i)project\s+manager|\bpms?\b", "Project Manager"),
    (r"(?i)product\s+owner|\bpo\b", "Product Owner"),
    (r"(?i)scrum\s*master", "Scrum Master"),
    (r"(?i)business\s+analyst|\bba\b", "Business Analyst"),
    (r"(?i)architect", "Architect"),
    (r"(?i)designer|\bux\b|\bui\b", "Designer"),
    (r"(?i)developer|\bdevs?\b|programmer|software\s+engineer", "Developer"),
    (r"(?i)\bqa\b|quality\s+assurance|tester", "QA Engineer"),
    (r"(?i)devops|\bsre\b|operations", "DevOps Engineer"),
    (r"(?i)stakeholder|sponsor|client|customer", "Stakeholder"),
];

const DEFAULT_ROLES: &[&str] = &["Project Manager", "Developer", "QA Engineer"];

pub const FALLBACK_TASKS: &[&str] = &[
    "Planning",
    "Design & Architecture",
    "Development",
    "Testing",
    "Deployment",
];

fn role_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        ROLE_KEYWORDS
            .iter()
            .map(|(pattern, name)| (Regex::new(pattern).expect("valid role pattern"), *name))
            .collect()
    })
}

/// Canonical role names mentioned in the description, in table order.
pub fn extract_roles(description: &str) -> Vec<String> {
    role_patterns()
        .iter()
        .filter(|(re, _)| re.is_match(description))
        .map(|(_, name)| name.to_string())
        .collect()
}

/// Seed roles if any, else roles found in the description, else the defaults.
fn choose_roles(description: &str, seed_roles: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let seeds: Vec<String> = seed_roles
        .iter()
        .map(|s| s.trim().chars().take(MAX_ROLE_NAME_LEN).collect::<String>())
        .filter(|s| !s.is_empty() && seen.insert(name_key(s)))
        .take(MAX_ROLES)
        .collect();
    if !seeds.is_empty() {
        return seeds;
    }

    let found = extract_roles(description);
    if !found.is_empty() {
        return found;
    }

    DEFAULT_ROLES.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoleFamily {
    Manager,
    Designer,
    Developer,
    Tester,
    Operations,
    Other,
}

fn family(role_name: &str) -> RoleFamily {
    let n = role_name.to_lowercase();
    let has_word = |w: &str| n.split(|c: char| !c.is_alphanumeric()).any(|part| part == w);

    if n.contains("project manager") || n.contains("product owner") || has_word("pm") {
        RoleFamily::Manager
    } else if n.contains("qa") || n.contains("test") || n.contains("quality") {
        RoleFamily::Tester
    } else if n.contains("devops") || n.contains("operations") {
        RoleFamily::Operations
    } else if n.contains("developer") || has_word("dev") || n.contains("engineer") {
        RoleFamily::Developer
    } else if n.contains("architect") || n.contains("design") {
        RoleFamily::Designer
    } else {
        RoleFamily::Other
    }
}

/// Whether a role family naturally owns a task, keyed on the task name.
fn owns(family: RoleFamily, task: &str) -> bool {
    let t = task.to_lowercase();
    match family {
        RoleFamily::Manager => t.contains("planning"),
        RoleFamily::Designer => t.contains("design"),
        RoleFamily::Developer => t.contains("development"),
        RoleFamily::Tester => t.contains("test"),
        RoleFamily::Operations => t.contains("deploy"),
        RoleFamily::Other => false,
    }
}

/// Non-accountable involvement of a role family in a task.
fn involvement(family: RoleFamily, task: &str) -> RaciKey {
    let t = task.to_lowercase();
    match family {
        RoleFamily::Manager => RaciKey::C,
        RoleFamily::Developer if t.contains("planning") => RaciKey::C,
        RoleFamily::Developer => RaciKey::R,
        RoleFamily::Tester if t.contains("development") || t.contains("deploy") => RaciKey::C,
        RoleFamily::Designer if t.contains("development") => RaciKey::C,
        RoleFamily::Operations if t.contains("development") || t.contains("test") => RaciKey::C,
        RoleFamily::Other if t.contains("planning") => RaciKey::C,
        _ => RaciKey::I,
    }
}

/// Rule-based inference. Always yields exactly one Accountable per task.
pub fn fallback_inference(description: &str, seed_roles: &[String]) -> InferenceResult {
    let roles: Vec<Role> = choose_roles(description, seed_roles)
        .into_iter()
        .enumerate()
        .map(|(i, name)| Role::new(format!("role-{}", i + 1), name))
        .collect();
    let tasks: Vec<Task> = FALLBACK_TASKS
        .iter()
        .enumerate()
        .map(|(i, name)| Task::new(format!("task-{}", i + 1), *name))
        .collect();

    let families: Vec<RoleFamily> = roles.iter().map(|r| family(&r.name)).collect();
    let mut matrix = create_empty_matrix(&roles, &tasks);
    for task in &tasks {
        let accountable = families
            .iter()
            .position(|f| owns(*f, &task.name))
            // Deployment sign-off sits with management when nobody runs operations.
            .or_else(|| {
                task.name
                    .to_lowercase()
                    .contains("deploy")
                    .then(|| families.iter().position(|f| *f == RoleFamily::Manager))
                    .flatten()
            })
            .unwrap_or(0);

        for (idx, role) in roles.iter().enumerate() {
            let key = if idx == accountable {
                RaciKey::A
            } else {
                involvement(families[idx], &task.name)
            };
            matrix.insert(&task.id, &role.name, RaciValue::from_key(key));
        }
    }

    info!(
        roles = roles.len(),
        tasks = tasks.len(),
        "generated fallback matrix"
    );

    let suggestions = generate_suggestions(&roles, &tasks, &matrix);
    InferenceResult {
        roles,
        tasks,
        matrix,
        follow_up_questions: Vec::new(),
        confidence: Some(Confidence::Low),
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(result: &InferenceResult) -> Vec<&str> {
        result.roles.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn extracts_roles_by_keyword() {
        assert_eq!(
            extract_roles("mobile app with PM, 3 developers, QA"),
            vec!["Project Manager", "Developer", "QA Engineer"]
        );
        assert_eq!(extract_roles("a UX designer and two devs"), vec!["Designer", "Developer"]);
        assert!(extract_roles("nothing relevant here").is_empty());
    }

    #[test]
    fn keyword_boundaries_avoid_false_matches() {
        // "development" must not become Developer, "pmo" must not become PM.
        assert!(extract_roles("pmo backlog development").is_empty());
    }

    #[test]
    fn seed_roles_take_precedence() {
        let seeds = vec!["Lead".to_string(), " lead ".to_string(), "Ops".to_string()];
        let result = fallback_inference("PM and developers", &seeds);
        assert_eq!(names(&result), vec!["Lead", "Ops"]);
    }

    #[test]
    fn defaults_when_nothing_matches() {
        let result = fallback_inference("a thing", &[]);
        assert_eq!(names(&result), vec!["Project Manager", "Developer", "QA Engineer"]);
        assert_eq!(result.tasks.len(), 5);
        assert_eq!(result.confidence, Some(Confidence::Low));
    }

    #[test]
    fn owners_are_accountable() {
        let result = fallback_inference("a thing", &[]);
        let accountable: Vec<&str> = result
            .tasks
            .iter()
            .map(|t| {
                result
                    .roles
                    .iter()
                    .find(|r| result.matrix.cell(&t.id, &r.name).a)
                    .map(|r| r.name.as_str())
                    .unwrap()
            })
            .collect();
        assert_eq!(
            accountable,
            vec![
                "Project Manager",
                "Project Manager",
                "Developer",
                "QA Engineer",
                "Project Manager"
            ]
        );
    }

    #[test]
    fn every_task_has_exactly_one_accountable() {
        for seeds in [
            vec![],
            vec!["Sales".to_string(), "Legal".to_string()],
            vec!["Architect".to_string(), "DevOps".to_string(), "Tester".to_string()],
        ] {
            let result = fallback_inference("something", &seeds);
            for task in &result.tasks {
                let count = result
                    .roles
                    .iter()
                    .filter(|r| result.matrix.cell(&task.id, &r.name).a)
                    .count();
                assert_eq!(count, 1, "task {} with seeds {:?}", task.name, seeds);
            }
        }
    }

    #[test]
    fn output_is_deterministic() {
        let a = fallback_inference("web platform with architect and sre", &[]);
        let b = fallback_inference("web platform with architect and sre", &[]);
        assert_eq!(a, b);
    }
}
