//! Local title synthesis for when the title endpoint is unavailable.

use crate::MAX_TITLE_LEN;

const DOMAINS: &[(&str, &str)] = &[
    ("mobile", "Mobile"),
    ("ios", "Mobile"),
    ("android", "Mobile"),
    ("e-commerce", "E-commerce"),
    ("ecommerce", "E-commerce"),
    ("online store", "E-commerce"),
    ("healthcare", "Healthcare"),
    ("medical", "Healthcare"),
    ("fintech", "Fintech"),
    ("banking", "Banking"),
    ("payment", "Payments"),
    ("education", "Education"),
    ("marketing", "Marketing"),
    ("data", "Data"),
    ("cloud", "Cloud"),
    ("web", "Web"),
];

const PROJECTS: &[(&str, &str)] = &[
    ("app", "App"),
    ("application", "App"),
    ("website", "Website"),
    ("site", "Website"),
    ("platform", "Platform"),
    ("api", "API"),
    ("dashboard", "Dashboard"),
    ("portal", "Portal"),
    ("system", "System"),
    ("campaign", "Campaign"),
    ("pipeline", "Pipeline"),
    ("infrastructure", "Infrastructure"),
];

const ACTIONS: &[(&str, &str)] = &[
    ("migrate", "Migration"),
    ("migration", "Migration"),
    ("redesign", "Redesign"),
    ("launch", "Launch"),
    ("implement", "Implementation"),
    ("integrate", "Integration"),
    ("integration", "Integration"),
    ("upgrade", "Upgrade"),
    ("build", "Development"),
    ("develop", "Development"),
    ("create", "Development"),
    ("rollout", "Rollout"),
];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "of", "for", "to", "in", "on", "with", "we", "our", "is",
    "are", "be", "will", "need", "needs", "want", "that", "this", "it", "new", "by", "from",
];

const MAX_FALLBACK_WORDS: usize = 4;
pub const UNTITLED: &str = "Untitled RACI Matrix";

fn words(description: &str) -> Vec<String> {
    description
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn first_match(words: &[String], text: &str, table: &[(&str, &'static str)]) -> Option<&'static str> {
    table.iter().find_map(|(keyword, label)| {
        let hit = if keyword.contains(' ') {
            text.contains(keyword)
        } else {
            words.iter().any(|w| w.as_str() == *keyword)
        };
        hit.then_some(*label)
    })
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Build a short title like "Mobile App Development" from keyword hits, or
/// from the first meaningful words of the description.
pub fn synthesize_title(description: &str) -> String {
    let text = description.to_lowercase();
    let words = words(description);

    let domain = first_match(&words, &text, DOMAINS);
    let project = first_match(&words, &text, PROJECTS);
    let action = first_match(&words, &text, ACTIONS);

    if domain.is_some() || project.is_some() {
        let parts: Vec<&str> = [domain, project, action.or(Some("Project"))]
            .into_iter()
            .flatten()
            .collect();
        return parts.join(" ");
    }

    let meaningful: Vec<String> = words
        .iter()
        .filter(|w| !STOPWORDS.contains(&w.as_str()) && !w.chars().all(|c| c.is_ascii_digit()))
        .take(MAX_FALLBACK_WORDS)
        .map(|w| title_case(w))
        .collect();

    match bounded_join(&meaningful, MAX_TITLE_LEN) {
        Some(title) => title,
        None => UNTITLED.to_string(),
    }
}

/// Join whole words while the result stays within `max` characters. A lone
/// first word that is already too long is clipped instead.
fn bounded_join(words: &[String], max: usize) -> Option<String> {
    let first = words.first()?;
    let mut title: String = first.chars().take(max).collect();
    let mut len = title.chars().count();
    for word in &words[1..] {
        let next = len + 1 + word.chars().count();
        if next > max {
            break;
        }
        title.push(' ');
        title.push_str(word);
        len = next;
    }
    Some(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combines_domain_project_and_action() {
        assert_eq!(
            synthesize_title("Build a mobile app with PM, 3 developers, QA"),
            "Mobile App Development"
        );
        assert_eq!(
            synthesize_title("We will migrate our e-commerce platform to the cloud"),
            "E-commerce Platform Migration"
        );
    }

    #[test]
    fn project_without_action_gets_generic_suffix() {
        assert_eq!(synthesize_title("A dashboard for sales"), "Dashboard Project");
    }

    #[test]
    fn falls_back_to_meaningful_words() {
        assert_eq!(
            synthesize_title("Quarterly office relocation for 40 staff members"),
            "Quarterly Office Relocation Staff"
        );
        assert_eq!(synthesize_title("   "), UNTITLED);
    }

    #[test]
    fn long_words_stay_within_title_limit() {
        let word = "x".repeat(40);
        let title = synthesize_title(&[word.as_str(); 4].join(" "));
        assert!(title.chars().count() <= MAX_TITLE_LEN);
        let capitalized = format!("X{}", "x".repeat(39));
        assert_eq!(title, format!("{capitalized} {capitalized}"));

        let title = synthesize_title(&"é".repeat(150));
        assert_eq!(title.chars().count(), MAX_TITLE_LEN);
        assert!(crate::RaciState::new("t", "", vec![], vec![]).with_title(&title).is_ok());
    }
}
