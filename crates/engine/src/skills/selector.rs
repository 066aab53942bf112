use super::{GENERAL_SKILL, Skill};

/// Pick the skills relevant to a message, bounding how many tool
/// definitions reach the model in one turn.
///
/// Matching is case-insensitive: multi-word triggers match as substrings,
/// single-word triggers match whole tokens. Catalog declaration order
/// breaks ties; the cap truncates after ordering. Zero matches fall back
/// to the `general` skill.
pub fn select_skills<'a>(message: &str, catalog: &'a [Skill], max_skills: usize) -> Vec<&'a Skill> {
    let lowered = message.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric() && c != '/')
        .filter(|t| !t.is_empty())
        .collect();

    let mut selected: Vec<&Skill> = catalog
        .iter()
        .filter(|skill| skill_matches(skill, &lowered, &tokens))
        .collect();
    selected.truncate(max_skills.max(1));

    if selected.is_empty()
        && let Some(general) = catalog.iter().find(|skill| skill.name == GENERAL_SKILL)
    {
        selected.push(general);
    }

    selected
}

fn skill_matches(skill: &Skill, lowered: &str, tokens: &[&str]) -> bool {
    skill.triggers.iter().any(|trigger| {
        if trigger.contains(' ') {
            lowered.contains(trigger)
        } else {
            tokens.contains(trigger)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::builtin_catalog;

    fn names(selected: &[&Skill]) -> Vec<&'static str> {
        selected.iter().map(|skill| skill.name).collect()
    }

    #[test]
    fn keyword_match_picks_the_right_skill() {
        let catalog = builtin_catalog();
        let selected = select_skills("please write some ad copy for my shoe brand", &catalog, 3);
        assert_eq!(names(&selected), vec!["creative"]);
    }

    #[test]
    fn multiple_matches_keep_catalog_order() {
        let catalog = builtin_catalog();
        let selected = select_skills(
            "analyze the campaign performance and pause the losers",
            &catalog,
            3,
        );
        assert_eq!(names(&selected), vec!["analytics", "campaign"]);
    }

    #[test]
    fn selection_is_capped_at_the_configured_maximum() {
        let catalog = builtin_catalog();
        let selected = select_skills(
            "write copy, report on performance, adjust the campaign budget, and build a landing page",
            &catalog,
            3,
        );
        assert_eq!(selected.len(), 3);
        assert_eq!(names(&selected), vec!["creative", "analytics", "campaign"]);
    }

    #[test]
    fn no_match_falls_back_to_general_only() {
        let catalog = builtin_catalog();
        let selected = select_skills("hello there, how are you today?", &catalog, 3);
        assert_eq!(names(&selected), vec![GENERAL_SKILL]);
    }

    #[test]
    fn general_is_not_added_when_another_skill_matches() {
        let catalog = builtin_catalog();
        let selected = select_skills("show me conversion metrics", &catalog, 3);
        assert!(!names(&selected).contains(&GENERAL_SKILL));
    }

    #[test]
    fn matching_ignores_case_and_punctuation() {
        let catalog = builtin_catalog();
        let selected = select_skills("Which A/B variant won?", &catalog, 3);
        assert_eq!(names(&selected), vec!["analytics"]);
    }

    #[test]
    fn single_word_triggers_do_not_match_inside_other_words() {
        let catalog = builtin_catalog();
        // "copywriter" must not token-match the "copy" trigger.
        let selected = select_skills("I met a copywriter yesterday", &catalog, 3);
        assert_eq!(names(&selected), vec![GENERAL_SKILL]);
    }
}
