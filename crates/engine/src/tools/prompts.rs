//! Task prompts for model-backed skill tools. Each template pairs a system
//! prompt with an instruction; the validated tool arguments are appended
//! as the task input.

#[derive(Debug, Clone, Copy)]
pub struct SkillPromptTemplate {
    pub system_prompt: &'static str,
    pub task_prompt: &'static str,
}

pub fn template_for_model_skill(tool_name: &str) -> Option<SkillPromptTemplate> {
    let (system_prompt, task_prompt) = match tool_name {
        "generate_ad_copy" => (
            "You are an advertising copywriter. Produce punchy, channel-ready ad copy.",
            "Write the requested number of ad copy variants for the product below. \
             Vary the angle between variants. Return one variant per paragraph.",
        ),
        "suggest_headlines" => (
            "You are an advertising copywriter. Produce short, high-impact campaign headlines.",
            "Suggest headlines for the product below, one per line, at most eight words each.",
        ),
        "summarize_performance" => (
            "You are a marketing analyst. Summarize campaign metrics for a busy advertiser.",
            "Summarize the metrics below in a short paragraph: call out the strongest and \
             weakest numbers and one concrete next step.",
        ),
        "generate_landing_page" => (
            "You are a conversion-focused web copywriter.",
            "Draft landing-page content for the offer below: a hero headline, a subheadline, \
             three benefit sections, and a call to action. Use markdown headings.",
        ),
        _ => return None,
    };

    Some(SkillPromptTemplate {
        system_prompt,
        task_prompt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolRegistry;
    use crate::skills::{ToolBackend, builtin_catalog};

    #[test]
    fn every_model_skill_tool_has_a_template() {
        let registry = ToolRegistry::build(builtin_catalog()).unwrap();
        for skill in registry.skills() {
            for tool in &skill.tools {
                if tool.backend == ToolBackend::ModelSkill {
                    assert!(
                        template_for_model_skill(tool.name).is_some(),
                        "missing prompt template for {}",
                        tool.name
                    );
                }
            }
        }
    }
}
