use std::collections::HashMap;

use thiserror::Error;

use crate::skills::{Skill, ToolDefinition};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate tool name registered: {name} (skills {first} and {second})")]
    DuplicateTool {
        name: String,
        first: String,
        second: String,
    },
}

/// Catalog of all skills and their tools, built once at startup. Tool
/// names are globally unique; a duplicate fails construction instead of
/// silently shadowing an earlier registration.
#[derive(Debug)]
pub struct ToolRegistry {
    skills: Vec<Skill>,
    by_name: HashMap<&'static str, (usize, usize)>,
}

impl ToolRegistry {
    pub fn build(skills: Vec<Skill>) -> Result<Self, RegistryError> {
        let mut by_name: HashMap<&'static str, (usize, usize)> = HashMap::new();
        for (skill_index, skill) in skills.iter().enumerate() {
            for (tool_index, tool) in skill.tools.iter().enumerate() {
                if let Some((existing_skill, _)) = by_name.get(tool.name) {
                    return Err(RegistryError::DuplicateTool {
                        name: tool.name.to_string(),
                        first: skills[*existing_skill].name.to_string(),
                        second: skill.name.to_string(),
                    });
                }
                by_name.insert(tool.name, (skill_index, tool_index));
            }
        }
        Ok(Self { skills, by_name })
    }

    pub fn skills(&self) -> &[Skill] {
        &self.skills
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.by_name
            .get(name)
            .map(|(skill_index, tool_index)| &self.skills[*skill_index].tools[*tool_index])
    }

    /// Flatten the selected skills into the bounded tool list for one
    /// planning step, preserving skill and declaration order.
    pub fn tools_for_skills<'a>(&self, selected: &[&'a Skill]) -> Vec<&'a ToolDefinition> {
        selected
            .iter()
            .flat_map(|skill| skill.tools.iter())
            .collect()
    }
}
