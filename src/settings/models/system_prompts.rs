use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Selectable assistant persona. Each role maps to an editable system
/// prompt; `Custom` is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AssistantRole {
    #[default]
    Custom,
    #[serde(rename = "Tech Designer")]
    TechDesigner,
    #[serde(rename = "Knowledge Generator")]
    KnowledgeGenerator,
    #[serde(rename = "Prompt Generator")]
    PromptGenerator,
    #[serde(rename = "Scope Generator")]
    ScopeGenerator,
}

impl AssistantRole {
    pub const ALL: [AssistantRole; 5] = [
        AssistantRole::Custom,
        AssistantRole::TechDesigner,
        AssistantRole::KnowledgeGenerator,
        AssistantRole::PromptGenerator,
        AssistantRole::ScopeGenerator,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AssistantRole::Custom => "Custom",
            AssistantRole::TechDesigner => "Tech Designer",
            AssistantRole::KnowledgeGenerator => "Knowledge Generator",
            AssistantRole::PromptGenerator => "Prompt Generator",
            AssistantRole::ScopeGenerator => "Scope Generator",
        }
    }

    fn default_prompt(&self) -> &'static str {
        match self {
            AssistantRole::Custom => {
                "You are a helpful AI assistant. Provide clear, concise, and accurate information."
            }
            AssistantRole::TechDesigner => {
                "You are a technical solution designer AI assistant. Your role is to:\n\
                 1. Analyze technical requirements and constraints\n\
                 2. Propose architecture and design solutions\n\
                 3. Consider scalability, security, performance, and maintainability\n\
                 4. Provide detailed technical specifications\n\
                 5. Suggest implementation approaches with pros and cons\n\
                 Focus on practical, industry-standard solutions while being innovative when appropriate."
            }
            AssistantRole::KnowledgeGenerator => {
                "You are a knowledge generation AI assistant. Your role is to:\n\
                 1. Synthesize information from multiple sources\n\
                 2. Generate comprehensive knowledge on complex topics\n\
                 3. Structure information in a clear, logical manner\n\
                 4. Identify connections between concepts and ideas\n\
                 5. Present different perspectives and approaches\n\
                 Emphasize depth, accuracy, and pedagogical clarity in your responses."
            }
            AssistantRole::PromptGenerator => {
                "You are a prompt engineering AI assistant. Your role is to:\n\
                 1. Create effective prompts for AI code agents\n\
                 2. Break down complex tasks into clear instructions\n\
                 3. Include necessary context and constraints\n\
                 4. Balance specificity with room for the AI to apply its capabilities\n\
                 5. Design prompts that reduce the need for follow-up clarification\n\
                 Focus on creating prompts that produce high-quality, relevant outputs from AI coding assistants."
            }
            AssistantRole::ScopeGenerator => {
                "You are an expert programming assistant whose primary goal is to learn and apply \
                 new syntax and coding patterns based on the guidance and examples provided by the user.\n\n\
                 Instructions:\n\n\
                 1. Pay close attention to the \"Syntax Guidance\" and \"Sample Code\" sections provided \
                 by the user. Treat this information as your primary source of truth for understanding \
                 the desired syntax and coding conventions.\n\
                 2. Analyze the structure, keywords, and patterns in the \"Syntax Guidance.\" Identify \
                 the fundamental rules and elements of the syntax.\n\
                 3. Study the \"Sample Code\" carefully. Understand how the syntax guidance is applied \
                 in practical examples.\n\
                 4. Infer the underlying principles and best practices demonstrated in the examples.\n\
                 5. Ask clarifying questions if any aspect of the \"Syntax Guidance\" or \"Sample Code\" \
                 is unclear or ambiguous.\n\
                 6. Once you understand the provided information, generate new code that adheres to \
                 the learned syntax and conventions, explain code written in it, and identify \
                 deviations from it.\n\n\
                 Your learning process will be iterative. You will continuously refine your \
                 understanding as you receive more guidance and examples."
            }
        }
    }
}

impl fmt::Display for AssistantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The editable system prompt per role. Persisted as a plain role-to-text
/// map; roles absent from the map fall back to their built-in default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SystemPrompts {
    prompts: HashMap<AssistantRole, String>,
}

impl Default for SystemPrompts {
    fn default() -> Self {
        let prompts = AssistantRole::ALL
            .iter()
            .map(|role| (*role, role.default_prompt().to_string()))
            .collect();
        Self { prompts }
    }
}

impl SystemPrompts {
    /// The prompt text for a role, falling back to the built-in default.
    pub fn prompt_for(&self, role: AssistantRole) -> &str {
        self.prompts
            .get(&role)
            .map(String::as_str)
            .unwrap_or_else(|| role.default_prompt())
    }

    pub fn set(&mut self, role: AssistantRole, prompt: impl Into<String>) {
        self.prompts.insert(role, prompt.into());
    }

    /// Restore one role to its built-in default.
    pub fn reset(&mut self, role: AssistantRole) {
        self.prompts.insert(role, role.default_prompt().to_string());
    }

    pub fn reset_all(&mut self) {
        *self = Self::default();
    }
}
