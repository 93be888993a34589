//! Prompt templates
//!
//! Five templates drive the agents. Each uses `{name}` placeholders that are
//! filled in one pass, so text inserted for one placeholder is never expanded
//! again. Built-in defaults can be overridden per file from a prompts
//! directory (`generator.txt`, `revision.txt`, `critic.txt`, `editor.txt`,
//! `prompter.txt`).

use regex::Regex;
use sdk::errors::EngineError;
use sdk::types::{GeneratorIndex, GENERATOR_COUNT};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Substituted for optional values that are absent
pub const NONE_PLACEHOLDER: &str = "None";

/// Writing style of each generator, by slot
pub const GENERATOR_STYLES: [&str; GENERATOR_COUNT] = [
    "A structured outline: numbered sections with concise bullet-point theses.",
    "Flowing narrative prose that explains the topic in connected paragraphs.",
    "Example-driven: build understanding through concrete examples and analogies.",
];

/// Style directive for a generator
pub fn style_for(index: GeneratorIndex) -> &'static str {
    GENERATOR_STYLES[index.slot()]
}

const DEFAULT_GENERATOR: &str = "\
You are one of three independent authors writing a document on the topic below.
Write in this style: {style}

Topic:
{topic}

Supplementary material:
{attachment}

Critiques of earlier drafts:
{critiques}

Additional answer from the user:
{user_response}

Return the complete document only, without preamble or closing remarks.";

const DEFAULT_REVISION: &str = "\
The reviewer raised the following points about your document:
{critiques}

Additional answer from the user:
{user_response}

Revise the document to address every point. Return the full corrected document \
with no preamble and no commentary.";

const DEFAULT_CRITIC: &str = r#"You are a demanding reviewer comparing three drafts written on the same topic.

Topic:
{topic}

Draft 1:
{draft_1}

Draft 2:
{draft_2}

Draft 3:
{draft_3}

Look for factual errors, contradictions between the drafts, gaps and unclear passages.
If the topic is too ambiguous to judge, ask the user instead of guessing.

Reply with JSON only, in exactly this shape:
{"critiques_by_generator": {"1": ["..."], "2": [], "3": ["..."]},
 "questions_for_user": [],
 "drafts_to_redo": [1, 3]}

Use empty lists when a draft needs no changes. When all lists are empty the drafts are approved."#;

const DEFAULT_EDITOR: &str = "\
You are the editor. Merge the drafts below into a single, coherent final document \
on the topic, keeping the strongest parts of each and resolving the reviewer's remarks.

Topic:
{topic}

Drafts:
{drafts}

Reviewer remarks:
{critiques}

Return the final document only.";

const DEFAULT_PROMPTER: &str = r#"You prepare requests for a team of writers.

Request:
{prompt}

Questions already asked:
{questions}

User's answer:
{user_response}

Decide whether the request is precise enough to write a good document. Reply with JSON only:
{"prompt_is_valid": true, "prepared_prompt": "...", "clarification_questions": []}

When it is not precise enough, set prompt_is_valid to false and list the questions to ask."#;

/// The template slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Generator,
    Revision,
    Critic,
    Editor,
    Prompter,
}

impl PromptKind {
    pub const ALL: [PromptKind; 5] = [
        PromptKind::Generator,
        PromptKind::Revision,
        PromptKind::Critic,
        PromptKind::Editor,
        PromptKind::Prompter,
    ];

    /// Override file name inside the prompts directory
    pub fn file_name(self) -> &'static str {
        match self {
            PromptKind::Generator => "generator.txt",
            PromptKind::Revision => "revision.txt",
            PromptKind::Critic => "critic.txt",
            PromptKind::Editor => "editor.txt",
            PromptKind::Prompter => "prompter.txt",
        }
    }

    fn default_text(self) -> &'static str {
        match self {
            PromptKind::Generator => DEFAULT_GENERATOR,
            PromptKind::Revision => DEFAULT_REVISION,
            PromptKind::Critic => DEFAULT_CRITIC,
            PromptKind::Editor => DEFAULT_EDITOR,
            PromptKind::Prompter => DEFAULT_PROMPTER,
        }
    }
}

static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();

fn placeholder_pattern() -> Option<&'static Regex> {
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{([a-z][a-z0-9_]*)\}").ok())
        .as_ref()
}

/// The full set of agent templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    generator: String,
    revision: String,
    critic: String,
    editor: String,
    prompter: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            generator: DEFAULT_GENERATOR.to_string(),
            revision: DEFAULT_REVISION.to_string(),
            critic: DEFAULT_CRITIC.to_string(),
            editor: DEFAULT_EDITOR.to_string(),
            prompter: DEFAULT_PROMPTER.to_string(),
        }
    }
}

impl PromptSet {
    /// Built-in templates, overridden by any files present in `dir`
    ///
    /// A missing directory means "no overrides".
    pub fn load(dir: &Path) -> Result<Self, EngineError> {
        let mut prompts = Self::default();
        if !dir.is_dir() {
            return Ok(prompts);
        }

        for kind in PromptKind::ALL {
            let path = dir.join(kind.file_name());
            if !path.is_file() {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|e| {
                EngineError::Config(format!("Failed to read prompt {:?}: {}", path, e))
            })?;
            tracing::debug!("Loaded prompt override {:?}", path);
            prompts = prompts.with_template(kind, text);
        }

        Ok(prompts)
    }

    /// Replace one template
    pub fn with_template(mut self, kind: PromptKind, text: impl Into<String>) -> Self {
        *self.slot_mut(kind) = text.into();
        self
    }

    pub fn template(&self, kind: PromptKind) -> &str {
        match kind {
            PromptKind::Generator => &self.generator,
            PromptKind::Revision => &self.revision,
            PromptKind::Critic => &self.critic,
            PromptKind::Editor => &self.editor,
            PromptKind::Prompter => &self.prompter,
        }
    }

    /// Whether a template still has its built-in text
    pub fn is_default(&self, kind: PromptKind) -> bool {
        self.template(kind) == kind.default_text()
    }

    /// Fill a template. Unknown placeholders are left as written.
    pub fn render(&self, kind: PromptKind, values: &[(&str, &str)]) -> String {
        let template = self.template(kind);
        let Some(pattern) = placeholder_pattern() else {
            return template.to_string();
        };

        pattern
            .replace_all(template, |caps: &regex::Captures<'_>| {
                let name = &caps[1];
                values
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| value.to_string())
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    fn slot_mut(&mut self, kind: PromptKind) -> &mut String {
        match kind {
            PromptKind::Generator => &mut self.generator,
            PromptKind::Revision => &mut self.revision,
            PromptKind::Critic => &mut self.critic,
            PromptKind::Editor => &mut self.editor,
            PromptKind::Prompter => &mut self.prompter,
        }
    }
}

/// Value for an optional placeholder
pub fn or_none(value: Option<&str>) -> &str {
    match value {
        Some(text) if !text.trim().is_empty() => text,
        _ => NONE_PLACEHOLDER,
    }
}
