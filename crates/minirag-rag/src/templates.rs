//! Localized prompt templates

use minirag_core::{Error, Result};

/// Template group holding the answering prompts
pub const RAG_GROUP: &str = "rag";

pub const SYSTEM_PROMPT: &str = "system_prompt";
pub const QUERY_PROMPT: &str = "query_prompt";
pub const DOCUMENT_PROMPT: &str = "document_prompt";
pub const FOOTER_PROMPT: &str = "footer_prompt";

mod en {
    pub const RAG: &[(&str, &str)] = &[
        (
            super::SYSTEM_PROMPT,
            "You are an assistant to generate a response to the user.\n\
             You will be provided by a set of documents associated with the user's query.\n\
             You have to generate a response based on the documents provided.\n\
             Ignore any information that is not related to the user's query.\n\
             You can appologize if you are not able to generate a response.\n\
             You have to generate a response in the same language as the user's query.\n\
             Be polite and respectful to the user.\n\
             Be precise and concise in your response. Avoid unnecessary details.",
        ),
        (super::QUERY_PROMPT, "## User Query: {query_text}"),
        (
            super::DOCUMENT_PROMPT,
            "## Document No: {doc_num}\n### Content: {chunk_text}",
        ),
        (
            super::FOOTER_PROMPT,
            "Based on the above documents, please generate an answer for the user.\n## Answer:",
        ),
    ];
}

fn locale_group(language: &str, group: &str) -> Option<&'static [(&'static str, &'static str)]> {
    match (language, group) {
        ("en", RAG_GROUP) => Some(en::RAG),
        _ => None,
    }
}

/// Looks templates up in the primary language, falling back to the default.
#[derive(Debug, Clone)]
pub struct TemplateParser {
    language: String,
    default_language: String,
}

impl Default for TemplateParser {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            default_language: "en".to_string(),
        }
    }
}

impl TemplateParser {
    /// Create a parser. An unsupported primary language falls back to the default.
    pub fn new(language: &str, default_language: &str) -> Self {
        let mut parser = Self {
            language: default_language.to_string(),
            default_language: default_language.to_string(),
        };
        parser.set_language(language);
        parser
    }

    /// Switch the primary language if templates exist for it
    pub fn set_language(&mut self, language: &str) {
        if locale_group(language, RAG_GROUP).is_some() {
            self.language = language.to_string();
        } else {
            tracing::warn!(
                language,
                fallback = %self.default_language,
                "no templates for language, using default"
            );
            self.language = self.default_language.clone();
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    fn lookup(&self, group: &str, key: &str) -> Option<&'static str> {
        [self.language.as_str(), self.default_language.as_str()]
            .into_iter()
            .filter_map(|lang| locale_group(lang, group))
            .find_map(|entries| entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v))
    }

    /// Render `group`/`key`, substituting every `{name}` from `vars`.
    pub fn get(&self, group: &str, key: &str, vars: &[(&str, &str)]) -> Result<String> {
        let template = self.lookup(group, key).ok_or_else(|| {
            Error::Configuration(format!("template {}/{} not found", group, key))
        })?;

        Ok(vars.iter().fold(template.to_string(), |text, (name, value)| {
            text.replace(&format!("{{{}}}", name), value)
        }))
    }
}
