//! Prompt template engine.
//!
//! Templates are named string patterns with `$placeholder` markers, organized
//! by locale and group so prompts can be localized later. Group + name lookup
//! is the only addressing mechanism; any composition beyond that is plain
//! string concatenation performed by the caller.

mod locales;

use thiserror::Error;

/// Default locale used when the requested one lacks a template.
pub const DEFAULT_LOCALE: &str = "en";

/// Errors raised while rendering a prompt template.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// No template registered under the requested group and name.
    #[error("Template not found: {group}/{name}")]
    TemplateNotFound {
        /// Requested template group.
        group: String,
        /// Requested template name.
        name: String,
    },
    /// The template references a placeholder the caller did not supply.
    #[error("Missing substitution for placeholder: {0}")]
    MissingSubstitution(String),
}

/// Locale-aware store of named prompt templates.
pub struct TemplateStore {
    locale: String,
}

impl TemplateStore {
    /// Create a store serving the given locale, falling back to [`DEFAULT_LOCALE`].
    pub fn new(locale: &str) -> Self {
        Self {
            locale: locale.to_string(),
        }
    }

    /// Render the template addressed by `group` and `name`, substituting every
    /// `$placeholder` with its value from `substitutions`.
    pub fn render(
        &self,
        group: &str,
        name: &str,
        substitutions: &[(&str, &str)],
    ) -> Result<String, TemplateError> {
        let template = locales::lookup(&self.locale, group, name)
            .or_else(|| locales::lookup(DEFAULT_LOCALE, group, name))
            .ok_or_else(|| TemplateError::TemplateNotFound {
                group: group.to_string(),
                name: name.to_string(),
            })?;

        substitute(template, substitutions)
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOCALE)
    }
}

fn substitute(template: &str, substitutions: &[(&str, &str)]) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((_, current)) = chars.next() {
        if current != '$' {
            output.push(current);
            continue;
        }

        let mut placeholder = String::new();
        while let Some(&(_, candidate)) = chars.peek() {
            if candidate.is_ascii_alphanumeric() || candidate == '_' {
                placeholder.push(candidate);
                chars.next();
            } else {
                break;
            }
        }

        if placeholder.is_empty() {
            // a lone '$' is literal text
            output.push('$');
            continue;
        }

        let value = substitutions
            .iter()
            .find(|(key, _)| *key == placeholder)
            .map(|(_, value)| *value)
            .ok_or(TemplateError::MissingSubstitution(placeholder))?;
        output.push_str(value);
    }

    Ok(output)
}
