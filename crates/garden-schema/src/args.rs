//! Per-module argument overrides and command template substitution.
//!
//! Overrides are given as a comma-separated list of
//! `<category>/<module>-<key>=<value>` entries. The key/value split happens at
//! the first `=`, the category ends at the first `/` left of it, and the module
//! name ends at the first `-` after that. The value is everything after the
//! `=`. The category may be omitted (`<module>-<key>=<value>`), in which case
//! the override only applies to explicitly selected single modules.
//!
//! The grammar is not escape-aware: module names containing `-`, or categories
//! containing `/`, cannot be targeted.

use crate::identifier::{Identifier, Selection};
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Placeholder replaced with the run's target after all overrides are applied.
pub const TARGET_PLACEHOLDER: &str = "<TARGET>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModArg {
    pub category: Option<String>,
    pub name: String,
    pub key: String,
    pub value: String,
}

impl ModArg {
    /// Whether this override targets the given unit.
    ///
    /// Single-selection units match on module name alone; declared units
    /// require the full identifier to match.
    pub fn applies_to(&self, id: &Identifier, selection: Selection) -> bool {
        match selection {
            Selection::Single => self.name == id.name,
            Selection::Declared => self
                .category
                .as_deref()
                .is_some_and(|cat| Identifier::new(cat, self.name.as_str()) == *id),
        }
    }

    fn placeholder(&self) -> String {
        format!("<{}>", self.key)
    }
}

fn parse_entry(entry: &str) -> Result<ModArg, SchemaError> {
    let invalid = || SchemaError::InvalidOverride(entry.to_owned());

    let (head, value) = entry.split_once('=').ok_or_else(invalid)?;
    let (category, rest) = match head.split_once('/') {
        Some((cat, rest)) => (Some(cat), rest),
        None => (None, head),
    };
    let (name, key) = rest.split_once('-').ok_or_else(invalid)?;

    if category.is_some_and(str::is_empty) || name.is_empty() || key.is_empty() || value.is_empty()
    {
        return Err(invalid());
    }

    Ok(ModArg {
        category: category.map(str::to_owned),
        name: name.to_owned(),
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

/// Parse a comma-separated override list. Any malformed entry fails the whole
/// parse; an empty input yields no overrides.
pub fn parse_mod_args(input: &str) -> Result<Vec<ModArg>, SchemaError> {
    debug!("module arguments passed: {input}");
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }
    input.split(',').map(|e| parse_entry(e.trim())).collect()
}

/// Select every override that applies to the given unit, in input order.
pub fn find_overrides<'a>(
    args: &'a [ModArg],
    id: &Identifier,
    selection: Selection,
) -> Vec<&'a ModArg> {
    args.iter().filter(|a| a.applies_to(id, selection)).collect()
}

/// Substitute overrides and then the target into a command template.
///
/// Every `<key>` occurrence in every token is replaced with the override value,
/// in override order; afterwards every `<TARGET>` is replaced with `target`.
/// Placeholders with no matching override are left as they are.
pub fn resolve_command(command: &[String], overrides: &[&ModArg], target: &str) -> Vec<String> {
    command
        .iter()
        .map(|token| {
            let mut token = token.clone();
            for arg in overrides {
                let placeholder = arg.placeholder();
                if token.contains(&placeholder) {
                    token = token.replace(&placeholder, &arg.value);
                }
            }
            if token.contains(TARGET_PLACEHOLDER) {
                token = token.replace(TARGET_PLACEHOLDER, target);
            }
            token
        })
        .collect()
}

/// Collect every `<...>` placeholder still present in a command.
pub fn unresolved_placeholders(command: &[String]) -> Vec<String> {
    let mut found = Vec::new();
    for token in command {
        let mut rest = token.as_str();
        while let Some(start) = rest.find('<') {
            let after = &rest[start + 1..];
            let Some(end) = after.find('>') else {
                break;
            };
            let inner = &after[..end];
            if !inner.is_empty() && !inner.contains(['<', ' ', '\t']) {
                found.push(format!("<{inner}>"));
                rest = &after[end + 1..];
            } else {
                rest = after;
            }
        }
    }
    found
}
