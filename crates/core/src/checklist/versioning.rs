//! Template version manager.
//!
//! Stored templates are never edited. A revision clones the current record
//! into a new one with `version + 1` and a back-link, and the store clears the
//! old record's current flag in the same atomic step. Instances pin
//! `(template_id, version)` and therefore keep rendering and validating
//! exactly as they did when created.

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::checklist::condition::ConditionRule;
use crate::checklist::template::{
    FormPurpose, ItemConfig, LocalizedText, NewTemplateVersion, Section, Template, TemplateScope,
    TemplateSettings, MAX_AUTO_SAVE_INTERVAL_SECS, MIN_AUTO_SAVE_INTERVAL_SECS,
};
use crate::error::CoreError;
use crate::store::ChecklistStore;
use crate::types::DbId;

/// Input for the first version of a template lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTemplate {
    pub scope: TemplateScope,
    pub purpose: FormPurpose,
    pub name: LocalizedText,
    #[serde(default)]
    pub description: Option<LocalizedText>,
    #[serde(default)]
    pub settings: TemplateSettings,
    pub sections: Vec<Section>,
}

/// Authoring edits applied on top of the cloned current version. Fields
/// left as `None` are carried over unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateRevision {
    #[serde(default)]
    pub name: Option<LocalizedText>,
    #[serde(default)]
    pub description: Option<LocalizedText>,
    #[serde(default)]
    pub settings: Option<TemplateSettings>,
    #[serde(default)]
    pub sections: Option<Vec<Section>>,
}

/// Build the next version of `current` with `revision` applied.
pub fn next_version(current: &Template, revision: TemplateRevision, actor: DbId) -> NewTemplateVersion {
    NewTemplateVersion {
        scope: current.scope,
        purpose: current.purpose,
        name: revision.name.unwrap_or_else(|| current.name.clone()),
        description: revision.description.or_else(|| current.description.clone()),
        version: current.version + 1,
        previous_version_id: Some(current.id),
        settings: revision.settings.unwrap_or_else(|| current.settings.clone()),
        sections: revision.sections.unwrap_or_else(|| current.sections.clone()),
        created_by: actor,
    }
}

fn invalid(msg: impl Into<String>) -> CoreError {
    CoreError::InvalidTemplate(msg.into())
}

/// Structural checks on a template definition before it is stored.
pub fn validate_definition(
    name: &LocalizedText,
    settings: &TemplateSettings,
    sections: &[Section],
) -> Result<(), CoreError> {
    if name.primary.trim().is_empty() {
        return Err(invalid("Template name must not be empty"));
    }

    let interval = settings.auto_save_interval_seconds;
    if !(MIN_AUTO_SAVE_INTERVAL_SECS..=MAX_AUTO_SAVE_INTERVAL_SECS).contains(&interval) {
        return Err(invalid(format!(
            "auto_save_interval_seconds must be between {MIN_AUTO_SAVE_INTERVAL_SECS} and {MAX_AUTO_SAVE_INTERVAL_SECS}, got {interval}"
        )));
    }

    let mut section_ids = HashSet::new();
    let mut item_ids = HashSet::new();
    for section in sections {
        if !section_ids.insert(section.id) {
            return Err(invalid(format!("Duplicate section id {}", section.id)));
        }
        for item in &section.items {
            if !item_ids.insert(item.id) {
                return Err(invalid(format!("Duplicate item id {}", item.id)));
            }
        }
    }

    for section in sections {
        check_rule_targets(&section.visibility, &item_ids, None)
            .map_err(|msg| invalid(format!("Section {}: {msg}", section.id)))?;

        for item in &section.items {
            check_rule_targets(&item.visibility, &item_ids, Some(item.id))
                .map_err(|msg| invalid(format!("Item {}: {msg}", item.id)))?;
            check_item_config(&item.config)
                .map_err(|msg| invalid(format!("Item {}: {msg}", item.id)))?;

            if let Some(pattern) = item.validation.as_ref().and_then(|v| v.pattern.as_deref()) {
                Regex::new(pattern).map_err(|e| {
                    invalid(format!("Item {}: invalid pattern '{pattern}': {e}", item.id))
                })?;
            }
            if let Some(v) = &item.validation {
                if let (Some(min), Some(max)) = (v.min_length, v.max_length) {
                    if min > max {
                        return Err(invalid(format!(
                            "Item {}: min_length {min} exceeds max_length {max}",
                            item.id
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}

fn check_rule_targets(
    rules: &[ConditionRule],
    item_ids: &HashSet<DbId>,
    own_id: Option<DbId>,
) -> Result<(), String> {
    for rule in rules {
        if !item_ids.contains(&rule.target_item_id) {
            return Err(format!(
                "visibility rule targets unknown item {}",
                rule.target_item_id
            ));
        }
        if own_id == Some(rule.target_item_id) {
            return Err("visibility rule must not target its own item".to_string());
        }
    }
    Ok(())
}

fn check_item_config(config: &ItemConfig) -> Result<(), String> {
    match config {
        ItemConfig::Radio(choice) | ItemConfig::MultiSelect(choice) => {
            if choice.options.is_empty() {
                return Err("choice items need at least one option".to_string());
            }
            let mut seen = HashSet::new();
            if let Some(dup) = choice.options.iter().find(|o| !seen.insert(o.value.as_str())) {
                return Err(format!("duplicate option value '{}'", dup.value));
            }
            if let (Some(min), Some(max)) = (choice.min_selections, choice.max_selections) {
                if min > max {
                    return Err(format!("min_selections {min} exceeds max_selections {max}"));
                }
            }
            Ok(())
        }
        ItemConfig::Number(number) => match (number.min, number.max) {
            (Some(min), Some(max)) if min > max => Err(format!("min {min} exceeds max {max}")),
            _ => Ok(()),
        },
        ItemConfig::Scale(scale) => {
            if scale.min >= scale.max {
                return Err(format!("scale min {} must be below max {}", scale.min, scale.max));
            }
            if scale.step <= 0.0 {
                return Err(format!("scale step {} must be positive", scale.step));
            }
            Ok(())
        }
        ItemConfig::Duration(duration) => match duration.max_minutes {
            Some(max) if max < 0 => Err("max_minutes must not be negative".to_string()),
            _ => Ok(()),
        },
        ItemConfig::Checkbox
        | ItemConfig::Text(_)
        | ItemConfig::Date
        | ItemConfig::Time
        | ItemConfig::BodyDiagram(_)
        | ItemConfig::Signature => Ok(()),
    }
}

/// Creates and supersedes template versions through the storage port.
#[derive(Clone)]
pub struct TemplateVersionManager {
    store: Arc<dyn ChecklistStore>,
}

impl TemplateVersionManager {
    pub fn new(store: Arc<dyn ChecklistStore>) -> Self {
        Self { store }
    }

    /// Author version 1 of a new lineage.
    pub async fn create_template(&self, input: NewTemplate, actor: DbId) -> Result<Template, CoreError> {
        validate_definition(&input.name, &input.settings, &input.sections)?;

        if let Some(current) = self
            .store
            .find_current_template(input.scope, input.purpose)
            .await?
        {
            tracing::warn!(existing = current.id, purpose = %input.purpose, "Template lineage already exists");
            return Err(CoreError::Conflict(format!(
                "Template {} is already the current '{}' template for this scope",
                current.id, input.purpose
            )));
        }

        let new_version = NewTemplateVersion {
            scope: input.scope,
            purpose: input.purpose,
            name: input.name,
            description: input.description,
            version: 1,
            previous_version_id: None,
            settings: input.settings,
            sections: input.sections,
            created_by: actor,
        };
        let id = self.store.save_template_version(&new_version).await?;
        tracing::info!(template_id = id, purpose = %new_version.purpose, "Template created");
        Ok(self.store.load_template(id, Some(1)).await?)
    }

    /// Supersede the current version `template_id` with a new one.
    ///
    /// Fails with [`CoreError::TemplateNotFound`] when `template_id` does not
    /// name a current version.
    pub async fn create_version(
        &self,
        template_id: DbId,
        revision: TemplateRevision,
        actor: DbId,
    ) -> Result<Template, CoreError> {
        let current = self.store.load_template(template_id, None).await?;
        if !current.is_current_version {
            return Err(CoreError::TemplateNotFound {
                template_id,
                version: None,
            });
        }

        let next = next_version(&current, revision, actor);
        validate_definition(&next.name, &next.settings, &next.sections)?;

        let version = next.version;
        let id = self.store.save_template_version(&next).await?;
        tracing::info!(
            template_id = id,
            previous_version_id = template_id,
            version,
            "Template version created"
        );
        Ok(self.store.load_template(id, Some(version)).await?)
    }

    pub async fn load(&self, template_id: DbId, version: Option<i32>) -> Result<Template, CoreError> {
        Ok(self.store.load_template(template_id, version).await?)
    }

    /// The version chain ending at `template_id`, newest first.
    pub async fn version_history(&self, template_id: DbId) -> Result<Vec<Template>, CoreError> {
        let mut chain = vec![self.store.load_template(template_id, None).await?];
        while let Some(previous_id) = chain.last().and_then(|t| t.previous_version_id) {
            chain.push(self.store.load_template(previous_id, None).await?);
        }
        Ok(chain)
    }
}
