use crate::catalog::Catalog;
use crate::error::{ResolveError, Result};
use hmon_common::types::{Template, TemplateItem, Trigger};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Maximum number of parent hops walked from any template.
pub const MAX_INHERITANCE_DEPTH: usize = 10;

/// Offset added to direct assignment priorities so they always outrank
/// host-group templates (priority 0).
pub const DIRECT_PRIORITY_OFFSET: i64 = 100;

/// A template applied to a device together with its effective priority.
#[derive(Debug, Clone, Copy)]
pub struct ApplicableTemplate<'a> {
    pub template: &'a Template,
    pub priority: i64,
}

/// Final monitoring configuration of a device.
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub device_id: String,
    pub hostname: String,
    /// Names of every template that contributed, in application order.
    pub templates: Vec<String>,
    /// Enabled items, one per key, ordered by key.
    pub items: Vec<TemplateItem>,
    /// Enabled triggers reachable from any applied chain, one per id.
    pub triggers: Vec<Trigger>,
    /// Per-template failures that were skipped during resolution.
    #[serde(skip)]
    pub errors: Vec<ResolveError>,
}

impl EffectiveConfig {
    pub fn has_trigger(&self, trigger_id: &str) -> bool {
        self.triggers.iter().any(|t| t.id == trigger_id)
    }
}

/// Read-only resolver over a [`Catalog`] snapshot.
pub struct ConfigResolver<'a> {
    catalog: &'a Catalog,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Walks `parent_template_id` links from `template_id` up to the root and
    /// returns the chain ordered root first, the starting template last.
    ///
    /// A parent id that points at a missing template ends the chain there
    /// (logged, not an error). Revisiting a template or walking more than
    /// [`MAX_INHERITANCE_DEPTH`] hops is an error.
    pub fn resolve_chain(&self, template_id: &str) -> Result<Vec<&'a Template>> {
        let mut current = self
            .catalog
            .template(template_id)
            .ok_or_else(|| ResolveError::TemplateNotFound(template_id.to_string()))?;

        let mut chain = Vec::new();
        let mut visited = HashSet::new();

        loop {
            if chain.len() > MAX_INHERITANCE_DEPTH {
                return Err(ResolveError::DepthExceeded {
                    template_id: template_id.to_string(),
                    max: MAX_INHERITANCE_DEPTH,
                });
            }
            if !visited.insert(current.id.as_str()) {
                return Err(ResolveError::Cycle {
                    template_id: current.id.clone(),
                });
            }
            chain.push(current);

            let Some(parent_id) = current.parent_template_id.as_deref() else {
                break;
            };
            match self.catalog.template(parent_id) {
                Some(parent) => current = parent,
                None => {
                    tracing::warn!(
                        template_id = %current.id,
                        parent_id,
                        "Parent template missing, using partial chain"
                    );
                    break;
                }
            }
        }

        chain.reverse();
        Ok(chain)
    }

    /// Merges the items of a root-first chain; a later template overrides an
    /// earlier one on the same key.
    pub fn merge_items(&self, chain: &[&Template]) -> BTreeMap<String, TemplateItem> {
        let mut merged = BTreeMap::new();
        self.merge_into(&mut merged, chain);
        merged
    }

    fn merge_into(&self, merged: &mut BTreeMap<String, TemplateItem>, chain: &[&Template]) {
        for template in chain {
            for item in self.catalog.items_of(&template.id) {
                merged.insert(item.key.clone(), item.clone());
            }
        }
    }

    /// Templates applied to a device, ordered by ascending effective priority.
    ///
    /// Host-group templates get priority 0 and are deduplicated across groups.
    /// A direct assignment gets `priority + 100` and replaces a host-group
    /// entry for the same template. Ties keep assignment order.
    pub fn applicable_templates(&self, device_id: &str) -> Vec<ApplicableTemplate<'a>> {
        let mut applied: Vec<ApplicableTemplate<'a>> = Vec::new();
        let mut seen = HashSet::new();

        for group_id in self.catalog.groups_of(device_id) {
            for template_id in self.catalog.templates_of_group(group_id) {
                if !seen.insert(template_id.as_str()) {
                    continue;
                }
                match self.catalog.template(template_id) {
                    Some(template) => applied.push(ApplicableTemplate {
                        template,
                        priority: 0,
                    }),
                    None => tracing::warn!(
                        group_id = %group_id,
                        template_id = %template_id,
                        "Host group references a missing template"
                    ),
                }
            }
        }

        let mut direct: Vec<_> = self.catalog.assignments_of(device_id).iter().collect();
        direct.sort_by_key(|a| a.priority);
        for assignment in direct {
            let Some(template) = self.catalog.template(&assignment.template_id) else {
                tracing::warn!(
                    device_id,
                    template_id = %assignment.template_id,
                    "Device assignment references a missing template"
                );
                continue;
            };
            if !seen.insert(template.id.as_str()) {
                applied.retain(|a| a.template.id != template.id);
            }
            applied.push(ApplicableTemplate {
                template,
                priority: assignment.priority.saturating_add(DIRECT_PRIORITY_OFFSET),
            });
        }

        applied.sort_by_key(|a| a.priority);
        applied
    }

    /// Resolves every applicable template of `device_id` and merges them,
    /// lowest priority first, into one configuration.
    ///
    /// A template whose chain fails to resolve is skipped and its error is
    /// recorded in [`EffectiveConfig::errors`]; the rest still apply.
    pub fn effective_config(&self, device_id: &str) -> Result<EffectiveConfig> {
        let device = self
            .catalog
            .device(device_id)
            .ok_or_else(|| ResolveError::DeviceNotFound(device_id.to_string()))?;

        let mut merged = BTreeMap::new();
        let mut names: Vec<String> = Vec::new();
        let mut triggers: Vec<Trigger> = Vec::new();
        let mut trigger_ids = HashSet::new();
        let mut errors = Vec::new();

        for applied in self.applicable_templates(device_id) {
            let chain = match self.resolve_chain(&applied.template.id) {
                Ok(chain) => chain,
                Err(e) => {
                    tracing::error!(
                        device_id,
                        template = %applied.template.name,
                        error = %e,
                        "Failed to resolve template chain"
                    );
                    errors.push(e);
                    continue;
                }
            };

            for template in &chain {
                if !names.contains(&template.name) {
                    names.push(template.name.clone());
                }
                for trigger in self.catalog.triggers_of(&template.id) {
                    if trigger.enabled && trigger_ids.insert(trigger.id.clone()) {
                        triggers.push(trigger.clone());
                    }
                }
            }
            self.merge_into(&mut merged, &chain);
        }

        Ok(EffectiveConfig {
            device_id: device.id.clone(),
            hostname: device.hostname.clone(),
            templates: names,
            items: merged.into_values().filter(|item| item.enabled).collect(),
            triggers,
            errors,
        })
    }
}
