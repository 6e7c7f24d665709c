use hmon_common::types::{Device, HostGroup, Template, TemplateAssignment, TemplateItem, Trigger};
use std::collections::HashMap;

/// Flat, id-indexed snapshot of the template graph.
///
/// Relationships are stored as id lists and followed with explicit lookups;
/// nothing holds a reference to its parent, so a cyclic `parent_template_id`
/// chain is just data that the resolver rejects.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    templates: HashMap<String, Template>,
    items: HashMap<String, Vec<TemplateItem>>,
    triggers: HashMap<String, Vec<Trigger>>,
    devices: HashMap<String, Device>,
    host_groups: HashMap<String, HostGroup>,
    /// device id -> host group ids, in membership order
    memberships: HashMap<String, Vec<String>>,
    /// host group id -> template ids, in attachment order
    group_templates: HashMap<String, Vec<String>>,
    /// device id -> direct assignments, in assignment order
    assignments: HashMap<String, Vec<TemplateAssignment>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_template(&mut self, template: Template) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn add_item(&mut self, item: TemplateItem) {
        self.items
            .entry(item.template_id.clone())
            .or_default()
            .push(item);
    }

    /// Registers a trigger under its owning template. Triggers without a
    /// template are not part of any template chain and are ignored here.
    pub fn add_trigger(&mut self, trigger: Trigger) {
        if let Some(template_id) = trigger.template_id.clone() {
            self.triggers.entry(template_id).or_default().push(trigger);
        }
    }

    pub fn add_device(&mut self, device: Device) {
        self.devices.insert(device.id.clone(), device);
    }

    pub fn add_host_group(&mut self, group: HostGroup) {
        self.host_groups.insert(group.id.clone(), group);
    }

    pub fn add_membership(&mut self, device_id: &str, group_id: &str) {
        let groups = self.memberships.entry(device_id.to_string()).or_default();
        if !groups.iter().any(|g| g == group_id) {
            groups.push(group_id.to_string());
        }
    }

    pub fn add_group_template(&mut self, group_id: &str, template_id: &str) {
        let templates = self.group_templates.entry(group_id.to_string()).or_default();
        if !templates.iter().any(|t| t == template_id) {
            templates.push(template_id.to_string());
        }
    }

    pub fn add_assignment(&mut self, assignment: TemplateAssignment) {
        let list = self
            .assignments
            .entry(assignment.device_id.clone())
            .or_default();
        list.retain(|a| a.template_id != assignment.template_id);
        list.push(assignment);
    }

    pub fn template(&self, id: &str) -> Option<&Template> {
        self.templates.get(id)
    }

    pub fn items_of(&self, template_id: &str) -> &[TemplateItem] {
        self.items.get(template_id).map_or(&[], Vec::as_slice)
    }

    pub fn triggers_of(&self, template_id: &str) -> &[Trigger] {
        self.triggers.get(template_id).map_or(&[], Vec::as_slice)
    }

    pub fn device(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn host_group(&self, id: &str) -> Option<&HostGroup> {
        self.host_groups.get(id)
    }

    pub fn groups_of(&self, device_id: &str) -> &[String] {
        self.memberships.get(device_id).map_or(&[], Vec::as_slice)
    }

    pub fn templates_of_group(&self, group_id: &str) -> &[String] {
        self.group_templates.get(group_id).map_or(&[], Vec::as_slice)
    }

    pub fn assignments_of(&self, device_id: &str) -> &[TemplateAssignment] {
        self.assignments.get(device_id).map_or(&[], Vec::as_slice)
    }
}
