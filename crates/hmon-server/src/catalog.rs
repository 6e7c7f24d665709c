use hmon_storage::MonitorStore;
use hmon_template::Catalog;

/// Reads the whole template graph from the store into a resolver snapshot.
pub fn load_catalog(store: &dyn MonitorStore) -> hmon_storage::Result<Catalog> {
    let mut catalog = Catalog::new();

    for template in store.list_templates()? {
        catalog.add_template(template);
    }
    for item in store.list_template_items()? {
        catalog.add_item(item);
    }
    for trigger in store.list_triggers()? {
        catalog.add_trigger(trigger);
    }
    for device in store.list_devices()? {
        catalog.add_device(device);
    }
    for group in store.list_host_groups()? {
        catalog.add_host_group(group);
    }
    for (device_id, group_id) in store.list_memberships()? {
        catalog.add_membership(&device_id, &group_id);
    }
    for (group_id, template_id) in store.list_group_templates()? {
        catalog.add_group_template(&group_id, &template_id);
    }
    for assignment in store.list_assignments()? {
        catalog.add_assignment(assignment);
    }

    Ok(catalog)
}
