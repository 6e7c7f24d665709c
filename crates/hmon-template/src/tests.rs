use crate::catalog::Catalog;
use crate::error::ResolveError;
use crate::resolver::{ConfigResolver, MAX_INHERITANCE_DEPTH};
use chrono::{Duration, Utc};
use hmon_common::types::{
    Device, ExpressionType, HostGroup, Severity, Template, TemplateAssignment, TemplateItem,
    Trigger,
};

fn template(id: &str, parent: Option<&str>) -> Template {
    Template {
        id: id.to_string(),
        name: format!("Template {id}"),
        description: None,
        parent_template_id: parent.map(str::to_string),
    }
}

fn item(template_id: &str, key: &str, interval_secs: u64) -> TemplateItem {
    TemplateItem {
        id: format!("{template_id}-{key}"),
        template_id: template_id.to_string(),
        name: key.to_string(),
        key: key.to_string(),
        value_kind: "numeric".to_string(),
        units: None,
        interval_secs,
        enabled: true,
    }
}

fn trigger(id: &str, template_id: &str, enabled: bool) -> Trigger {
    Trigger {
        id: id.to_string(),
        name: format!("trigger {id}"),
        description: None,
        template_id: Some(template_id.to_string()),
        device_id: None,
        expression_type: ExpressionType::Simple,
        expression: "cpu_percent > 90".to_string(),
        recovery_expression: None,
        severity: Severity::High,
        duration_secs: 0,
        parent_trigger_id: None,
        enabled,
        evaluation: Default::default(),
    }
}

fn device(id: &str) -> Device {
    Device {
        id: id.to_string(),
        hostname: format!("{id}.local"),
        ip: None,
    }
}

fn assignment(device_id: &str, template_id: &str, priority: i64, order: i64) -> TemplateAssignment {
    TemplateAssignment {
        device_id: device_id.to_string(),
        template_id: template_id.to_string(),
        priority,
        assigned_at: Utc::now() + Duration::seconds(order),
    }
}

#[test]
fn resolve_chain_orders_root_first() {
    let mut catalog = Catalog::new();
    catalog.add_template(template("base", None));
    catalog.add_template(template("linux", Some("base")));
    catalog.add_template(template("web", Some("linux")));

    let resolver = ConfigResolver::new(&catalog);
    let chain = resolver.resolve_chain("web").unwrap();
    let ids: Vec<_> = chain.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["base", "linux", "web"]);
}

#[test]
fn resolve_chain_detects_two_node_cycle() {
    let mut catalog = Catalog::new();
    catalog.add_template(template("a", Some("b")));
    catalog.add_template(template("b", Some("a")));

    let resolver = ConfigResolver::new(&catalog);
    let err = resolver.resolve_chain("a").unwrap_err();
    assert!(matches!(err, ResolveError::Cycle { .. }));
}

#[test]
fn resolve_chain_detects_self_parent() {
    let mut catalog = Catalog::new();
    catalog.add_template(template("loop", Some("loop")));

    let resolver = ConfigResolver::new(&catalog);
    assert_eq!(
        resolver.resolve_chain("loop").unwrap_err(),
        ResolveError::Cycle {
            template_id: "loop".to_string()
        }
    );
}

#[test]
fn resolve_chain_rejects_excessive_depth() {
    let mut catalog = Catalog::new();
    let total = MAX_INHERITANCE_DEPTH + 2;
    for i in 0..total {
        let parent = (i > 0).then(|| format!("t{}", i - 1));
        catalog.add_template(template(&format!("t{i}"), parent.as_deref()));
    }

    let resolver = ConfigResolver::new(&catalog);
    let err = resolver.resolve_chain(&format!("t{}", total - 1)).unwrap_err();
    assert!(matches!(err, ResolveError::DepthExceeded { .. }));

    // Exactly MAX_INHERITANCE_DEPTH hops is still fine.
    let ok = resolver
        .resolve_chain(&format!("t{MAX_INHERITANCE_DEPTH}"))
        .unwrap();
    assert_eq!(ok.len(), MAX_INHERITANCE_DEPTH + 1);
}

#[test]
fn resolve_chain_stops_at_dangling_parent() {
    let mut catalog = Catalog::new();
    catalog.add_template(template("orphan", Some("deleted")));

    let resolver = ConfigResolver::new(&catalog);
    let chain = resolver.resolve_chain("orphan").unwrap();
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0].id, "orphan");
}

#[test]
fn merge_items_child_overrides_parent() {
    let mut catalog = Catalog::new();
    catalog.add_template(template("parent", None));
    catalog.add_template(template("child", Some("parent")));
    catalog.add_item(item("parent", "K", 1));
    catalog.add_item(item("parent", "only_parent", 60));
    catalog.add_item(item("child", "K", 2));

    let resolver = ConfigResolver::new(&catalog);
    let chain = resolver.resolve_chain("child").unwrap();
    let merged = resolver.merge_items(&chain);

    assert_eq!(merged.len(), 2);
    assert_eq!(merged["K"].interval_secs, 2);
    assert_eq!(merged["K"].template_id, "child");
    assert_eq!(merged["only_parent"].template_id, "parent");
}

#[test]
fn applicable_templates_rank_direct_assignments_above_groups() {
    let mut catalog = Catalog::new();
    catalog.add_device(device("d1"));
    catalog.add_host_group(HostGroup {
        id: "g1".into(),
        name: "web".into(),
    });
    catalog.add_host_group(HostGroup {
        id: "g2".into(),
        name: "linux".into(),
    });
    for id in ["shared", "group_only", "direct_hi", "direct_lo"] {
        catalog.add_template(template(id, None));
    }
    catalog.add_membership("d1", "g1");
    catalog.add_membership("d1", "g2");
    catalog.add_group_template("g1", "shared");
    catalog.add_group_template("g2", "shared");
    catalog.add_group_template("g2", "group_only");
    catalog.add_assignment(assignment("d1", "direct_hi", 5, 0));
    catalog.add_assignment(assignment("d1", "direct_lo", -50, 1));

    let resolver = ConfigResolver::new(&catalog);
    let applied: Vec<_> = resolver
        .applicable_templates("d1")
        .into_iter()
        .map(|a| (a.template.id.as_str(), a.priority))
        .collect();

    assert_eq!(
        applied,
        vec![
            ("shared", 0),
            ("group_only", 0),
            ("direct_lo", 50),
            ("direct_hi", 105),
        ]
    );
}

#[test]
fn direct_assignment_replaces_group_entry_for_same_template() {
    let mut catalog = Catalog::new();
    catalog.add_device(device("d1"));
    catalog.add_template(template("t", None));
    catalog.add_template(template("other", None));
    catalog.add_membership("d1", "g1");
    catalog.add_group_template("g1", "t");
    catalog.add_group_template("g1", "other");
    catalog.add_assignment(assignment("d1", "t", 0, 0));

    let resolver = ConfigResolver::new(&catalog);
    let applied: Vec<_> = resolver
        .applicable_templates("d1")
        .into_iter()
        .map(|a| (a.template.id.as_str(), a.priority))
        .collect();
    assert_eq!(applied, vec![("other", 0), ("t", 100)]);
}

#[test]
fn extreme_assignment_priority_saturates() {
    let mut catalog = Catalog::new();
    catalog.add_device(device("d1"));
    catalog.add_template(template("top", None));
    catalog.add_template(template("low", None));
    catalog.add_assignment(assignment("d1", "top", i64::MAX, 0));
    catalog.add_assignment(assignment("d1", "low", 0, 1));

    let resolver = ConfigResolver::new(&catalog);
    let applied: Vec<_> = resolver
        .applicable_templates("d1")
        .into_iter()
        .map(|a| (a.template.id.as_str(), a.priority))
        .collect();
    assert_eq!(applied, vec![("low", 100), ("top", i64::MAX)]);
}

#[test]
fn equal_priorities_keep_assignment_order() {
    let mut catalog = Catalog::new();
    catalog.add_device(device("d1"));
    catalog.add_template(template("first", None));
    catalog.add_template(template("second", None));
    catalog.add_assignment(assignment("d1", "first", 10, 0));
    catalog.add_assignment(assignment("d1", "second", 10, 1));
    catalog.add_item(item("first", "cpu", 10));
    catalog.add_item(item("second", "cpu", 20));

    let resolver = ConfigResolver::new(&catalog);
    let config = resolver.effective_config("d1").unwrap();
    assert_eq!(config.items.len(), 1);
    assert_eq!(config.items[0].interval_secs, 20);
}

#[test]
fn effective_config_higher_priority_template_wins() {
    let mut catalog = Catalog::new();
    catalog.add_device(device("d1"));
    catalog.add_template(template("group_tpl", None));
    catalog.add_template(template("direct_tpl", None));
    catalog.add_membership("d1", "g1");
    catalog.add_group_template("g1", "group_tpl");
    catalog.add_assignment(assignment("d1", "direct_tpl", 0, 0));
    catalog.add_item(item("group_tpl", "mem", 30));
    catalog.add_item(item("direct_tpl", "mem", 5));
    catalog.add_item(item("group_tpl", "disk", 300));

    let resolver = ConfigResolver::new(&catalog);
    let config = resolver.effective_config("d1").unwrap();

    assert_eq!(config.hostname, "d1.local");
    assert_eq!(config.templates, vec!["Template group_tpl", "Template direct_tpl"]);
    let mem = config.items.iter().find(|i| i.key == "mem").unwrap();
    assert_eq!(mem.interval_secs, 5);
    assert!(config.items.iter().any(|i| i.key == "disk"));
}

#[test]
fn effective_config_filters_disabled_items_and_triggers() {
    let mut catalog = Catalog::new();
    catalog.add_device(device("d1"));
    catalog.add_template(template("base", None));
    catalog.add_template(template("child", Some("base")));
    catalog.add_assignment(assignment("d1", "child", 0, 0));

    let mut disabled = item("child", "swap", 60);
    disabled.enabled = false;
    catalog.add_item(disabled);
    catalog.add_item(item("base", "cpu", 60));
    catalog.add_trigger(trigger("on", "base", true));
    catalog.add_trigger(trigger("off", "child", false));

    let resolver = ConfigResolver::new(&catalog);
    let config = resolver.effective_config("d1").unwrap();

    let keys: Vec<_> = config.items.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, vec!["cpu"]);
    assert!(config.has_trigger("on"));
    assert!(!config.has_trigger("off"));
}

#[test]
fn disabled_child_item_hides_enabled_parent_item() {
    let mut catalog = Catalog::new();
    catalog.add_device(device("d1"));
    catalog.add_template(template("base", None));
    catalog.add_template(template("child", Some("base")));
    catalog.add_assignment(assignment("d1", "child", 0, 0));
    catalog.add_item(item("base", "swap", 60));
    let mut disabled = item("child", "swap", 60);
    disabled.enabled = false;
    catalog.add_item(disabled);

    let resolver = ConfigResolver::new(&catalog);
    let config = resolver.effective_config("d1").unwrap();
    assert!(config.items.is_empty());
}

#[test]
fn effective_config_deduplicates_triggers_reached_twice() {
    let mut catalog = Catalog::new();
    catalog.add_device(device("d1"));
    catalog.add_template(template("base", None));
    catalog.add_template(template("web", Some("base")));
    catalog.add_template(template("db", Some("base")));
    catalog.add_assignment(assignment("d1", "web", 0, 0));
    catalog.add_assignment(assignment("d1", "db", 1, 1));
    catalog.add_trigger(trigger("base-cpu", "base", true));

    let resolver = ConfigResolver::new(&catalog);
    let config = resolver.effective_config("d1").unwrap();
    assert_eq!(config.triggers.len(), 1);
    assert_eq!(
        config.templates,
        vec!["Template base", "Template web", "Template db"]
    );
}

#[test]
fn effective_config_skips_cyclic_template_and_keeps_others() {
    let mut catalog = Catalog::new();
    catalog.add_device(device("d1"));
    catalog.add_template(template("a", Some("b")));
    catalog.add_template(template("b", Some("a")));
    catalog.add_template(template("healthy", None));
    catalog.add_assignment(assignment("d1", "a", 0, 0));
    catalog.add_assignment(assignment("d1", "healthy", 1, 1));
    catalog.add_item(item("a", "never", 60));
    catalog.add_item(item("healthy", "cpu", 60));

    let resolver = ConfigResolver::new(&catalog);
    let config = resolver.effective_config("d1").unwrap();

    assert_eq!(config.errors.len(), 1);
    assert!(matches!(config.errors[0], ResolveError::Cycle { .. }));
    let keys: Vec<_> = config.items.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, vec!["cpu"]);
}

#[test]
fn effective_config_for_unknown_device_fails() {
    let catalog = Catalog::new();
    let resolver = ConfigResolver::new(&catalog);
    assert_eq!(
        resolver.effective_config("missing").unwrap_err(),
        ResolveError::DeviceNotFound("missing".to_string())
    );
}

#[test]
fn device_without_templates_has_empty_config() {
    let mut catalog = Catalog::new();
    catalog.add_device(device("lonely"));
    let resolver = ConfigResolver::new(&catalog);
    let config = resolver.effective_config("lonely").unwrap();
    assert!(config.items.is_empty());
    assert!(config.templates.is_empty());
    assert!(config.triggers.is_empty());
}
