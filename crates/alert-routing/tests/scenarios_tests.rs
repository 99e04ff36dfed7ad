//! End-to-end routing scenarios against the engine's public API.

use alert_routing::{
    AlertNode, AlertRule, Catalog, ChannelKind, Frequency, Person, RoutingEngine, RoutingError,
    RuleUpdate, TriState, Webhook,
};

fn scenario_engine() -> RoutingEngine {
    let catalog = Catalog::new(vec![AlertNode::branch(
        "server-root",
        "Server",
        1,
        vec![
            AlertNode::branch("c1", "C1", 2, vec![AlertNode::leaf("L1", "L1", 3)]),
            AlertNode::leaf("c2", "C2", 2),
        ],
    )])
    .unwrap();
    RoutingEngine::from_catalog(&catalog)
}

fn webhook(id: &str) -> Webhook {
    Webhook {
        id: id.to_string(),
        name: format!("Bot {id}"),
        endpoint: format!("https://chat.example.com/hook/{id}"),
    }
}

fn person(id: &str) -> Person {
    Person {
        id: id.to_string(),
        name: format!("Person {id}"),
        contact_id: format!("@{id}"),
    }
}

#[test]
fn test_robot_cascade_from_root() {
    let mut engine = scenario_engine();
    engine.add_webhook(webhook("w1"));

    engine
        .set_channel_cascade("server-root", ChannelKind::Robot, true)
        .unwrap();

    for key in ["server-root", "c1", "c2", "L1"] {
        assert!(engine.channel(key, &ChannelKind::Robot).unwrap(), "{key}");
    }
    assert_eq!(
        engine
            .aggregate_tri("server-root", &ChannelKind::Robot)
            .unwrap(),
        TriState::True
    );
}

#[test]
fn test_partial_disable_makes_root_indeterminate() {
    let mut engine = scenario_engine();
    engine.add_webhook(webhook("w1"));
    engine
        .set_channel_cascade("server-root", ChannelKind::Robot, true)
        .unwrap();

    engine
        .set_channel_cascade("c1", ChannelKind::Robot, false)
        .unwrap();

    assert_eq!(
        engine
            .aggregate_tri("server-root", &ChannelKind::Robot)
            .unwrap(),
        TriState::Indeterminate
    );
    assert_eq!(
        engine.aggregate_tri("c1", &ChannelKind::Robot).unwrap(),
        TriState::False
    );
    assert_eq!(
        engine.aggregate_tri("c2", &ChannelKind::Robot).unwrap(),
        TriState::True
    );
}

#[test]
fn test_duplicate_apps_are_rejected_on_save() {
    let mut engine = RoutingEngine::from_catalog(&Catalog::builtin());

    let rules = vec![
        AlertRule::new("server", Frequency::OneHour),
        AlertRule::new("server", Frequency::TwentyFourHours),
    ];
    let err = engine.replace_rules("server-deploy", rules).unwrap_err();
    assert!(matches!(
        err,
        RoutingError::DuplicateApp { ref key, ref app } if key == "server-deploy" && app == "server"
    ));

    // Nothing was stored, so opening the node still seeds the defaults.
    let seeded = engine.open_rules("server-deploy").unwrap();
    let apps: Vec<_> = seeded.iter().filter_map(AlertRule::app_key).collect();
    assert_eq!(apps, vec!["client", "server"]);
}

#[test]
fn test_duplicate_apps_built_through_edits() {
    let mut engine = RoutingEngine::from_catalog(&Catalog::builtin());
    engine.open_rules("server-deploy").unwrap();

    let id = engine.add_rule("server-deploy").unwrap();
    engine
        .update_rule("server-deploy", &id, RuleUpdate::App(Some(" server ".to_string())))
        .unwrap();
    engine
        .update_rule(
            "server-deploy",
            &id,
            RuleUpdate::Frequency(Some(Frequency::TwentyFourHours)),
        )
        .unwrap();

    assert!(matches!(
        engine.validate_rules("server-deploy"),
        Err(RoutingError::DuplicateApp { .. })
    ));

    engine.remove_rule("server-deploy", &id).unwrap();
    assert!(engine.validate_rules("server-deploy").is_ok());
}

#[test]
fn test_unset_apps_never_collide() {
    let mut engine = RoutingEngine::from_catalog(&Catalog::builtin());
    let rules = vec![
        AlertRule::empty(),
        AlertRule::empty(),
        AlertRule::new("client", Frequency::FiveMinutes),
        AlertRule::new("server", Frequency::FiveMinutes),
    ];
    assert!(engine.replace_rules("cdn-refresh", rules).is_ok());
    assert_eq!(engine.rules("cdn-refresh").unwrap().len(), 4);
}

#[test]
fn test_needs_configuration_until_assigned() {
    let mut engine = scenario_engine();
    engine.add_webhook(webhook("id1"));
    engine.add_webhook(webhook("id2"));

    engine
        .set_channel_cascade("c1", ChannelKind::Robot, true)
        .unwrap();
    assert!(engine.needs_configuration("c1").unwrap());
    assert!(!engine.needs_configuration("c2").unwrap());

    engine.assign_webhooks("c1", ["id1"]).unwrap();
    assert!(!engine.needs_configuration("c1").unwrap());
    assert!(!engine.needs_configuration("L1").unwrap());
    assert_eq!(engine.assigned_webhooks("L1").unwrap(), vec!["id1"]);
}

#[test]
fn test_removing_person_prunes_every_entry() {
    let mut engine = scenario_engine();
    engine.add_person(person("p7"));
    engine.add_person(person("p8"));
    engine.set_person_cascade("c1", "p7", false).unwrap();

    let removed = engine.remove_person("p7");
    assert_eq!(removed.map(|p| p.id), Some("p7".to_string()));

    let snapshot = engine.snapshot();
    assert!(snapshot
        .channels
        .iter()
        .all(|entry| entry.channel.person_id() != Some("p7")));
    assert!(snapshot
        .channels
        .iter()
        .any(|entry| entry.channel.person_id() == Some("p8")));

    // The stored opt-out is gone; lookups fall back to the default.
    assert!(engine
        .channel("L1", &ChannelKind::Person("p7".to_string()))
        .unwrap());
    assert!(engine.people().get("p7").is_none());
}

#[test]
fn test_cascade_reaches_every_descendant() {
    let catalog = Catalog::builtin();
    let mut engine = RoutingEngine::from_catalog(&catalog);

    for root in catalog.roots() {
        let affected = engine
            .set_channel_cascade(&root.key, ChannelKind::SmallPackage, true)
            .unwrap();
        for key in &affected {
            assert!(engine.channel(key, &ChannelKind::SmallPackage).unwrap());
        }
        assert_eq!(affected, engine.index().subtree_of(&root.key).unwrap());
    }

    engine
        .set_channel_cascade("server-deploy", ChannelKind::SmallPackage, false)
        .unwrap();
    for key in engine.index().subtree_of("server-deploy").unwrap() {
        assert!(!engine.channel(&key, &ChannelKind::SmallPackage).unwrap());
    }
    assert_eq!(
        engine
            .aggregate_tri("server", &ChannelKind::SmallPackage)
            .unwrap(),
        TriState::Indeterminate
    );
    assert_eq!(
        engine
            .aggregate_tri("client", &ChannelKind::SmallPackage)
            .unwrap(),
        TriState::True
    );
}

#[test]
fn test_closed_gates_mean_no_effective_pings() {
    let catalog = Catalog::builtin();
    let mut engine = RoutingEngine::from_catalog(&catalog);
    engine.add_person(person("p1"));
    engine.add_person(person("p2"));
    engine.add_webhook(webhook("w1"));

    engine
        .set_channel_cascade("client", ChannelKind::Robot, true)
        .unwrap();
    engine
        .set_channel_cascade("client-crash", ChannelKind::SmallPackage, true)
        .unwrap();
    engine
        .set_channel_cascade("client", ChannelKind::Robot, false)
        .unwrap();

    let leaves = engine.index().leaves_of("client").unwrap();
    for leaf in &leaves {
        let gate_open = engine.gate_open(leaf).unwrap();
        for p in ["p1", "p2"] {
            let effective = engine.effective_person(leaf, p).unwrap();
            if gate_open {
                assert_eq!(effective, TriState::True, "{leaf}/{p}");
            } else {
                assert_eq!(effective, TriState::False, "{leaf}/{p}");
                assert!(!engine
                    .channel(leaf, &ChannelKind::Person(p.to_string()))
                    .unwrap());
            }
        }
    }

    // Re-opening a gate does not bring persons back on its own.
    engine
        .set_channel_cascade("client-release", ChannelKind::SmallPackage, true)
        .unwrap();
    assert!(!engine
        .channel("client-release", &ChannelKind::Person("p1".to_string()))
        .unwrap());
}
