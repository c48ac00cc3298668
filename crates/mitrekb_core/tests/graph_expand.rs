use mitrekb_core::db::open_db_in_memory;
use mitrekb_core::{Bundle, Ingester, IntelService, KbConfig, NameSearchScope};
use serde_json::{json, Value};

fn technique(id: &str, ttp: &str, name: &str) -> Value {
    json!({
        "type": "attack-pattern",
        "id": id,
        "name": name,
        "kill_chain_phases": [
            {"kill_chain_name": "mitre-attack", "phase_name": "defense-evasion"}
        ],
        "external_references": [
            {"source_name": "mitre-attack", "external_id": ttp, "url": format!("https://attack.example/{ttp}")}
        ]
    })
}

fn relationship(source: &str, target: &str, verb: &str) -> Value {
    json!({
        "type": "relationship",
        "id": format!("relationship--{source}-{verb}-{target}"),
        "source_ref": source,
        "target_ref": target,
        "relationship_type": verb
    })
}

fn fixture_objects() -> Value {
    json!([
        technique("attack-pattern--t1055", "T1055", "Process Injection"),
        technique("attack-pattern--t1056", "T1056", "Input Capture"),
        {
            "type": "intrusion-set",
            "id": "intrusion-set--g0007",
            "name": "APT28",
            "external_references": [
                {"source_name": "mitre-attack", "external_id": "G0007", "url": "https://attack.example/G0007"}
            ]
        },
        {
            "type": "campaign",
            "id": "campaign--c0001",
            "name": "Frankenstein",
            "external_references": [
                {"source_name": "mitre-attack", "external_id": "C0001", "url": "https://attack.example/C0001"}
            ]
        },
        relationship("intrusion-set--g0007", "attack-pattern--t1055", "uses"),
        relationship("intrusion-set--g0007", "attack-pattern--t1056", "uses"),
        relationship("campaign--c0001", "intrusion-set--g0007", "attributed-to"),
        // Endpoint that no entity table knows about.
        relationship("intrusion-set--g0007", "attack-pattern--revoked", "uses"),
    ])
}

fn fixture_service(config: KbConfig) -> IntelService {
    let mut conn = open_db_in_memory().unwrap();
    let ingester = Ingester::new(&config);
    let bundle: Bundle =
        serde_json::from_value(json!({ "type": "bundle", "objects": fixture_objects() })).unwrap();
    ingester.ingest_bundle(&mut conn, &bundle).unwrap();
    IntelService::with_connection(conn, config)
}

#[test]
fn expand_by_id_collects_neighbors_across_kinds() {
    let service = fixture_service(KbConfig::default());

    let view = service.expand("G0007").unwrap().unwrap();
    assert_eq!(view.focal_id, "intrusion-set--g0007");
    // Focal + two techniques + campaign; the revoked endpoint is absent.
    assert_eq!(view.nodes.len(), 4);
    assert_eq!(view.edges.len(), 3);
    assert!(view.nodes.contains_key("campaign--c0001"));
    assert!(!view.nodes.contains_key("attack-pattern--revoked"));
}

#[test]
fn every_edge_has_both_endpoints_in_the_node_map() {
    let service = fixture_service(KbConfig::default());

    let view = service.expand("G0007").unwrap().unwrap();
    for edge in &view.edges {
        assert!(view.nodes.contains_key(&edge.source_id));
        assert!(view.nodes.contains_key(&edge.target_id));
    }
}

#[test]
fn edge_direction_is_preserved_for_inbound_relationships() {
    let service = fixture_service(KbConfig::default());

    let view = service.expand("G0007").unwrap().unwrap();
    let attribution = view
        .edges
        .iter()
        .find(|e| e.relationship_type == "attributed-to")
        .unwrap();
    // The campaign points at the group even though the group is focal.
    assert_eq!(attribution.source_id, "campaign--c0001");
    assert_eq!(attribution.target_id, "intrusion-set--g0007");
}

#[test]
fn node_labels_prefer_the_canonical_external_id() {
    let service = fixture_service(KbConfig::default());

    let view = service.expand("G0007").unwrap().unwrap();
    assert_eq!(view.nodes["intrusion-set--g0007"].label, "G0007");
    assert_eq!(view.nodes["attack-pattern--t1055"].label, "T1055");
}

#[test]
fn unresolved_focal_is_none_not_error() {
    let service = fixture_service(KbConfig::default());
    assert!(service.expand("T9999").unwrap().is_none());
    assert!(service.expand("no such entity").unwrap().is_none());
    assert!(service.expand("   ").unwrap().is_none());
}

#[test]
fn campaign_focal_sees_only_its_attribution_edge() {
    let service = fixture_service(KbConfig::default());

    let view = service.expand("C0001").unwrap().unwrap();
    assert_eq!(view.focal_id, "campaign--c0001");
    // Only the attribution edge touches the campaign.
    assert_eq!(view.nodes.len(), 2);
    assert_eq!(view.edges.len(), 1);
}

#[test]
fn default_name_scope_resolves_groups_only() {
    let service = fixture_service(KbConfig::default());

    let view = service.expand("apt28").unwrap().unwrap();
    assert_eq!(view.focal_id, "intrusion-set--g0007");

    // Technique and campaign names stay out of scope by default.
    assert!(service.expand("Process Injection").unwrap().is_none());
    assert!(service.expand("Frankenstein").unwrap().is_none());
}

#[test]
fn widened_name_scope_resolves_any_kind() {
    let config = KbConfig {
        name_search_scope: NameSearchScope::AllKinds,
        ..KbConfig::default()
    };
    let service = fixture_service(config);

    let by_technique = service.expand("Process Injection").unwrap().unwrap();
    assert_eq!(by_technique.focal_id, "attack-pattern--t1055");

    let by_campaign = service.expand("Frankenstein").unwrap().unwrap();
    assert_eq!(by_campaign.focal_id, "campaign--c0001");
}

#[test]
fn small_batch_size_still_resolves_all_neighbors() {
    let config = KbConfig {
        graph_batch_size: 1,
        ..KbConfig::default()
    };
    let service = fixture_service(config);

    let view = service.expand("G0007").unwrap().unwrap();
    assert_eq!(view.nodes.len(), 4);
    assert_eq!(view.edges.len(), 3);
}
