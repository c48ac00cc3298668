use mitrekb_core::db::open_db_in_memory;
use mitrekb_core::{Bundle, EntityKind, Ingester, IntelService, KbConfig};
use serde_json::{json, Value};

fn technique(id: &str, ttp: &str, name: &str, tactics: &[&str]) -> Value {
    let phases: Vec<Value> = tactics
        .iter()
        .map(|tactic| json!({"kill_chain_name": "mitre-attack", "phase_name": tactic}))
        .collect();
    json!({
        "type": "attack-pattern",
        "id": id,
        "name": name,
        "description": format!("{name} description"),
        "kill_chain_phases": phases,
        "x_mitre_platforms": ["Windows", "Linux"],
        "x_mitre_detection": "Monitor process memory",
        "external_references": [
            {"source_name": "mitre-attack", "external_id": ttp, "url": format!("https://attack.example/{ttp}")},
            {"source_name": "capec", "external_id": format!("CAPEC-{ttp}"), "url": "https://capec.example"}
        ]
    })
}

fn fixture_service() -> IntelService {
    let mut conn = open_db_in_memory().unwrap();
    let config = KbConfig::default();
    let ingester = Ingester::new(&config);

    let bundle: Bundle = serde_json::from_value(json!({
        "type": "bundle",
        "objects": [
            technique("attack-pattern--t1055", "T1055", "Process Injection",
                      &["defense-evasion", "privilege-escalation"]),
            technique("attack-pattern--t1055-011", "T1055.011", "Extra Window Memory Injection",
                      &["defense-evasion", "privilege-escalation"]),
            technique("attack-pattern--t1056", "T1056", "Input Capture",
                      &["collection", "credential-access"]),
            technique("attack-pattern--t1497", "T1497", "Virtualization Evasion",
                      &["defense-evasion"]),
            {
                "type": "intrusion-set",
                "id": "intrusion-set--g0007",
                "name": "APT28",
                "description": "Also tracked as Fancy Bear",
                "external_references": [
                    {"source_name": "mitre-attack", "external_id": "G0007", "url": "https://attack.example/G0007"}
                ]
            },
            {
                "type": "tool",
                "id": "tool--s0154",
                "name": "Cobalt Strike",
                "description": "Commercial adversary simulation platform",
                "external_references": [
                    {"source_name": "mitre-attack", "external_id": "S0154", "url": "https://attack.example/S0154"}
                ]
            },
            {
                "type": "campaign",
                "id": "campaign--c0001",
                "name": "Frankenstein",
                "description": "Opportunistic campaign",
                "external_references": [
                    {"source_name": "mitre-attack", "external_id": "C0001", "url": "https://attack.example/C0001"}
                ]
            },
            {
                "type": "relationship",
                "id": "relationship--r1",
                "source_ref": "intrusion-set--g0007",
                "target_ref": "attack-pattern--t1055",
                "relationship_type": "uses"
            },
            {
                "type": "relationship",
                "id": "relationship--r2",
                "source_ref": "tool--s0154",
                "target_ref": "attack-pattern--t1055-011",
                "relationship_type": "uses"
            },
            {
                "type": "relationship",
                "id": "relationship--r3",
                "source_ref": "campaign--c0001",
                "target_ref": "attack-pattern--t1056",
                "relationship_type": "uses"
            },
            {
                "type": "relationship",
                "id": "relationship--r4",
                "source_ref": "campaign--c0001",
                "target_ref": "intrusion-set--g0007",
                "relationship_type": "attributed-to"
            }
        ]
    }))
    .unwrap();

    ingester.ingest_bundle(&mut conn, &bundle).unwrap();
    IntelService::with_connection(conn, config)
}

#[test]
fn id_prefix_search_includes_sub_techniques_only() {
    let service = fixture_service();

    let refs = service.search_by_id_prefix("T1055").unwrap();
    let ids: Vec<&str> = refs.iter().map(|r| r.external_id.as_str()).collect();
    assert_eq!(ids, vec!["T1055", "T1055.011"]);
}

#[test]
fn id_prefix_search_returns_empty_for_no_match() {
    let service = fixture_service();
    assert!(service.search_by_id_prefix("T9999").unwrap().is_empty());
    assert!(service.search_by_id_prefix("  ").unwrap().is_empty());
}

#[test]
fn text_search_is_case_insensitive_over_name_and_description() {
    let service = fixture_service();

    let by_name = service
        .search_by_text(EntityKind::Technique, "injection")
        .unwrap();
    assert_eq!(by_name.len(), 2);
    // Deterministic ordering by internal id.
    assert_eq!(by_name[0].id, "attack-pattern--t1055");
    assert_eq!(by_name[1].id, "attack-pattern--t1055-011");

    let by_description = service.search_by_text(EntityKind::Group, "FANCY BEAR").unwrap();
    assert_eq!(by_description.len(), 1);
    assert_eq!(by_description[0].external_id, "G0007");
}

#[test]
fn text_search_treats_like_wildcards_literally() {
    let service = fixture_service();
    assert!(service
        .search_by_text(EntityKind::Technique, "%")
        .unwrap()
        .is_empty());
    assert!(service
        .search_by_text(EntityKind::Technique, "_____")
        .unwrap()
        .is_empty());
}

#[test]
fn technique_detail_hydrates_attributes_and_related() {
    let service = fixture_service();

    let detail = service.get_technique_detail("T1055").unwrap().unwrap();
    assert_eq!(detail.external_id, "T1055");
    assert_eq!(detail.name, "Process Injection");
    assert_eq!(detail.tactics, vec!["defense-evasion", "privilege-escalation"]);
    assert_eq!(detail.platforms, vec!["Windows", "Linux"]);
    assert_eq!(detail.detection.as_deref(), Some("Monitor process memory"));

    let related: Vec<&str> = detail.related.iter().map(|r| r.external_id.as_str()).collect();
    // Shares defense-evasion with T1055.011 and T1497; T1056 shares nothing.
    assert_eq!(related, vec!["T1055.011", "T1497"]);
}

#[test]
fn technique_detail_excludes_focal_from_related() {
    let service = fixture_service();
    let detail = service.get_technique_detail("T1497").unwrap().unwrap();
    assert!(detail.related.iter().all(|r| r.external_id != "T1497"));
}

#[test]
fn technique_detail_miss_is_none_not_error() {
    let service = fixture_service();
    assert!(service.get_technique_detail("T9999").unwrap().is_none());
}

#[test]
fn group_search_by_exact_id_hydrates_techniques() {
    let service = fixture_service();

    let hits = service.search_groups("G0007").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "APT28");
    assert_eq!(hits[0].kind, EntityKind::Group);
    let techniques: Vec<&str> = hits[0]
        .techniques
        .iter()
        .map(|t| t.external_id.as_str())
        .collect();
    assert_eq!(techniques, vec!["T1055"]);
}

#[test]
fn group_search_falls_back_to_name_substring() {
    let service = fixture_service();
    let hits = service.search_groups("apt").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].external_id, "G0007");
}

#[test]
fn software_and_campaign_searches_hydrate_their_projections() {
    let service = fixture_service();

    let software = service.search_software("S0154").unwrap();
    assert_eq!(software.len(), 1);
    assert_eq!(software[0].techniques[0].external_id, "T1055.011");

    let campaigns = service.search_campaigns("franken").unwrap();
    assert_eq!(campaigns.len(), 1);
    assert_eq!(campaigns[0].external_id, "C0001");
    assert_eq!(campaigns[0].techniques[0].external_id, "T1056");
}

#[test]
fn wrong_kind_id_is_treated_as_name_text() {
    let service = fixture_service();
    // A technique id is not an exact-match key for group search.
    assert!(service.search_groups("T1055").unwrap().is_empty());
}

#[test]
fn no_match_is_empty_not_error() {
    let service = fixture_service();
    assert!(service.search_groups("nonexistent").unwrap().is_empty());
    assert!(service.search_software("nonexistent").unwrap().is_empty());
    assert!(service.search_campaigns("nonexistent").unwrap().is_empty());
}
