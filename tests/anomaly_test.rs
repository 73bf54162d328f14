// ==========================================
// Anomaly analysis integration tests
// ==========================================
// Stored forest + mappings → AnomalyReport via HierarchyApi
// ==========================================


use hierarchy_recon::config::config_keys;
use hierarchy_recon::domain::MappingFlags;
use hierarchy_recon::repository::HierarchyRepository;
use hierarchy_recon::{AnomalyType, Severity, SourceMapping};
use serde_json::Value;
use test_helpers::{node, open_repo, setup_api, PROJECT};

const REVENUE_TREE: &str = "HIERARCHY_ID,HIERARCHY_NAME,PARENT_ID,SORT_ORDER\n\
                            REV,Revenue,,1\n\
                            PS,Product Sales,REV,1\n\
                            SV,Service Revenue,REV,2\n\
                            OT,Other Income,REV,3\n";

const REVENUE_MAPPINGS: &str = "HIERARCHY_ID,MAPPING_INDEX,SOURCE_DATABASE,SOURCE_SCHEMA,SOURCE_TABLE,SOURCE_COLUMN,SOURCE_COLUMN_TYPE\n\
                                PS,1,DW,SALES,FACT_SALES,AMOUNT,DECIMAL\n\
                                SV,1,DW,SALES,FACT_SALES,AMOUNT,DECIMAL\n";

fn seeded() -> (tempfile::NamedTempFile, String, hierarchy_recon::HierarchyApi) {
    let (tmp, db_path, api) = setup_api();
    api.import_csv_text(PROJECT, REVENUE_TREE, None).unwrap();
    let summary = api.import_mappings_text(PROJECT, REVENUE_MAPPINGS).unwrap();
    assert_eq!(summary.imported, 2, "{:?}", summary.errors);
    (tmp, db_path, api)
}

fn candidate(column: &str, column_type: &str) -> SourceMapping {
    SourceMapping {
        mapping_index: 1,
        database: "DW".to_string(),
        schema: "SALES".to_string(),
        table: "FACT_SALES".to_string(),
        column: column.to_string(),
        column_type: Some(column_type.to_string()),
        source_filter_value: None,
        precedence_group: None,
        flags: MappingFlags::default(),
    }
}

#[test]
fn test_analyze_reports_mapping_findings() {
    let (_tmp, _db_path, api) = seeded();

    let report = api.analyze(PROJECT).unwrap();
    let kinds: Vec<(AnomalyType, Severity)> = report
        .anomalies
        .iter()
        .map(|a| (a.anomaly_type, a.severity))
        .collect();
    assert_eq!(report.summary.total, 3, "{:?}", kinds);

    let duplicate = report
        .anomalies
        .iter()
        .find(|a| a.anomaly_type == AnomalyType::DuplicateMapping)
        .expect("duplicate mapping reported");
    assert_eq!(duplicate.severity, Severity::Warning);
    assert_eq!(duplicate.details["column"], Value::String("AMOUNT".to_string()));

    let missing = report
        .anomalies
        .iter()
        .find(|a| a.anomaly_type == AnomalyType::MissingMapping)
        .expect("unmapped leaf reported");
    assert_eq!(missing.node_ref.as_ref().unwrap().hierarchy_id, "OT");

    let sum = report
        .anomalies
        .iter()
        .find(|a| a.anomaly_type == AnomalyType::FormulaIssue)
        .expect("missing rollup reported");
    assert_eq!(sum.severity, Severity::Info);
    assert!(sum.auto_fixable);
    assert_eq!(sum.node_ref.as_ref().unwrap().hierarchy_id, "REV");
    assert_eq!(report.summary.auto_fixable_count, 1);

    // most severe first
    let severities: Vec<Severity> = report.anomalies.iter().map(|a| a.severity).collect();
    let mut sorted = severities.clone();
    sorted.sort();
    assert_eq!(severities, sorted);
}

#[test]
fn test_analyze_finds_cycle_written_behind_importer() {
    let (_tmp, db_path, api) = setup_api();
    api.import_csv_text(
        PROJECT,
        "HIERARCHY_ID,HIERARCHY_NAME,PARENT_ID\nA,Alpha,\nB,Beta,A\n",
        None,
    )
    .unwrap();

    let repo = open_repo(&db_path);
    let b = node(&repo, PROJECT, "B");
    let mut a = node(&repo, PROJECT, "A");
    a.set_parent(Some(b.id.clone()));
    repo.update(&a).unwrap();

    let report = api.analyze(PROJECT).unwrap();
    let cycles: Vec<_> = report
        .anomalies
        .iter()
        .filter(|a| a.anomaly_type == AnomalyType::CircularReference)
        .collect();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].severity, Severity::Error);
    let mut members: Vec<String> = cycles[0].details["cycle"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    members.sort();
    assert_eq!(members, vec!["A".to_string(), "B".to_string()]);

    // the exporter still terminates on the cyclic forest
    let text = api.export(PROJECT).unwrap();
    assert_eq!(text.lines().count(), 3);
}

#[test]
fn test_disabled_checks_are_skipped() {
    let (_tmp, _db_path, api) = seeded();
    api.set_config(
        Some(PROJECT),
        config_keys::DISABLED_CHECKS,
        "duplicate_mapping,missing_mapping",
    )
    .unwrap();

    let report = api.analyze(PROJECT).unwrap();
    assert_eq!(report.summary.total, 1);
    assert_eq!(report.anomalies[0].anomaly_type, AnomalyType::FormulaIssue);
}

#[test]
fn test_naming_pattern_from_config() {
    let (_tmp, _db_path, api) = seeded();
    api.set_config(Some(PROJECT), config_keys::NAMING_PATTERN, "^[A-Z][a-z]+$")
        .unwrap();

    let report = api.analyze(PROJECT).unwrap();
    let naming: Vec<&str> = report
        .anomalies
        .iter()
        .filter(|a| a.anomaly_type == AnomalyType::NamingConvention)
        .map(|a| a.node_ref.as_ref().unwrap().hierarchy_id.as_str())
        .collect();
    // every name except the single-word "Revenue"
    assert_eq!(naming.len(), 3);
    assert!(!naming.contains(&"REV"));
}

#[test]
fn test_mapping_change_feedback() {
    let (_tmp, db_path, api) = seeded();

    // same target as PS and SV, numeric type on a value-like name
    let findings = api
        .check_mapping_change(PROJECT, "OT", &candidate("AMOUNT", "DECIMAL"))
        .unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].anomaly_type, AnomalyType::DuplicateMapping);

    // fresh target, text column behind "Product Sales"
    let findings = api
        .check_mapping_change(PROJECT, "PS", &candidate("DESCRIPTION", "VARCHAR(200)"))
        .unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].anomaly_type, AnomalyType::TypeMismatch);

    // nothing is stored by the check
    let repo = open_repo(&db_path);
    assert!(node(&repo, PROJECT, "OT").source_mappings.is_empty());
    assert_eq!(repo.find_all_by_project(PROJECT).unwrap().len(), 4);
}
