// ==========================================
// Source-mapping CSV integration tests
// ==========================================


use hierarchy_recon::importer::CsvParser;
use hierarchy_recon::ApiError;
use test_helpers::{node, open_repo, setup_api, PROJECT};

const TREE: &str = "HIERARCHY_ID,HIERARCHY_NAME,PARENT_ID,SORT_ORDER\n\
                    REV,Revenue,,1\n\
                    PS,Product Sales,REV,1\n\
                    SV,Service Revenue,REV,2\n";

#[test]
fn test_mapping_import_attaches_to_nodes() {
    let (_tmp, db_path, api) = setup_api();
    api.import_csv_text(PROJECT, TREE, None).unwrap();

    let summary = api
        .import_mappings_text(
            PROJECT,
            "HIERARCHY_ID,MAPPING_INDEX,SOURCE_DATABASE,SOURCE_SCHEMA,SOURCE_TABLE,SOURCE_COLUMN,SOURCE_COLUMN_TYPE,ACTIVE_FLAG\n\
             PS,2,DW,SALES,FACT_SALES,NET_AMOUNT,DECIMAL,TRUE\n\
             PS,1,DW,SALES,FACT_SALES,GROSS_AMOUNT,DECIMAL,TRUE\n\
             SV,1,DW,SALES,FACT_SERVICE,AMOUNT,NUMBER,FALSE\n\
             ZZ,1,DW,SALES,FACT_SALES,AMOUNT,DECIMAL,TRUE\n",
        )
        .unwrap();
    assert_eq!(summary.imported, 3);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].contains("ZZ"));

    let repo = open_repo(&db_path);
    let ps = node(&repo, PROJECT, "PS");
    let columns: Vec<(i64, &str)> = ps
        .source_mappings
        .iter()
        .map(|m| (m.mapping_index, m.column.as_str()))
        .collect();
    assert_eq!(columns, vec![(1, "GROSS_AMOUNT"), (2, "NET_AMOUNT")]);

    let sv = node(&repo, PROJECT, "SV");
    assert_eq!(sv.source_mappings.len(), 1);
    assert!(!sv.source_mappings[0].flags.active);
}

#[test]
fn test_mapping_export_lists_rows_in_tree_order() {
    let (_tmp, _db_path, api) = setup_api();
    api.import_csv_text(PROJECT, TREE, None).unwrap();
    api.import_mappings_text(
        PROJECT,
        "HIERARCHY_ID,MAPPING_INDEX,SOURCE_DATABASE,SOURCE_SCHEMA,SOURCE_TABLE,SOURCE_COLUMN\n\
         SV,1,DW,SALES,FACT_SERVICE,AMOUNT\n\
         PS,2,DW,SALES,FACT_SALES,NET_AMOUNT\n\
         PS,1,DW,SALES,FACT_SALES,GROSS_AMOUNT\n",
    )
    .unwrap();

    let text = api.export_mappings(PROJECT).unwrap();
    let table = CsvParser.parse_str(&text).unwrap();
    assert_eq!(table.headers.len(), 13);

    let rows: Vec<(&str, &str, &str)> = table
        .rows
        .iter()
        .map(|r| {
            (
                table.get(r, "HIERARCHY_ID").unwrap(),
                table.get(r, "MAPPING_INDEX").unwrap(),
                table.get(r, "SOURCE_COLUMN").unwrap(),
            )
        })
        .collect();
    assert_eq!(
        rows,
        vec![
            ("PS", "1", "GROSS_AMOUNT"),
            ("PS", "2", "NET_AMOUNT"),
            ("SV", "1", "AMOUNT"),
        ]
    );

    // the exported file is itself a valid mapping import
    api.init_project("P2", "Copy").unwrap();
    api.import_csv_text("P2", TREE, None).unwrap();
    let summary = api.import_mappings_text("P2", &text).unwrap();
    assert_eq!(summary.imported, 3);
    assert_eq!(api.export_mappings("P2").unwrap(), text);
}

#[test]
fn test_hierarchy_file_rejected_as_mappings() {
    let (_tmp, _db_path, api) = setup_api();
    let err = api.import_mappings_text(PROJECT, TREE).unwrap_err();
    assert!(matches!(err, ApiError::UnrecognizedFormat(_)));
}
