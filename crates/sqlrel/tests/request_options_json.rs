use sqlrel::prelude::*;

fn vehicles() -> (RelationGraph, Vec<String>) {
    let types = SchemaDef::new("insurance.vehicle_types", ["id", "name", "group_id"]).shared();
    let groups = SchemaDef::new("insurance.vehicle_groups", ["id", "name"]).shared();
    let relations = RelationBuilder::<()>::new()
        .belongs_to("vt", types)
        .local_key("vehicle_type_id")
        .entity_field("vehicle_type")
        .belongs_to("vg", groups)
        .local_key("group_id")
        .entity_field("vehicle_group")
        .through("vt")
        .build()
        .expect("valid relations");
    let graph = RelationGraph::compile(
        "insurance.vehicles",
        &sqlrel::specs(&relations),
        &CompilerConfig::default(),
    )
    .expect("compile vehicles");
    (graph, vec!["id".into(), "vehicle_type_id".into(), "plate".into()])
}

#[test]
fn request_joins_decode_from_json_and_merge() {
    let (graph, fields) = vehicles();
    let request: JoinOptions = serde_json::from_str(
        r#"{
            "joins": [
                {"kind": "inner", "table": "insurance.persons", "alias": "owner",
                 "left": "insurance.vehicles.owner_id", "right": "owner.id"}
            ],
            "select_columns": ["insurance.vehicles.plate", "owner.first_name AS owner_name"]
        }"#,
    )
    .expect("decode join options");

    let (sql, _) = SelectQuery::new(&graph, &fields)
        .params(FindParams::new().joins(request))
        .build_list()
        .expect("list statement");

    assert_eq!(
        sql,
        "SELECT insurance.vehicles.plate, owner.first_name AS owner_name \
         FROM insurance.vehicles \
         LEFT JOIN insurance.vehicle_types vt ON insurance.vehicles.vehicle_type_id = vt.id \
         LEFT JOIN insurance.vehicle_groups vg ON vt.group_id = vg.id \
         INNER JOIN insurance.persons owner ON insurance.vehicles.owner_id = owner.id"
    );
}

#[test]
fn decoded_injection_is_rejected_before_sql() {
    let (graph, fields) = vehicles();
    let request: JoinOptions = serde_json::from_str(
        r#"{"joins": [{"table": "insurance.persons", "left": "a.id", "right": "b.id -- x"}]}"#,
    )
    .expect("decode join options");
    assert_eq!(request.joins[0].kind, JoinKind::Left);

    let err = SelectQuery::new(&graph, &fields)
        .params(FindParams::new().joins(request))
        .build_list()
        .unwrap_err();
    assert!(err.is_security());
}

#[test]
fn sort_keys_decode_from_json() {
    let (graph, fields) = vehicles();
    let sort: Vec<SortBy> =
        serde_json::from_str(r#"[{"column": "plate"}, {"column": "id", "direction": "desc"}]"#)
            .expect("decode sort");
    let mut params = FindParams::new().limit(20).offset(40);
    params.sort = sort;

    let (sql, _) = SelectQuery::new(&graph, &fields)
        .params(params)
        .build_list()
        .expect("list statement");
    assert!(sql.ends_with(
        "ORDER BY insurance.vehicles.plate ASC, insurance.vehicles.id DESC LIMIT 20 OFFSET 40"
    ));
}
