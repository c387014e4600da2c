#![allow(clippy::manual_async_fn)]

use std::sync::{Arc, Mutex};

use asupersync::runtime::RuntimeBuilder;
use sqlrel::prelude::*;
use sqlrel::{ConfigErrorKind, QueryErrorKind, ValidationErrorKind, specs};

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

fn expect_err<T>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Ok(_) => panic!("expected an error"),
        Outcome::Err(e) => e,
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

/// Returns canned rows and records every statement it receives.
#[derive(Default)]
struct RecordingExecutor {
    rows: Vec<Row>,
    fail: Option<String>,
    statements: Mutex<Vec<(String, Vec<Value>)>>,
}

impl RecordingExecutor {
    fn returning(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            fail: Some(message.to_string()),
            ..Self::default()
        }
    }

    fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.statements.lock().expect("statement log").clone()
    }
}

impl QueryExecutor for RecordingExecutor {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl std::future::Future<Output = Outcome<Vec<Row>, Error>> + Send {
        self.statements
            .lock()
            .expect("statement log")
            .push((sql.to_string(), params.to_vec()));
        let result = match &self.fail {
            Some(message) => Outcome::Err(Error::query(QueryErrorKind::Database, message.clone())),
            None => Outcome::Ok(self.rows.clone()),
        };
        async move { result }
    }
}

fn int(cells: &[FieldValue], name: &str) -> i64 {
    find_value(cells, name)
        .and_then(Value::as_i64)
        .unwrap_or_default()
}

fn text(cells: &[FieldValue], name: &str) -> String {
    find_value(cells, name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

// users -> roles

#[derive(Debug, Clone, PartialEq)]
struct Role {
    id: i64,
    name: String,
}

#[derive(Debug, Clone, PartialEq)]
struct User {
    id: i64,
    email: String,
    role: Option<Role>,
}

fn users_repository(join: JoinKind) -> Repository<User> {
    let roles = SchemaDef::new("roles", ["id", "name"]).shared();
    let role_mapper = Arc::new(|cells: &[FieldValue]| -> Result<Role> {
        Ok(Role {
            id: int(cells, "id"),
            name: text(cells, "name"),
        })
    });
    let relations = RelationBuilder::<User>::new()
        .belongs_to("r", roles)
        .local_key("role_id")
        .entity_field("role")
        .join(join)
        .map_with(role_mapper, |u: User, r: Role| User { role: Some(r), ..u })
        .build()
        .expect("valid relations");

    let users = SchemaDef::new("users", ["id", "email", "role_id"]);
    Repository::compile(
        &users,
        relations,
        |cells: &[FieldValue]| -> Result<User> {
            Ok(User {
                id: int(cells, "id"),
                email: text(cells, "email"),
                role: None,
            })
        },
        &CompilerConfig::default(),
    )
    .expect("compile users")
}

#[test]
fn list_joins_role_in_one_statement() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let repo = users_repository(JoinKind::Inner);
    let exec = RecordingExecutor::returning(vec![Row::from_pairs([
        ("id", Value::BigInt(7)),
        ("email", Value::from("ann@example.com")),
        ("role_id", Value::BigInt(2)),
        ("r__id", Value::BigInt(2)),
        ("r__name", Value::from("admin")),
    ])]);

    rt.block_on(async {
        let users = unwrap_outcome(
            repo.list(
                &cx,
                &exec,
                FindParams::new()
                    .filter(Filter::eq("email", "ann@example.com"))
                    .order_by(SortBy::desc("id"))
                    .limit(10),
            )
            .await,
        );
        assert_eq!(
            users,
            vec![User {
                id: 7,
                email: "ann@example.com".into(),
                role: Some(Role {
                    id: 2,
                    name: "admin".into()
                }),
            }]
        );
    });

    let statements = exec.statements();
    assert_eq!(statements.len(), 1);
    let (sql, params) = &statements[0];
    assert_eq!(
        sql,
        "SELECT users.*, r.id AS r__id, r.name AS r__name FROM users \
         INNER JOIN roles r ON users.role_id = r.id \
         WHERE users.email = $1 ORDER BY users.id DESC LIMIT 10"
    );
    assert_eq!(params, &vec![Value::from("ann@example.com")]);
}

#[test]
fn left_join_without_match_leaves_role_unset() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let repo = users_repository(JoinKind::Left);
    let exec = RecordingExecutor::returning(vec![Row::from_pairs([
        ("id", Value::BigInt(8)),
        ("email", Value::from("bob@example.com")),
        ("role_id", Value::Null),
        ("r__id", Value::Null),
        ("r__name", Value::Null),
    ])]);

    rt.block_on(async {
        let user = unwrap_outcome(repo.get(&cx, &exec, "id", 8_i64).await);
        assert_eq!(user.id, 8);
        assert_eq!(user.role, None);
    });

    let (sql, params) = &exec.statements()[0];
    assert!(sql.contains("LEFT JOIN roles r ON users.role_id = r.id WHERE users.id = $1"));
    assert!(!sql.contains("LIMIT"));
    assert_eq!(params, &vec![Value::BigInt(8)]);
}

#[test]
fn get_reports_not_found_and_duplicates() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let repo = users_repository(JoinKind::Left);

    rt.block_on(async {
        let empty = RecordingExecutor::default();
        let err = expect_err(repo.get(&cx, &empty, "id", 1_i64).await);
        assert!(err.is_not_found());

        let row = Row::from_pairs([("id", Value::BigInt(1))]);
        let twice = RecordingExecutor::returning(vec![row.clone(), row]);
        match expect_err(repo.get(&cx, &twice, "id", 1_i64).await) {
            Error::Query(q) => assert_eq!(q.kind, QueryErrorKind::UnexpectedResult),
            other => panic!("unexpected {other}"),
        }
    });
}

#[test]
fn exists_and_count_keep_the_joins() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let repo = users_repository(JoinKind::Inner);
    let params = || FindParams::new().filter(Filter::gt("id", 100_i64)).limit(5);

    rt.block_on(async {
        let yes = RecordingExecutor::returning(vec![Row::from_pairs([("exists", true)])]);
        assert!(unwrap_outcome(repo.exists(&cx, &yes, params()).await));
        assert_eq!(
            yes.statements()[0].0,
            "SELECT EXISTS(SELECT 1 FROM users INNER JOIN roles r ON users.role_id = r.id \
             WHERE users.id > $1)"
        );

        let counted = RecordingExecutor::returning(vec![Row::from_pairs([("count", 3_i64)])]);
        assert_eq!(unwrap_outcome(repo.count(&cx, &counted, params()).await), 3);
        assert_eq!(
            counted.statements()[0].0,
            "SELECT COUNT(*) FROM users INNER JOIN roles r ON users.role_id = r.id \
             WHERE users.id > $1"
        );
    });
}

#[test]
fn invalid_requests_never_reach_the_executor() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let repo = users_repository(JoinKind::Inner);
    let exec = RecordingExecutor::default();

    rt.block_on(async {
        let injected = JoinOptions::new().join(JoinClause::new(
            JoinKind::Left,
            "teams; DROP TABLE users",
            "users.team_id",
            "t.id",
        ));
        let err = expect_err(repo.list(&cx, &exec, FindParams::new().joins(injected)).await);
        assert!(err.is_security());

        let err = expect_err(
            repo.list(&cx, &exec, FindParams::new().filter(Filter::eq("password", "x")))
                .await,
        );
        match err {
            Error::Validation(v) => assert_eq!(v.kind, ValidationErrorKind::UnknownField),
            other => panic!("unexpected {other}"),
        }
    });

    assert!(exec.statements().is_empty());
}

#[test]
fn request_joins_are_appended_after_relation_joins() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let repo = users_repository(JoinKind::Inner);
    let exec = RecordingExecutor::returning(Vec::new());

    rt.block_on(async {
        let extra = JoinOptions::new()
            .join(JoinClause::new(JoinKind::Left, "teams", "users.team_id", "t.id").alias("t"))
            .select(["users.id", "t.name AS team_name"]);
        let users = unwrap_outcome(repo.list(&cx, &exec, FindParams::new().joins(extra)).await);
        assert!(users.is_empty());
    });

    assert_eq!(
        exec.statements()[0].0,
        "SELECT users.id, t.name AS team_name FROM users \
         INNER JOIN roles r ON users.role_id = r.id LEFT JOIN teams t ON users.team_id = t.id"
    );
}

#[test]
fn executor_errors_propagate() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let repo = users_repository(JoinKind::Inner);
    let exec = RecordingExecutor::failing("connection reset");

    rt.block_on(async {
        match expect_err(repo.list(&cx, &exec, FindParams::new()).await) {
            Error::Query(q) => {
                assert_eq!(q.kind, QueryErrorKind::Database);
                assert_eq!(q.message, "connection reset");
            }
            other => panic!("unexpected {other}"),
        }
    });
}

// persons -> documents (has many) -> authority (belongs to) -> regions (has many)

#[derive(Debug, Clone, PartialEq)]
struct Region {
    name: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Authority {
    id: i64,
    name: String,
    regions: Vec<Region>,
}

#[derive(Debug, Clone, PartialEq)]
struct Document {
    id: i64,
    number: String,
    authority: Option<Authority>,
}

#[derive(Debug, Clone, PartialEq)]
struct Person {
    id: i64,
    first_name: String,
    documents: Option<Vec<Document>>,
}

fn persons_repository() -> Repository<Person> {
    let regions = SchemaDef::new("insurance.authority_regions", ["id", "name"]).shared();
    let region_mapper = Arc::new(|cells: &[FieldValue]| -> Result<Region> {
        Ok(Region {
            name: text(cells, "name"),
        })
    });
    let authority_relations = RelationBuilder::<Authority>::new()
        .has_many("regions", regions)
        .local_key("id")
        .remote_key("authority_id")
        .entity_field("regions")
        .map_with(region_mapper, |mut a: Authority, r: Region| {
            a.regions.push(r);
            a
        })
        .build()
        .expect("authority relations");

    let authorities = SchemaDef::new("insurance.document_authorities", ["id", "name"])
        .with_relations(specs(&authority_relations))
        .shared();
    let authority_mapper = Arc::new(
        RelationMapper::new(|cells: &[FieldValue]| -> Result<Authority> {
            Ok(Authority {
                id: int(cells, "id"),
                name: text(cells, "name"),
                regions: Vec::new(),
            })
        })
        .with_relations(authority_relations),
    );
    let document_relations = RelationBuilder::<Document>::new()
        .belongs_to("da", authorities)
        .local_key("authority_id")
        .entity_field("authority")
        .map_with(authority_mapper, |d: Document, a: Authority| Document {
            authority: Some(a),
            ..d
        })
        .build()
        .expect("document relations");

    let documents = SchemaDef::new("insurance.person_documents", ["id", "number", "authority_id"])
        .with_relations(specs(&document_relations))
        .shared();
    let document_mapper = Arc::new(
        RelationMapper::new(|cells: &[FieldValue]| -> Result<Document> {
            Ok(Document {
                id: int(cells, "id"),
                number: text(cells, "number"),
                authority: None,
            })
        })
        .with_relations(document_relations),
    );
    let person_relations = RelationBuilder::<Person>::new()
        .has_many("docs", documents)
        .local_key("id")
        .remote_key("person_id")
        .entity_field("documents")
        .map_with(document_mapper, |mut p: Person, d: Document| {
            p.documents.get_or_insert_with(Vec::new).push(d);
            p
        })
        .build()
        .expect("person relations");

    let persons = SchemaDef::new("insurance.persons", ["id", "first_name"]);
    Repository::compile(
        &persons,
        person_relations,
        |cells: &[FieldValue]| -> Result<Person> {
            Ok(Person {
                id: int(cells, "id"),
                first_name: text(cells, "first_name"),
                documents: None,
            })
        },
        &CompilerConfig::default().root_alias("p"),
    )
    .expect("compile persons")
}

#[test]
fn nested_collections_compile_into_one_subquery() {
    let repo = persons_repository();
    let (sql, _) = repo.select().build_list().expect("list statement");

    assert!(sql.starts_with("SELECT p.*, (SELECT COALESCE(JSON_AGG(json_build_object("));
    assert!(sql.contains(
        "'da', json_build_object('id', docs_da.id, 'name', docs_da.name, 'regions', (SELECT"
    ));
    assert!(sql.contains("FROM insurance.authority_regions docs_da_regions"));
    assert!(sql.contains("WHERE docs_da_regions.authority_id = docs_da.id"));
    assert!(sql.contains(
        "LEFT JOIN insurance.document_authorities docs_da ON docs.authority_id = docs_da.id"
    ));
    assert!(sql.contains("WHERE docs.person_id = p.id) AS docs__json"));
    assert!(sql.ends_with("FROM insurance.persons p"));
    // Nothing beneath a collection is joined at the top level.
    assert!(!sql.contains("FROM insurance.persons p LEFT JOIN"));
}

#[test]
fn nested_collections_map_back_into_entities() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let repo = persons_repository();
    let docs = r#"[
        {"id": 1, "number": "AA1", "authority_id": 5,
         "da": {"id": 5, "name": "Central", "regions": [{"id": 1, "name": "North"}, {"id": 2, "name": "South"}]}},
        {"id": 2, "number": "AA2", "authority_id": null,
         "da": {"id": null, "name": null, "regions": []}}
    ]"#;
    let exec = RecordingExecutor::returning(vec![
        Row::from_pairs([
            ("id", Value::BigInt(1)),
            ("first_name", Value::from("Aziz")),
            ("docs__json", Value::from(docs)),
        ]),
        Row::from_pairs([
            ("id", Value::BigInt(2)),
            ("first_name", Value::from("Lola")),
            ("docs__json", Value::from("[]")),
        ]),
        Row::from_pairs([
            ("id", Value::BigInt(3)),
            ("first_name", Value::from("Nil")),
            ("docs__json", Value::Null),
        ]),
    ]);

    rt.block_on(async {
        let people = unwrap_outcome(repo.list(&cx, &exec, FindParams::new()).await);
        assert_eq!(people.len(), 3);

        let documents = people[0].documents.as_ref().expect("documents");
        assert_eq!(documents.len(), 2);
        let authority = documents[0].authority.as_ref().expect("authority");
        assert_eq!(authority.name, "Central");
        assert_eq!(
            authority
                .regions
                .iter()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>(),
            vec!["North", "South"]
        );
        assert_eq!(documents[1].number, "AA2");
        assert_eq!(documents[1].authority, None);

        assert_eq!(people[1].documents, None);
        assert_eq!(people[2].documents, None);
    });
}

#[test]
fn malformed_aggregate_is_a_decode_error() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let repo = persons_repository().with_mapper_config(MapperConfig::new().best_effort());
    let exec = RecordingExecutor::returning(vec![Row::from_pairs([
        ("id", Value::BigInt(1)),
        ("docs__json", Value::from("[{\"id\": 1,")),
    ])]);

    rt.block_on(async {
        match expect_err(repo.list(&cx, &exec, FindParams::new()).await) {
            Error::Decode(d) => assert_eq!(d.column, "docs__json"),
            other => panic!("unexpected {other}"),
        }
    });
}

// vehicles -> vehicle type; the group is declared on the vehicle through the type

#[derive(Debug, Clone, PartialEq)]
struct Vehicle {
    id: i64,
    kind: Option<String>,
    group: Option<String>,
}

fn name_mapper() -> Arc<RelationMapper<String>> {
    Arc::new(RelationMapper::new(|cells: &[FieldValue]| -> Result<String> {
        Ok(text(cells, "name"))
    }))
}

fn vehicle_leaf(cells: &[FieldValue]) -> Result<Vehicle> {
    Ok(Vehicle {
        id: int(cells, "id"),
        kind: None,
        group: None,
    })
}

#[test]
fn relation_bound_through_anchor_reads_anchor_prefix() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let types = SchemaDef::new("vehicle_types", ["id", "name", "group_id"]).shared();
    let groups = SchemaDef::new("vehicle_groups", ["id", "name"]).shared();
    let relations = RelationBuilder::<Vehicle>::new()
        .belongs_to("vt", types)
        .local_key("type_id")
        .entity_field("kind")
        .map_with(name_mapper(), |v: Vehicle, name: String| Vehicle {
            kind: Some(name),
            ..v
        })
        .belongs_to("vg", groups)
        .local_key("group_id")
        .entity_field("group")
        .through("vt")
        .map_with(name_mapper(), |v: Vehicle, name: String| Vehicle {
            group: Some(name),
            ..v
        })
        .build()
        .expect("valid relations");
    let vehicles = SchemaDef::new("vehicles", ["id", "type_id"]);
    let repo = Repository::compile(&vehicles, relations, vehicle_leaf, &CompilerConfig::default())
        .expect("compile vehicles");
    assert_eq!(repo.mapper().prefix_of("vg"), "vt__vg");

    let exec = RecordingExecutor::returning(vec![
        Row::from_pairs([
            ("id", Value::BigInt(1)),
            ("type_id", Value::BigInt(2)),
            ("vt__id", Value::BigInt(2)),
            ("vt__name", Value::from("sedan")),
            ("vt__group_id", Value::BigInt(3)),
            ("vt__vg__id", Value::BigInt(3)),
            ("vt__vg__name", Value::from("passenger")),
        ]),
        Row::from_pairs([
            ("id", Value::BigInt(2)),
            ("type_id", Value::BigInt(4)),
            ("vt__id", Value::BigInt(4)),
            ("vt__name", Value::from("trailer")),
            ("vt__group_id", Value::Null),
            ("vt__vg__id", Value::Null),
            ("vt__vg__name", Value::Null),
        ]),
    ]);

    rt.block_on(async {
        let found = unwrap_outcome(repo.list(&cx, &exec, FindParams::new()).await);
        assert_eq!(
            found,
            vec![
                Vehicle {
                    id: 1,
                    kind: Some("sedan".into()),
                    group: Some("passenger".into()),
                },
                Vehicle {
                    id: 2,
                    kind: Some("trailer".into()),
                    group: None,
                },
            ]
        );
    });

    let (sql, _) = &exec.statements()[0];
    assert_eq!(
        sql,
        "SELECT vehicles.*, vt.id AS vt__id, vt.name AS vt__name, vt.group_id AS vt__group_id, \
         vg.id AS vt__vg__id, vg.name AS vt__vg__name FROM vehicles \
         LEFT JOIN vehicle_types vt ON vehicles.type_id = vt.id \
         LEFT JOIN vehicle_groups vg ON vt.group_id = vg.id"
    );
}

#[test]
fn binding_beneath_a_collection_is_rejected() {
    let docs = SchemaDef::new("vehicle_docs", ["id", "issuer_id"]).shared();
    let issuers = SchemaDef::new("issuers", ["id", "name"]).shared();
    let relations = RelationBuilder::<Vehicle>::new()
        .has_many("docs", docs)
        .local_key("id")
        .remote_key("vehicle_id")
        .entity_field("docs")
        .belongs_to("di", issuers)
        .local_key("issuer_id")
        .entity_field("issuer")
        .through("docs")
        .map_with(name_mapper(), |v: Vehicle, name: String| Vehicle {
            group: Some(name),
            ..v
        })
        .build()
        .expect("valid relations");
    let vehicles = SchemaDef::new("vehicles", ["id"]);

    let unbound = RelationBuilder::<Vehicle>::new()
        .has_many("docs", SchemaDef::new("vehicle_docs", ["id"]).shared())
        .local_key("id")
        .remote_key("vehicle_id")
        .entity_field("docs")
        .build()
        .expect("valid relations");
    assert!(
        Repository::compile(&vehicles, unbound, vehicle_leaf, &CompilerConfig::default()).is_ok()
    );

    match Repository::compile(&vehicles, relations, vehicle_leaf, &CompilerConfig::default()) {
        Err(Error::Config(e)) => {
            assert_eq!(e.kind, ConfigErrorKind::AbsorbedBinding);
            assert_eq!(e.alias, "di");
        }
        Err(other) => panic!("unexpected {other}"),
        Ok(_) => panic!("binding beneath a collection compiled"),
    }
}
