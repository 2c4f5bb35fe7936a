use vtl_plan::{
    AggCall, BinOp, CorrelateJoin, DataType, Expr, Field, JoinType, LateralProjection, Literal, PlanNode,
};
use vtl_registry::{
    ArtifactCoordinate, FunctionRegistry, OperandTypeRule, RegistryConfig, ReturnTypeRule, TransportMap,
};
use vtl_spark::{ErrorCategory, SparkTranslator, TranslateError, Translation, UdfInfo};

const UDF: &str = "com.linkedin.coral.hive.hive2rel.CoralTestUDF";
const UDF2: &str = "com.linkedin.coral.hive.hive2rel.CoralTestUDF2";
const SQUARE: &str = "com.linkedin.coral.hive.hive2rel.CoralTestUdfSquare";

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn registries() -> (FunctionRegistry, TransportMap) {
    let mut functions = FunctionRegistry::new();
    functions
        .add_function(
            UDF,
            ReturnTypeRule::Fixed(DataType::Boolean),
            OperandTypeRule::Families(vec![vtl_plan::TypeFamily::Integer]),
            "com.linkedin:udf:1.0",
        )
        .unwrap();
    functions
        .add_function(
            UDF2,
            ReturnTypeRule::Fixed(DataType::Boolean),
            OperandTypeRule::Any,
            "com.linkedin:udf:1.0",
        )
        .unwrap();
    functions
        .add_function(
            SQUARE,
            ReturnTypeRule::SameAsOperand(0),
            OperandTypeRule::Any,
            "com.linkedin:udf:1.1",
        )
        .unwrap();

    let mut transports = TransportMap::new();
    transports
        .add_transport(
            UDF,
            "coralTestUDF",
            "com.linkedin.coral.spark.CoralTestUDF",
            "ivy://com.linkedin:udf:1.0",
        )
        .unwrap();
    transports
        .add_transport(
            SQUARE,
            "coralTestUdfSquare",
            "com.linkedin.coral.spark.CoralTestUdfSquare",
            "ivy://com.linkedin:udf:1.1",
        )
        .unwrap();
    (functions, transports)
}

fn translate(plan: &PlanNode) -> Result<Translation, TranslateError> {
    init_logging();
    let (functions, transports) = registries();
    SparkTranslator::new(&functions, &transports).translate(plan)
}

fn int(name: &str) -> Field {
    Field::new(name, DataType::Int)
}

fn string_array() -> DataType {
    DataType::Array(Box::new(DataType::String))
}

fn foo() -> PlanNode {
    PlanNode::scan(
        "default",
        "foo",
        vec![int("a"), Field::new("b", DataType::String), Field::new("c", DataType::Double)],
    )
}

fn bar() -> PlanNode {
    PlanNode::scan("default", "bar", vec![int("x"), int("y")])
}

fn complex() -> PlanNode {
    PlanNode::scan(
        "default",
        "complex",
        vec![
            int("a"),
            Field::new("b", DataType::String),
            Field::new("c", string_array()),
            Field::new(
                "m",
                DataType::Map {
                    key: Box::new(DataType::String),
                    value: Box::new(DataType::Int),
                },
            ),
        ],
    )
}

fn explode_c(column: &str) -> PlanNode {
    PlanNode::explode(
        Expr::correl(2),
        Field::new("c", string_array()),
        vec![Field::new(column, DataType::String)],
    )
}

fn explode_complex(join_type: CorrelateJoin) -> PlanNode {
    let correlate = PlanNode::correlate(complex(), explode_c("ccol"), join_type);
    PlanNode::project(
        correlate,
        vec![
            (Expr::input(0), int("a")),
            (Expr::input(4), Field::new("ccol", DataType::String)),
        ],
    )
}

/// `SELECT bcol, bar.x FROM (SELECT b AS bcol, sum(c) AS sum_c FROM foo GROUP BY b) s
///  JOIN bar ON s.sum_c = bar.y`
fn grouped_join() -> PlanNode {
    let narrowed = PlanNode::project(
        foo(),
        vec![
            (Expr::input(1), Field::new("b", DataType::String)),
            (Expr::input(2), Field::new("c", DataType::Double)),
        ],
    );
    let grouped = PlanNode::aggregate(
        narrowed,
        vec![0],
        vec![(AggCall::new("SUM", vec![1]), Field::new("sum_c", DataType::Double))],
    );
    let renamed = PlanNode::project(
        grouped,
        vec![
            (Expr::input(0), Field::new("bcol", DataType::String)),
            (Expr::input(1), Field::new("sum_c", DataType::Double)),
        ],
    );
    let join = PlanNode::join(
        renamed,
        bar(),
        JoinType::Inner,
        Some(Expr::binary(BinOp::Eq, Expr::input(1), Expr::input(3))),
    );
    PlanNode::project(
        join,
        vec![
            (Expr::input(0), Field::new("bcol", DataType::String)),
            (Expr::input(2), int("x")),
        ],
    )
}

fn udf_over_foo(call_name: &str, qualified_name: &str) -> (Expr, Field) {
    (
        Expr::udf(call_name, qualified_name, vec![Expr::input(0)]),
        Field::new("EXPR$0", DataType::Boolean),
    )
}

#[test]
fn test_grouped_subquery_join() {
    let translation = translate(&grouped_join()).unwrap();

    assert_eq!(
        translation.sql(),
        "SELECT t0.bcol, bar.x\nFROM (SELECT b bcol, SUM(c) sum_c\nFROM default.foo\nGROUP BY b) t0\nINNER JOIN default.bar ON t0.sum_c = bar.y"
    );
    assert_eq!(translation.base_tables(), ["default.foo", "default.bar"]);
    assert!(translation.udf_manifest().is_empty());
}

#[test]
fn test_base_tables_independent_of_join_side() {
    let join = |left, right| PlanNode::join(left, right, JoinType::Inner, None);
    let foo_first = translate(&join(foo(), bar())).unwrap();
    let bar_first = translate(&join(bar(), foo())).unwrap();

    let mut a = foo_first.base_tables().to_vec();
    let mut b = bar_first.base_tables().to_vec();
    a.sort();
    b.sort();
    assert_eq!(a, ["default.bar", "default.foo"]);
    assert_eq!(a, b);
}

#[test]
fn test_lateral_view_explode() {
    let translation = translate(&explode_complex(CorrelateJoin::Inner)).unwrap();
    assert_eq!(
        translation.sql(),
        "SELECT complex.a, t1.ccol\nFROM default.complex LATERAL VIEW EXPLODE(complex.c) t1 AS ccol"
    );
    assert_eq!(translation.base_tables(), ["default.complex"]);
}

#[test]
fn test_outer_lateral_view_explode() {
    let translation = translate(&explode_complex(CorrelateJoin::Left)).unwrap();
    assert_eq!(
        translation.sql(),
        "SELECT complex.a, t1.ccol\nFROM default.complex LATERAL VIEW OUTER EXPLODE(IF(complex.c IS NOT NULL AND size(complex.c) > 0, complex.c, ARRAY (NULL))) t1 AS ccol"
    );
}

#[test]
fn test_multiple_lateral_views() {
    let first = PlanNode::correlate(complex(), explode_c("ccol"), CorrelateJoin::Inner);
    let second = PlanNode::correlate(first, explode_c("ccol2"), CorrelateJoin::Inner);
    let plan = PlanNode::project(
        second,
        vec![
            (Expr::input(0), int("a")),
            (Expr::input(4), Field::new("ccol", DataType::String)),
            (Expr::input(5), Field::new("ccol2", DataType::String)),
        ],
    );

    let translation = translate(&plan).unwrap();
    assert_eq!(
        translation.sql(),
        "SELECT complex.a, t1.ccol, t4.ccol2\nFROM default.complex LATERAL VIEW EXPLODE(complex.c) t1 AS ccol LATERAL VIEW EXPLODE(complex.c) t4 AS ccol2"
    );
}

#[test]
fn test_lateral_view_feeding_a_join() {
    let exploded = PlanNode::correlate(complex(), explode_c("ccol"), CorrelateJoin::Inner);
    let plan = PlanNode::join(
        exploded,
        bar(),
        JoinType::Inner,
        Some(Expr::binary(BinOp::Eq, Expr::input(0), Expr::input(5))),
    );

    let translation = translate(&plan).unwrap();
    // the correlate's own alias names the derived table
    assert_eq!(
        translation.sql(),
        "SELECT *\nFROM (SELECT *\nFROM default.complex LATERAL VIEW EXPLODE(complex.c) t1 AS ccol) t2\nINNER JOIN default.bar ON t2.a = bar.x"
    );
    assert_eq!(translation.base_tables(), ["default.complex", "default.bar"]);
}

#[test]
fn test_wildcard_lateral_view_fails_without_output() {
    let dummy = PlanNode::values(vec![vec![Literal::Integer(0)]], vec![int("ZERO")]);
    let right = PlanNode::uncollect(
        PlanNode::project(dummy, vec![(Expr::correl(2), Field::new("c", string_array()))]),
        vec![Field::new("ccol", DataType::String)],
        LateralProjection::Wildcard,
    );
    let plan = PlanNode::correlate(complex(), right, CorrelateJoin::Inner);

    let err = translate(&plan).unwrap_err();
    assert_eq!(err, TranslateError::LateralViewWildcard);
    assert_eq!(err.category(), ErrorCategory::UnsupportedConstruct);
}

#[test]
fn test_map_explode_is_unsupported() {
    let right = PlanNode::explode(
        Expr::correl(3),
        Field::new("m", complex().fields[3].data_type.clone()),
        vec![Field::new("key", DataType::String), int("value")],
    );
    let plan = PlanNode::correlate(complex(), right, CorrelateJoin::Inner);

    let err = translate(&plan).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::UnsupportedConstruct);
    assert!(matches!(err, TranslateError::MultiColumnExplode { columns } if columns == ["key", "value"]));
}

#[test]
fn test_group_by_lateral_column_is_rejected() {
    let grouped = PlanNode::aggregate(
        explode_complex(CorrelateJoin::Inner),
        vec![1],
        vec![(AggCall::new("COUNT", vec![]), Field::new("cnt", DataType::BigInt))],
    );

    let err = translate(&grouped).unwrap_err();
    assert_eq!(
        err,
        TranslateError::LateralColumnInGroupBy {
            column: "ccol".to_string()
        }
    );
    assert_eq!(err.category(), ErrorCategory::UnsupportedConstruct);
}

#[test]
fn test_aggregating_lateral_column_is_allowed() {
    let grouped = PlanNode::aggregate(
        explode_complex(CorrelateJoin::Inner),
        vec![0],
        vec![(AggCall::new("COUNT", vec![1]), Field::new("cnt", DataType::BigInt))],
    );

    assert_eq!(
        translate(&grouped).unwrap().sql(),
        "SELECT complex.a, COUNT(t1.ccol) cnt\nFROM default.complex LATERAL VIEW EXPLODE(complex.c) t1 AS ccol\nGROUP BY complex.a"
    );
}

#[test]
fn test_complex_type_constructors() {
    let map = |k1: &str, v1: i64, k2: &str, v2: i64| Expr::Map {
        entries: vec![(Expr::string(k1), Expr::int(v1)), (Expr::string(k2), Expr::int(v2))],
    };
    let array = Expr::Array {
        elements: vec![map("abc", 123, "def", 567), map("pqr", 65, "xyz", 89)],
    };
    let subscript = Expr::item(Expr::item(array, Expr::int(0)), Expr::string("abc"));
    let plan = PlanNode::project(bar(), vec![(subscript, int("EXPR$0"))]);

    assert_eq!(
        translate(&plan).unwrap().sql(),
        "SELECT ARRAY (MAP ('abc', 123, 'def', 567), MAP ('pqr', 65, 'xyz', 89))[0]['abc']\nFROM default.bar"
    );
}

#[test]
fn test_named_struct() {
    let record = Expr::Struct {
        function: "named_struct".to_string(),
        fields: vec![("abc".to_string(), Expr::int(123)), ("def".to_string(), Expr::string("xyz"))],
    };

    let access = PlanNode::project(
        bar(),
        vec![(Expr::field_access(record.clone(), "def"), Field::new("EXPR$0", DataType::String))],
    );
    assert_eq!(
        translate(&access).unwrap().sql(),
        "SELECT named_struct('abc', 123, 'def', 'xyz').def\nFROM default.bar"
    );

    let aliased = PlanNode::project(bar(), vec![(record, Field::new("named_struc", DataType::String))]);
    assert_eq!(
        translate(&aliased).unwrap().sql(),
        "SELECT named_struct('abc', 123, 'def', 'xyz') named_struc\nFROM default.bar"
    );
}

#[test]
fn test_cast() {
    let plan = PlanNode::project(
        bar(),
        vec![(Expr::cast(Expr::int(1), "STRING"), Field::new("EXPR$0", DataType::String))],
    );
    assert_eq!(translate(&plan).unwrap().sql(), "SELECT CAST(1 AS STRING)\nFROM default.bar");
}

#[test]
fn test_transport_map_takes_precedence() {
    let plan = PlanNode::project(foo(), vec![udf_over_foo("default_foo_coraltestudf", UDF)]);
    let translation = translate(&plan).unwrap();

    assert_eq!(translation.sql(), "SELECT coralTestUDF(a)\nFROM default.foo");
    assert_eq!(
        translation.udf_manifest(),
        [UdfInfo {
            callable_name: "coralTestUDF".to_string(),
            implementation_class: "com.linkedin.coral.spark.CoralTestUDF".to_string(),
            artifact: ArtifactCoordinate::parse("ivy://com.linkedin:udf:1.0").unwrap(),
        }]
    );
}

#[test]
fn test_registry_only_function_falls_back() {
    let plan = PlanNode::project(foo(), vec![udf_over_foo("default_foo_coraltestudf2", UDF2)]);
    let translation = translate(&plan).unwrap();

    assert_eq!(translation.sql(), "SELECT default_foo_coraltestudf2(a)\nFROM default.foo");
    let manifest = translation.udf_manifest();
    assert_eq!(manifest.len(), 1);
    assert_eq!(manifest[0].callable_name, "default_foo_coraltestudf2");
    assert_eq!(manifest[0].implementation_class, UDF2);
    assert_eq!(manifest[0].artifact_url(), "ivy://com.linkedin:udf:1.0");
}

#[test]
fn test_two_functions_in_one_view() {
    let plan = PlanNode::project(
        foo(),
        vec![
            udf_over_foo("default_foo_coraltestudf", UDF),
            (
                Expr::udf("default_foo_coraltestudfsquare", SQUARE, vec![Expr::input(0)]),
                int("sq"),
            ),
            (
                Expr::udf("default_foo_coraltestudfsquare", SQUARE, vec![Expr::int(3)]),
                int("nine"),
            ),
        ],
    );
    let translation = translate(&plan).unwrap();

    assert_eq!(
        translation.sql(),
        "SELECT coralTestUDF(a), coralTestUdfSquare(a) sq, coralTestUdfSquare(3) nine\nFROM default.foo"
    );
    let classes: Vec<_> = translation
        .udf_manifest()
        .iter()
        .map(|u| u.implementation_class.as_str())
        .collect();
    assert_eq!(
        classes,
        [
            "com.linkedin.coral.spark.CoralTestUDF",
            "com.linkedin.coral.spark.CoralTestUdfSquare"
        ]
    );
}

#[test]
fn test_udf_in_filter_and_aggregate() {
    let filtered = PlanNode::filter(
        foo(),
        Expr::udf("default_foo_coraltestudf", UDF, vec![Expr::input(0)]),
    );
    let grouped = PlanNode::aggregate(
        filtered,
        vec![1],
        vec![(
            AggCall {
                qualified_name: Some(SQUARE.to_string()),
                ..AggCall::new("default_foo_coraltestudfsquare", vec![0])
            },
            int("sq"),
        )],
    );
    let translation = translate(&grouped).unwrap();

    assert_eq!(
        translation.sql(),
        "SELECT b, coralTestUdfSquare(a) sq\nFROM default.foo\nWHERE coralTestUDF(a)\nGROUP BY b"
    );
    assert_eq!(translation.udf_manifest().len(), 2);
}

#[test]
fn test_whitespace_in_coordinates_is_ignored() {
    let plan = PlanNode::project(foo(), vec![udf_over_foo("f", UDF2)]);
    let transports = TransportMap::new();

    let mut tidy = FunctionRegistry::new();
    tidy.add_function(UDF2, ReturnTypeRule::Fixed(DataType::Boolean), OperandTypeRule::Any, "com.linkedin:udf:1.0")
        .unwrap();
    let mut messy = FunctionRegistry::new();
    messy
        .add_function(
            UDF2,
            ReturnTypeRule::Fixed(DataType::Boolean),
            OperandTypeRule::Any,
            "  com.linkedin : udf:\t1.0 ",
        )
        .unwrap();

    let a = SparkTranslator::new(&tidy, &transports).translate(&plan).unwrap();
    let b = SparkTranslator::new(&messy, &transports).translate(&plan).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_unregistered_function() {
    let plan = PlanNode::project(foo(), vec![udf_over_foo("nope", "com.example.Unknown")]);
    let err = translate(&plan).unwrap_err();

    assert_eq!(err, TranslateError::UnregisteredFunction("com.example.Unknown".to_string()));
    assert_eq!(err.category(), ErrorCategory::UnsupportedConstruct);
}

#[test]
fn test_builtin_functions_need_no_registration() {
    let plan = PlanNode::project(
        foo(),
        vec![(
            Expr::function("concat", vec![Expr::input(1), Expr::string("!")]),
            Field::new("EXPR$0", DataType::String),
        )],
    );
    let translation = translate(&plan).unwrap();
    assert_eq!(translation.sql(), "SELECT concat(b, '!')\nFROM default.foo");
    assert!(translation.udf_manifest().is_empty());
}

#[test]
fn test_translation_is_idempotent() {
    let (functions, transports) = registries();
    let translator = SparkTranslator::new(&functions, &transports);
    let plan = PlanNode::project(
        grouped_join(),
        vec![
            (Expr::input(0), Field::new("bcol", DataType::String)),
            (Expr::udf("f", UDF, vec![Expr::input(1)]), Field::new("flag", DataType::Boolean)),
        ],
    );

    let first = translator.translate(&plan).unwrap();
    let second = translator.translate(&plan).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_alias_numbering_is_deterministic() {
    let build = || {
        let filtered = PlanNode::filter(complex(), Expr::binary(BinOp::Gt, Expr::input(0), Expr::int(0)));
        let exploded = PlanNode::correlate(filtered, explode_c("ccol"), CorrelateJoin::Left);
        PlanNode::union(vec![exploded.clone(), exploded], true)
    };
    let a = translate(&build()).unwrap();
    let b = translate(&build()).unwrap();

    assert_eq!(a.sql(), b.sql());
}

#[test]
fn test_aliases_are_unique() {
    let inner = PlanNode::filter(grouped_join(), Expr::binary(BinOp::Gt, Expr::input(1), Expr::int(0)));
    let plan = PlanNode::join(
        inner,
        PlanNode::sort(bar(), vec![], Some(10)),
        JoinType::Full,
        Some(Expr::binary(BinOp::Eq, Expr::input(1), Expr::input(2))),
    );
    let sql = translate(&plan).unwrap().sql().to_string();

    let aliases: Vec<&str> = sql
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| w.len() > 1 && w.starts_with('t') && w[1..].chars().all(|c| c.is_ascii_digit()))
        .collect();
    let mut unique = aliases.clone();
    unique.sort();
    unique.dedup();
    assert!(!unique.is_empty());
    // each derived table alias is declared once and referenced afterwards
    for alias in &unique {
        assert_eq!(sql.matches(&format!(") {}", alias)).count(), 1, "{alias} declared twice in {sql}");
    }
}

#[test]
fn test_contract_violations() {
    let mut broken = PlanNode::project(foo(), vec![(Expr::input(0), int("a"))]);
    broken.inputs.clear();
    let err = translate(&broken).unwrap_err();
    assert!(matches!(err, TranslateError::ChildArity { node: "Project", found: 0, .. }));
    assert_eq!(err.category(), ErrorCategory::ContractViolation);

    let dangling = PlanNode::filter(bar(), Expr::binary(BinOp::Eq, Expr::input(9), Expr::int(1)));
    assert_eq!(
        translate(&dangling).unwrap_err(),
        TranslateError::DanglingColumn { index: 9, available: 2 }
    );

    let unbound = PlanNode::project(bar(), vec![(Expr::correl(0), int("x"))]);
    assert_eq!(translate(&unbound).unwrap_err(), TranslateError::UnboundCorrelation(0));

    let mut miscounted = PlanNode::project(bar(), vec![(Expr::input(0), int("x"))]);
    miscounted.fields.push(int("y"));
    assert_eq!(
        translate(&miscounted).unwrap_err(),
        TranslateError::FieldCount {
            node: "Project",
            declared: 2,
            produced: 1
        }
    );
}

#[test]
fn test_plan_from_json_with_yaml_registries() {
    init_logging();
    let config = RegistryConfig::from_yaml_str(
        r#"
functions:
  - name: com.linkedin.coral.hive.hive2rel.CoralTestUdfSquare
    return_type: { same_as_operand: 0 }
    dependency: "com.linkedin:udf:1.1"
transports:
  - name: com.linkedin.coral.hive.hive2rel.CoralTestUdfSquare
    callable: coralTestUdfSquare
    class: com.linkedin.coral.spark.CoralTestUdfSquare
    artifact: "ivy://com.linkedin:udf:1.1"
"#,
    )
    .unwrap();
    let (functions, transports) = config.build().unwrap();

    let plan = PlanNode::project(
        bar(),
        vec![(
            Expr::udf("square", SQUARE, vec![Expr::input(1)]),
            int("y2"),
        )],
    );
    let json = serde_json::to_string(&plan).unwrap();
    let plan: PlanNode = serde_json::from_str(&json).unwrap();

    let translation = SparkTranslator::new(&functions, &transports).translate(&plan).unwrap();
    assert_eq!(translation.sql(), "SELECT coralTestUdfSquare(y) y2\nFROM default.bar");
    assert_eq!(translation.udf_manifest()[0].artifact_url(), "ivy://com.linkedin:udf:1.1");
}
