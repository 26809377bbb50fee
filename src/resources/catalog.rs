use serde_json::json;

use super::{
    CsvKind, Encoding, FieldKind, FieldSpec, Primitive, ResourceCatalog, ResourceSpec, TextSpec,
    TextStyle, Variant,
};

fn spec(
    type_name: &str,
    required_fields: Vec<FieldSpec>,
    optional_fields: Vec<FieldSpec>,
    depends_on: &[&str],
    requires_auth: bool,
) -> ResourceSpec {
    ResourceSpec {
        type_name: type_name.to_string(),
        collection_path: format!("/api/{type_name}/"),
        required_fields,
        optional_fields,
        depends_on: depends_on.iter().map(|dep| dep.to_string()).collect(),
        encoding: Encoding::Json,
        requires_auth,
        variants: Vec::new(),
    }
}

fn description(max_len: usize) -> FieldKind {
    FieldKind::styled(TextSpec::new(TextStyle::Paragraph).max_len(max_len))
}

fn always(value: serde_json::Value) -> FieldKind {
    FieldKind::literal(value)
}

fn agents() -> ResourceSpec {
    spec(
        "agents",
        vec![
            FieldSpec::new(
                "name",
                FieldKind::styled(TextSpec::new(TextStyle::Company).suffix(" Agent")),
            ),
            FieldSpec::new(
                "domain",
                FieldKind::one_of(["healthcare", "finance", "education", "customer_service"]),
            ),
        ],
        vec![
            FieldSpec::new("description", description(200)),
            FieldSpec::new("api_endpoint", FieldKind::text(TextStyle::Url)),
            FieldSpec::new(
                "config",
                FieldKind::Object(vec![
                    FieldSpec::new(
                        "temperature",
                        FieldKind::Primitive(Primitive::Number { min: 0.0, max: 1.0 }),
                    ),
                    FieldSpec::new(
                        "max_tokens",
                        FieldKind::Primitive(Primitive::Integer { min: 256, max: 4096 }),
                    ),
                ]),
            ),
            FieldSpec::new("is_active", always(json!(true))),
            FieldSpec::new(
                "model_type",
                FieldKind::one_of(["gpt-4", "claude-2", "llama-2-70b"]),
            ),
            FieldSpec::new("version", FieldKind::text(TextStyle::Semver)),
            FieldSpec::new("tags", FieldKind::list(FieldKind::text(TextStyle::Word), 3)),
        ],
        &[],
        false,
    )
}

fn prompts() -> ResourceSpec {
    spec(
        "prompts",
        vec![
            FieldSpec::new(
                "name",
                FieldKind::styled(TextSpec::new(TextStyle::Word).prefix("Prompt ")),
            ),
            FieldSpec::new("content", description(500)),
        ],
        vec![
            FieldSpec::new("description", description(100)),
            FieldSpec::new(
                "parameters",
                FieldKind::Object(vec![FieldSpec::new(
                    "system_message",
                    FieldKind::text(TextStyle::Sentence),
                )]),
            ),
            FieldSpec::new("version", FieldKind::text(TextStyle::Semver)),
            FieldSpec::new("is_public", FieldKind::Primitive(Primitive::Boolean)),
        ],
        &[],
        false,
    )
}

fn datasets() -> ResourceSpec {
    let mut datasets = spec(
        "datasets",
        vec![
            FieldSpec::new(
                "name",
                FieldKind::styled(TextSpec::new(TextStyle::Word).prefix("Test Dataset ")),
            ),
            FieldSpec::new("type", always(json!("question_answer"))),
        ],
        vec![
            FieldSpec::new("description", description(100)),
            FieldSpec::new("is_public", FieldKind::Primitive(Primitive::Boolean)),
        ],
        &[],
        true,
    );
    datasets.encoding = Encoding::Multipart {
        file_field: "file".to_string(),
        file_name: "test_data.csv".to_string(),
        csv: CsvKind::QuestionAnswer,
        rows: 3,
    };
    // The dataset the delete case removes is a context dataset.
    datasets.variants.push(Variant {
        label: "doomed".to_string(),
        fields: vec![
            FieldSpec::new("type", always(json!("context"))),
            FieldSpec::new("description", always(json!("Dataset to be deleted"))),
        ],
        csv: Some(CsvKind::Context),
    });
    datasets
}

fn evaluations() -> ResourceSpec {
    spec(
        "evaluations",
        vec![
            FieldSpec::new(
                "name",
                FieldKind::styled(TextSpec::new(TextStyle::Word).prefix("Evaluation ")),
            ),
            FieldSpec::new("agent_id", FieldKind::reference("agents")),
            FieldSpec::new("dataset_id", FieldKind::reference("datasets")),
            FieldSpec::new("prompt_id", FieldKind::reference("prompts")),
        ],
        vec![
            FieldSpec::new("description", description(100)),
            FieldSpec::new(
                "method",
                FieldKind::one_of(["ragas", "deepeval", "custom", "manual"]),
            ),
            FieldSpec::new("config", always(json!({"include_detailed_scores": true}))),
            FieldSpec::new(
                "metrics",
                always(json!(["relevance", "coherence", "fluency"])),
            ),
        ],
        &["agents", "datasets", "prompts"],
        true,
    )
}

fn reports() -> ResourceSpec {
    let mut optional = vec![
        FieldSpec::new("description", description(100)),
        FieldSpec::new("format", FieldKind::one_of(["pdf", "html", "json"])),
        FieldSpec::new("is_public", FieldKind::Primitive(Primitive::Boolean)),
    ];
    optional.extend(
        [
            "include_executive_summary",
            "include_evaluation_details",
            "include_metrics_overview",
            "include_detailed_results",
            "include_agent_responses",
        ]
        .into_iter()
        .map(|flag| FieldSpec::new(flag, always(json!(true)))),
    );
    optional.push(FieldSpec::new(
        "max_examples",
        FieldKind::Primitive(Primitive::Integer { min: 1, max: 10 }),
    ));

    spec(
        "reports",
        vec![
            FieldSpec::new(
                "name",
                FieldKind::styled(TextSpec::new(TextStyle::Word).prefix("Report ")),
            ),
            FieldSpec::new("evaluation_id", FieldKind::reference("evaluations")),
        ],
        optional,
        &["evaluations"],
        true,
    )
}

/// The resource types of the LLM evaluation API.
pub fn builtin_catalog() -> ResourceCatalog {
    [agents(), prompts(), datasets(), evaluations(), reports()]
        .into_iter()
        .collect::<ResourceCatalog>()
}
