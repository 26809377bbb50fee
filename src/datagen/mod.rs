//! Synthetic payload generation.
//!
//! One seeded [`StdRng`] drives every random choice of a run, so a fixed seed
//! reproduces the exact same payloads. Reference fields are filled from the
//! instance registry and never invented.

mod words;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Number, Value};

use crate::error::HarnessError;
use crate::resources::{
    CsvKind, Encoding, FieldKind, FieldSpec, InstanceRegistry, Payload, Primitive, ResourceSpec,
    TextSpec, TextStyle,
};

use words::{COMPANY_SUFFIXES, DOMAINS, SURNAMES, WORDS};

pub struct DataGenerator {
    rng: StdRng,
    seed: u64,
}

impl DataGenerator {
    /// Without a seed, a random one is drawn so the run can still be replayed.
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Builds a create payload filling every required and optional field.
    pub fn generate(
        &mut self,
        spec: &ResourceSpec,
        registry: &InstanceRegistry,
    ) -> Result<Payload, HarnessError> {
        let mut body = Map::new();
        for field in spec.fields() {
            let value = self.field_value(spec, field, registry)?;
            body.insert(field.name.clone(), value);
        }

        let upload = match &spec.encoding {
            Encoding::Json => None,
            Encoding::Multipart { csv, rows, .. } => Some(self.csv(*csv, *rows)),
        };

        Ok(Payload {
            body: Value::Object(body),
            upload,
        })
    }

    fn field_value(
        &mut self,
        spec: &ResourceSpec,
        field: &FieldSpec,
        registry: &InstanceRegistry,
    ) -> Result<Value, HarnessError> {
        self.kind_value(spec, &field.name, &field.kind, registry)
    }

    fn kind_value(
        &mut self,
        spec: &ResourceSpec,
        field: &str,
        kind: &FieldKind,
        registry: &InstanceRegistry,
    ) -> Result<Value, HarnessError> {
        let value = match kind {
            FieldKind::Primitive(primitive) => self.primitive(primitive),
            FieldKind::Reference { resource } => {
                let id = registry
                    .first_created(resource)
                    .and_then(|instance| instance.created_id())
                    .ok_or_else(|| HarnessError::UnresolvedReference {
                        resource: spec.type_name.clone(),
                        field: field.to_string(),
                        target: resource.clone(),
                    })?;
                Value::String(id.to_string())
            }
            FieldKind::Enum(values) => values.choose(&mut self.rng).cloned().unwrap_or(Value::Null),
            FieldKind::Object(fields) => {
                let mut object = Map::new();
                for nested in fields {
                    let path = format!("{field}.{}", nested.name);
                    let value = self.kind_value(spec, &path, &nested.kind, registry)?;
                    object.insert(nested.name.clone(), value);
                }
                Value::Object(object)
            }
            FieldKind::List { item, len } => {
                let mut items = Vec::with_capacity(*len);
                for _ in 0..*len {
                    items.push(self.kind_value(spec, field, item, registry)?);
                }
                Value::Array(items)
            }
        };
        Ok(value)
    }

    fn primitive(&mut self, primitive: &Primitive) -> Value {
        match primitive {
            Primitive::Text(spec) => Value::String(self.text(spec)),
            Primitive::Integer { min, max } => Value::from(self.rng.gen_range(*min..=*max)),
            Primitive::Number { min, max } => {
                let raw = self.rng.gen_range(*min..=*max);
                let rounded = ((raw * 100.0).round() / 100.0).clamp(*min, *max);
                Number::from_f64(rounded).map(Value::Number).unwrap_or(Value::Null)
            }
            Primitive::Boolean => Value::Bool(self.rng.gen_bool(0.5)),
            Primitive::Literal(value) => value.clone(),
        }
    }

    /// Text for `spec`, affixes included, never longer than `max_len` chars.
    pub fn text(&mut self, spec: &TextSpec) -> String {
        let affix_len = spec.prefix.as_deref().map_or(0, str::len)
            + spec.suffix.as_deref().map_or(0, str::len);
        let budget = spec.max_len.map(|max| max.saturating_sub(affix_len));

        let core = match &spec.style {
            TextStyle::Word => self.word().to_string(),
            TextStyle::Sentence => self.sentence(),
            TextStyle::Paragraph => self.paragraph(budget.unwrap_or(200)),
            TextStyle::Company => self.company(),
            TextStyle::Url => self.url(),
            TextStyle::Semver => self.semver(),
        };
        let core = match budget {
            Some(budget) => truncate(&core, budget),
            None => core,
        };

        format!(
            "{}{core}{}",
            spec.prefix.as_deref().unwrap_or_default(),
            spec.suffix.as_deref().unwrap_or_default()
        )
    }

    /// CSV upload with a header row and `rows` data rows. Generated text never
    /// contains commas.
    pub fn csv(&mut self, kind: CsvKind, rows: usize) -> String {
        let mut lines = Vec::with_capacity(rows + 1);
        match kind {
            CsvKind::QuestionAnswer => {
                lines.push("question,answer,ground_truth".to_string());
                for _ in 0..rows {
                    let question = strip_commas(&self.sentence());
                    let answer = strip_commas(&self.paragraph(100));
                    let ground_truth = strip_commas(&self.sentence());
                    lines.push(format!("{question},{answer},{ground_truth}"));
                }
            }
            CsvKind::Context => {
                lines.push("context,metadata".to_string());
                for _ in 0..rows {
                    let context = strip_commas(&self.paragraph(200));
                    let source = self.url();
                    lines.push(format!("{context},{{\"source\": \"{source}\"}}"));
                }
            }
        }
        lines.join("\n")
    }

    fn word(&mut self) -> &'static str {
        pick(&mut self.rng, WORDS)
    }

    fn sentence(&mut self) -> String {
        let count = self.rng.gen_range(4..=10);
        let words: Vec<&str> = (0..count).map(|_| self.word()).collect();
        let mut sentence = capitalize(&words.join(" "));
        sentence.push('.');
        sentence
    }

    fn paragraph(&mut self, max_len: usize) -> String {
        let mut paragraph = String::new();
        loop {
            let sentence = self.sentence();
            let needed = if paragraph.is_empty() {
                sentence.len()
            } else {
                paragraph.len() + 1 + sentence.len()
            };
            if needed > max_len {
                if paragraph.is_empty() {
                    paragraph = truncate(&sentence, max_len);
                }
                break;
            }
            if !paragraph.is_empty() {
                paragraph.push(' ');
            }
            paragraph.push_str(&sentence);
        }
        paragraph
    }

    fn company(&mut self) -> String {
        let name = pick(&mut self.rng, SURNAMES);
        let suffix = pick(&mut self.rng, COMPANY_SUFFIXES);
        format!("{name} {suffix}")
    }

    fn url(&mut self) -> String {
        let host = format!("{}{}", self.word(), self.word());
        let tld = pick(&mut self.rng, DOMAINS);
        format!("https://www.{host}.{tld}/")
    }

    fn semver(&mut self) -> String {
        format!(
            "{}.{}.{}",
            self.rng.gen_range(1..=3),
            self.rng.gen_range(0..10),
            self.rng.gen_range(0..10)
        )
    }
}

fn pick(rng: &mut StdRng, values: &[&'static str]) -> &'static str {
    values.choose(rng).copied().unwrap_or_default()
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn strip_commas(text: &str) -> String {
    text.replace(',', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{GeneratedInstance, InstanceKey, builtin_catalog};

    fn registry_with(created: &[(&str, &str)]) -> InstanceRegistry {
        let mut registry = InstanceRegistry::new();
        for (resource, id) in created {
            let key = InstanceKey::primary(resource);
            registry.insert(GeneratedInstance::pending(key.clone()));
            registry.mark_created(&key, id.to_string());
        }
        registry
    }

    #[test]
    fn fixed_seed_is_deterministic() {
        let catalog = builtin_catalog();
        let registry = registry_with(&[("agents", "a-1"), ("datasets", "d-1"), ("prompts", "p-1")]);

        let run = |seed| {
            let mut generator = DataGenerator::new(Some(seed));
            catalog
                .specs()
                .iter()
                .filter(|spec| spec.type_name != "reports")
                .map(|spec| generator.generate(spec, &registry).unwrap())
                .collect::<Vec<_>>()
        };

        assert_eq!(run(42), run(42));
        assert_ne!(run(42), run(43));
    }

    #[test]
    fn every_declared_field_is_filled() {
        let catalog = builtin_catalog();
        let spec = catalog.get("agents").unwrap();
        let payload = DataGenerator::new(Some(1))
            .generate(spec, &InstanceRegistry::new())
            .unwrap();

        for field in spec.fields() {
            assert!(payload.body.get(&field.name).is_some(), "missing {}", field.name);
        }
        assert!(payload.body["name"].as_str().unwrap().ends_with(" Agent"));
        assert_eq!(payload.body["tags"].as_array().unwrap().len(), 3);
        assert!(payload.upload.is_none());
    }

    #[test]
    fn constraints_are_respected() {
        let catalog = builtin_catalog();
        let agents = catalog.get("agents").unwrap();
        let reports = catalog.get("reports").unwrap();
        let registry = registry_with(&[("evaluations", "e-1")]);
        let mut generator = DataGenerator::new(Some(7));

        for _ in 0..50 {
            let agent = generator.generate(agents, &registry).unwrap().body;
            assert!(agent["description"].as_str().unwrap().chars().count() <= 200);
            let domain = agent["domain"].as_str().unwrap();
            assert!(["healthcare", "finance", "education", "customer_service"].contains(&domain));
            let temperature = agent["config"]["temperature"].as_f64().unwrap();
            assert!((0.0..=1.0).contains(&temperature));

            let report = generator.generate(reports, &registry).unwrap().body;
            let max_examples = report["max_examples"].as_i64().unwrap();
            assert!((1..=10).contains(&max_examples));
        }
    }

    #[test]
    fn references_use_created_instances() {
        let catalog = builtin_catalog();
        let registry = registry_with(&[("agents", "a-1"), ("datasets", "d-1"), ("prompts", "p-1")]);

        let payload = DataGenerator::new(Some(3))
            .generate(catalog.get("evaluations").unwrap(), &registry)
            .unwrap();

        assert_eq!(payload.body["agent_id"], "a-1");
        assert_eq!(payload.body["dataset_id"], "d-1");
        assert_eq!(payload.body["prompt_id"], "p-1");
    }

    #[test]
    fn missing_reference_is_unresolved() {
        let catalog = builtin_catalog();
        let registry = registry_with(&[("agents", "a-1")]);

        let err = DataGenerator::new(Some(3))
            .generate(catalog.get("evaluations").unwrap(), &registry)
            .unwrap_err();

        assert_eq!(
            err,
            HarnessError::UnresolvedReference {
                resource: "evaluations".into(),
                field: "dataset_id".into(),
                target: "datasets".into(),
            }
        );
    }

    #[test]
    fn dataset_upload_is_comma_free_csv() {
        let catalog = builtin_catalog();
        let payload = DataGenerator::new(Some(9))
            .generate(catalog.get("datasets").unwrap(), &InstanceRegistry::new())
            .unwrap();

        let csv = payload.upload.unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("question,answer,ground_truth"));
        let rows: Vec<&str> = lines.collect();
        assert_eq!(rows.len(), 3);
        for row in rows {
            assert_eq!(row.split(',').count(), 3);
        }
    }

    #[test]
    fn context_csv_has_metadata_column() {
        let csv = DataGenerator::new(Some(5)).csv(CsvKind::Context, 2);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "context,metadata");
        assert!(lines[1].contains("{\"source\": \"https://www."));
    }

    #[test]
    fn doomed_dataset_uploads_context_rows() {
        let catalog = builtin_catalog();
        let doomed = catalog.get("datasets").unwrap().for_label("doomed");
        let payload = DataGenerator::new(Some(4))
            .generate(&doomed, &InstanceRegistry::new())
            .unwrap();

        assert_eq!(payload.body["type"], "context");
        let csv = payload.upload.unwrap();
        assert_eq!(csv.lines().next(), Some("context,metadata"));
        assert_eq!(csv.lines().count(), 4);
    }

    #[test]
    fn length_limits_include_affixes() {
        let mut generator = DataGenerator::new(Some(11));

        let short = generator.text(&TextSpec::new(TextStyle::Paragraph).prefix("Note: ").max_len(20));
        assert!(short.starts_with("Note: "));
        assert!(short.chars().count() <= 20);
    }

    #[test]
    fn unseeded_generator_records_its_seed() {
        let generator = DataGenerator::new(None);
        let replay = DataGenerator::new(Some(generator.seed()));
        assert_eq!(generator.seed(), replay.seed());
    }
}
