//! Runtime snapshot: declarations validated, compiled and decoded into the model the executor reads.

use crate::action::rules::{parse_conformations, parse_validations, FieldConformation, FieldValidation};
use crate::action::{ActionCatalog, ActionDefinition, InField, Outcome, OutcomeMethod};
use crate::compiler::{CompileOptions, CompiledSchema, SchemaCompiler};
use crate::config::{retain_valid, system_actions, ActionConfig, FullConfig};
use crate::error::ConfigError;
use crate::expr::AttributeTemplate;
use crate::schema::{column_type, ColumnType};

/// Immutable result of one configuration load. Reloads build a new snapshot and swap it in.
#[derive(Clone, Debug, Default)]
pub struct EngineSnapshot {
    pub schema: CompiledSchema,
    pub actions: ActionCatalog,
    /// Problems found while building; the offending items are not in the snapshot.
    pub diagnostics: Vec<ConfigError>,
}

impl EngineSnapshot {
    pub fn build(config: FullConfig, options: &CompileOptions) -> Self {
        let (config, mut diagnostics) = retain_valid(config);
        let compilation = SchemaCompiler::new(config.tables)
            .relations(config.relations)
            .options(options.clone())
            .compile();
        diagnostics.extend(compilation.diagnostics);
        let schema = compilation.schema;

        let builtin = if options.system_relations {
            system_actions()
        } else {
            Vec::new()
        };
        let mut actions = ActionCatalog::default();
        for declared in builtin.iter().chain(config.actions.iter()) {
            let decoded = if schema.table(&declared.on_type).is_none() {
                Err(ConfigError::MissingReference {
                    kind: "entity type",
                    id: declared.on_type.clone(),
                })
            } else {
                decode_action(declared)
            };
            if let Err(e) = decoded.and_then(|action| actions.insert(action)) {
                tracing::error!(action = %declared.key(), error = %e, "action skipped");
                diagnostics.push(e);
            }
        }
        tracing::info!(
            tables = schema.tables.len(),
            relations = schema.relations.len(),
            actions = actions.len(),
            diagnostics = diagnostics.len(),
            "snapshot built"
        );
        EngineSnapshot {
            schema,
            actions,
            diagnostics,
        }
    }
}

/// Semantic type of an input: exact name, else the part before the first `.` (`file.json` -> `file`).
fn input_type(field: &InField) -> Option<&'static ColumnType> {
    column_type(&field.column_type).or_else(|| {
        field
            .column_type
            .split_once('.')
            .and_then(|(base, _)| column_type(base))
    })
}

/// Decode one action. Input types contribute their default rules ahead of declared ones.
pub fn decode_action(config: &ActionConfig) -> Result<ActionDefinition, ConfigError> {
    let mut validations = Vec::new();
    let mut conformations = Vec::new();
    for field in &config.in_fields {
        let Some(ty) = input_type(field) else { continue };
        let key = field.key();
        let rules = parse_validations(key, ty.validations)?;
        if !rules.is_empty() {
            validations.push(FieldValidation {
                column_name: key.to_string(),
                rules,
                when_present: true,
            });
        }
        let steps = parse_conformations(key, ty.conformations)?;
        if !steps.is_empty() {
            conformations.push(FieldConformation {
                column_name: key.to_string(),
                steps,
            });
        }
    }
    for tag in &config.validations {
        validations.push(FieldValidation {
            column_name: tag.column_name.clone(),
            rules: parse_validations(&tag.column_name, &tag.tags)?,
            when_present: false,
        });
    }
    for tag in &config.conformations {
        conformations.push(FieldConformation {
            column_name: tag.column_name.clone(),
            steps: parse_conformations(&tag.column_name, &tag.tags)?,
        });
    }

    let outcomes = config
        .outcomes
        .iter()
        .map(|o| {
            Ok(Outcome {
                target: o.target.clone(),
                method: OutcomeMethod::decode(&config.name, &o.method, &o.target)?,
                reference: o.reference.clone(),
                attributes: if o.attributes.is_null() {
                    AttributeTemplate::empty()
                } else {
                    AttributeTemplate::compile(&o.attributes)
                },
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    Ok(ActionDefinition {
        name: config.name.clone(),
        label: if config.label.is_empty() {
            config.name.clone()
        } else {
            config.label.clone()
        },
        on_type: config.on_type.clone(),
        instance_optional: config.instance_optional,
        in_fields: config.in_fields.clone(),
        validations,
        conformations,
        outcomes,
    })
}
