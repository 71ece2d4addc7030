//! Stage inspection commands

use anyhow::{Context, Result};
use langweave_core::Config;
use langweave_core::schema::{FieldType, OutputSchema};

/// List all stages
pub async fn list(config_path: &str) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let stages = config.load_stages()?;

    if stages.is_empty() {
        println!("No stages defined");
        return Ok(());
    }
    for stage in stages {
        println!(
            "{:<24} {:<26} {} -> {}",
            stage.name,
            stage.analysis_kind().id(),
            stage.source_field,
            stage.output
        );
    }
    Ok(())
}

/// Show stage details and its output schema
pub async fn show(config_path: &str, name: &str) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let stage = config.load_stage(name)?;

    print!("{}", serde_yaml::to_string(&stage)?);
    println!();

    let schema = stage.analysis_kind().output_schema();
    println!("output schema: {}", schema.name);
    print_schema(&schema, 1);
    Ok(())
}

fn print_schema(schema: &OutputSchema, depth: usize) {
    let indent = "  ".repeat(depth);
    for field in &schema.fields {
        let nullable = if field.nullable { "?" } else { "" };
        println!(
            "{}{}: {}{}",
            indent,
            field.name,
            type_name(&field.field_type),
            nullable
        );
        if let Some(nested) = nested_schema(&field.field_type) {
            print_schema(nested, depth + 1);
        }
    }
}

fn type_name(field_type: &FieldType) -> String {
    match field_type {
        FieldType::String => "string".to_string(),
        FieldType::Long => "long".to_string(),
        FieldType::Double => "double".to_string(),
        FieldType::Boolean => "boolean".to_string(),
        FieldType::Map => "map<string, string>".to_string(),
        FieldType::Array(item) => format!("array<{}>", type_name(item)),
        FieldType::Record(schema) => schema.name.clone(),
    }
}

fn nested_schema(field_type: &FieldType) -> Option<&OutputSchema> {
    match field_type {
        FieldType::Record(schema) => Some(schema),
        FieldType::Array(item) => nested_schema(item),
        _ => None,
    }
}
