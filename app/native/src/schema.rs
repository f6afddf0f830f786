use crate::config::AppConfig;

/// Generates a JSON Schema for the configuration file.
#[must_use]
pub fn generate_schema() -> schemars::Schema {
    let mut schema = schemars::schema_for!(AppConfig);

    if let Some(obj) = schema.as_object_mut() {
        obj.insert("title".to_string(), serde_json::json!("Backdrop configuration"));
    }

    schema
}

/// Pretty-printed JSON Schema for the configuration file.
#[must_use]
pub fn print_schema() -> String {
    serde_json::to_string_pretty(&generate_schema()).unwrap_or_default()
}
