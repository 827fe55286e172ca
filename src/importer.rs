// src/importer.rs
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};

use crate::client::RpcClient;
use crate::error::BridgeError;
use crate::host::{Field, HostDocument, ImportControls, NodeId};
use crate::protocol::{ToolDeclaration, ToolDescriptor};
use crate::settings::Settings;

// --- CATALOG TRANSFORM ---
// The host expects almost the MCP shape, with `parameters` in place of
// `inputSchema` and a narrower schema vocabulary.

/// Rewrite an MCP input schema into the host's parameter dialect.
///
/// Drops `additionalProperties` and `$schema` from the root, defaults every
/// property without a `type` to `"string"` and drops property defaults.
/// Applying it to its own output changes nothing.
pub fn clean_schema(mut schema: Value) -> Value {
    if let Value::Object(root) = &mut schema {
        root.remove("additionalProperties");
        root.remove("$schema");

        if let Some(Value::Object(properties)) = root.get_mut("properties") {
            for property in properties.values_mut() {
                if let Value::Object(property) = property {
                    property
                        .entry("type")
                        .or_insert_with(|| Value::String("string".into()));
                    property.remove("default");
                }
            }
        }
    }
    schema
}

pub fn to_declaration(tool: &ToolDescriptor) -> ToolDeclaration {
    ToolDeclaration {
        name: tool.name.clone(),
        description: tool.description.as_deref().unwrap_or_default().trim().to_string(),
        parameters: clean_schema(tool.input_schema.clone()),
    }
}

/// Pretty-printed JSON array, two-space indented, as pasted into the dialog.
/// Each entry lists `name`, `description`, then `parameters`.
pub fn render_declarations(declarations: &[ToolDeclaration]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(declarations)
}

// --- THE IMPORTER ---

pub struct DeclarationImporter {
    host: Arc<dyn HostDocument>,
    client: Arc<RpcClient>,
    settings: Settings,
}

impl DeclarationImporter {
    pub fn new(host: Arc<dyn HostDocument>, client: Arc<RpcClient>, settings: Settings) -> Self {
        Self {
            host,
            client,
            settings,
        }
    }

    /// Put the import controls into a freshly opened dialog, pre-filled from settings.
    pub async fn attach(&self, dialog: NodeId) -> Result<(), BridgeError> {
        let stored = self.settings.load().await.map_err(BridgeError::Settings)?;
        let controls = ImportControls {
            server_url: stored.server_url,
            auto_submit: stored.auto_submit,
        };
        if !self.host.install_controls(dialog, &controls) {
            return Err(BridgeError::MissingElement(Field::ActionArea));
        }
        info!(%dialog, url = %controls.server_url, "Import controls installed");
        Ok(())
    }

    /// Load the catalog from `url` into the dialog's declarations field.
    /// Returns the number of tools written.
    pub async fn import(&self, dialog: NodeId, url: &str) -> Result<usize, BridgeError> {
        let tools = match self.client.list_tools(url).await {
            Ok(tools) => tools,
            Err(e) => {
                error!(url, error = %e, "Failed to load tools");
                self.host.alert(&format!("Failed to load tools from '{url}'."));
                return Err(e.into());
            }
        };

        let declarations: Vec<ToolDeclaration> = tools.iter().map(to_declaration).collect();
        let rendered = render_declarations(&declarations).map_err(BridgeError::Render)?;

        if !self.host.write_field(dialog, Field::DeclarationsTarget, &rendered) {
            return Err(BridgeError::MissingElement(Field::DeclarationsTarget));
        }
        self.host.notify_changed(dialog, Field::DeclarationsTarget);

        self.settings
            .set_server_url(url)
            .await
            .map_err(BridgeError::Settings)?;

        info!(url, count = declarations.len(), "Tool declarations imported");
        Ok(declarations.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn search_tool() -> ToolDescriptor {
        ToolDescriptor {
            name: "search".into(),
            description: Some("  Search the web.\n".into()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "q": {"default": "x"},
                    "limit": {"type": "integer", "default": 10, "description": "Max hits"}
                },
                "required": ["q"],
                "additionalProperties": false,
                "$schema": "http://json-schema.org/draft-07/schema#"
            }),
        }
    }

    #[test]
    fn search_tool_becomes_a_declaration() {
        assert_eq!(
            to_declaration(&search_tool()),
            ToolDeclaration {
                name: "search".into(),
                description: "Search the web.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "q": {"type": "string"},
                        "limit": {"type": "integer", "description": "Max hits"}
                    },
                    "required": ["q"]
                }),
            }
        );
    }

    #[test]
    fn cleaning_is_idempotent() {
        let once = clean_schema(search_tool().input_schema);
        assert_eq!(clean_schema(once.clone()), once);

        let declaration = to_declaration(&search_tool());
        let again = to_declaration(&ToolDescriptor {
            name: declaration.name.clone(),
            description: Some(declaration.description.clone()),
            input_schema: declaration.parameters.clone(),
        });
        assert_eq!(again, declaration);
    }

    #[test]
    fn forbidden_keys_never_survive() {
        let cleaned = clean_schema(json!({
            "$schema": "x",
            "additionalProperties": true,
            "properties": {
                "a": {"default": 1},
                "b": {"type": "number", "default": 2.5},
                "c": {}
            }
        }));

        let root = cleaned.as_object().unwrap();
        assert!(!root.contains_key("$schema"));
        assert!(!root.contains_key("additionalProperties"));
        for (_, property) in root["properties"].as_object().unwrap() {
            assert!(property.get("default").is_none());
            assert!(property.get("type").is_some());
        }
        assert_eq!(root["properties"]["c"]["type"], "string");
        assert_eq!(root["properties"]["b"]["type"], "number");
    }

    #[test]
    fn schemas_without_properties_pass_through() {
        assert_eq!(clean_schema(json!({"type": "object"})), json!({"type": "object"}));
        assert_eq!(clean_schema(Value::Null), Value::Null);
    }

    #[test]
    fn missing_description_becomes_empty() {
        let tool = ToolDescriptor {
            name: "ping".into(),
            description: None,
            input_schema: json!({}),
        };
        assert_eq!(to_declaration(&tool).description, "");
    }

    #[test]
    fn rendering_is_pretty_printed_json() {
        let rendered = render_declarations(&[to_declaration(&search_tool())]).unwrap();
        let parsed: Vec<ToolDeclaration> = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed, vec![to_declaration(&search_tool())]);
    }

    #[test]
    fn rendering_keeps_name_description_parameters_order() {
        let declaration = ToolDeclaration {
            name: "search".into(),
            description: "d".into(),
            parameters: json!({"type": "object"}),
        };
        assert_eq!(
            render_declarations(&[declaration]).unwrap(),
            "[\n  {\n    \"name\": \"search\",\n    \"description\": \"d\",\n    \"parameters\": {\n      \"type\": \"object\"\n    }\n  }\n]"
        );
    }
}
