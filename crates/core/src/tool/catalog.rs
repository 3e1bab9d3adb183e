use std::collections::HashMap;

use ghidra_assistant_model::ModelTool;

use super::{AnyTool, Tool, ToolObject};

/// The registry of tools a conversation may call.
///
/// Tools are keyed by name. Registering a tool under a name that is already
/// taken replaces the earlier one but keeps its position, so the order in
/// which definitions are advertised to the model stays stable.
#[derive(Default)]
pub struct ToolCatalog {
    tools: Vec<Box<dyn ToolObject>>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    /// Registers a tool.
    pub fn add_tool<T: Tool>(&mut self, tool: T) {
        let name = tool.name().to_owned();
        let tool: Box<dyn ToolObject> = Box::new(AnyTool(tool));
        if let Some(&idx) = self.index.get(&name) {
            warn!("tool `{name}` registered twice, replacing");
            self.tools[idx] = tool;
            return;
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
    }

    /// Returns the definition of the named tool.
    pub fn lookup(&self, name: &str) -> Option<ModelTool> {
        self.get(name).map(definition_of)
    }

    /// Returns the label announced to the user while the named tool runs.
    ///
    /// Falls back to a generic label for tools that don't provide one,
    /// including tools that are not registered at all.
    pub fn describe(&self, name: &str) -> String {
        self.get(name)
            .and_then(|tool| tool.progress_label())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Running {name}..."))
    }

    /// Returns the definitions of all registered tools in registration
    /// order.
    pub fn definitions(&self) -> Vec<ModelTool> {
        self.tools.iter().map(|tool| definition_of(&**tool)).collect()
    }

    /// Returns the number of registered tools.
    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tool is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub(crate) fn get(&self, name: &str) -> Option<&dyn ToolObject> {
        self.index.get(name).map(|&idx| &*self.tools[idx])
    }
}

fn definition_of(tool: &dyn ToolObject) -> ModelTool {
    ModelTool {
        name: tool.name().to_owned(),
        description: tool.description().to_owned(),
        parameters: tool.parameter_schema().clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::future::ready;

    use serde_json::{Value, json};

    use super::*;
    use crate::tool::ToolResult;

    struct NamedTool {
        name: &'static str,
        description: &'static str,
        label: Option<&'static str>,
        schema: Value,
    }

    impl NamedTool {
        fn new(name: &'static str, label: Option<&'static str>) -> Self {
            Self {
                name,
                description: "A test tool",
                label,
                schema: json!({ "type": "object" }),
            }
        }
    }

    impl Tool for NamedTool {
        type Input = Value;

        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            self.description
        }

        fn parameter_schema(&self) -> &Value {
            &self.schema
        }

        fn progress_label(&self) -> Option<&str> {
            self.label
        }

        fn execute(
            &self,
            _input: Self::Input,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            ready(Ok(json!({})))
        }
    }

    #[test]
    fn test_lookup_and_describe() {
        let mut catalog = ToolCatalog::default();
        catalog.add_tool(NamedTool::new(
            "list_functions",
            Some("Listing functions..."),
        ));
        catalog.add_tool(NamedTool::new("list_imports", None));

        let def = catalog.lookup("list_functions").unwrap();
        assert_eq!(def.name, "list_functions");
        assert_eq!(def.parameters, json!({ "type": "object" }));
        assert!(catalog.lookup("do_magic").is_none());

        assert_eq!(catalog.describe("list_functions"), "Listing functions...");
        assert_eq!(catalog.describe("list_imports"), "Running list_imports...");
        assert_eq!(catalog.describe("do_magic"), "Running do_magic...");
    }

    #[test]
    fn test_definitions_keep_registration_order() {
        let mut catalog = ToolCatalog::default();
        for name in ["status", "list_functions", "get_xrefs"] {
            catalog.add_tool(NamedTool::new(name, None));
        }
        let mut replacement = NamedTool::new("list_functions", None);
        replacement.description = "Replaced";
        catalog.add_tool(replacement);

        let defs = catalog.definitions();
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["status", "list_functions", "get_xrefs"]);
        assert_eq!(defs[1].description, "Replaced");
        assert_eq!(catalog.len(), 3);
    }
}
