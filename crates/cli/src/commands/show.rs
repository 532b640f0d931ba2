//! Inspect the persisted deployment config

use anyhow::{Context, Result};
use serde::Serialize;

use infratest_common::{DeploymentConfig, HarnessConfig, StageStore};

use crate::output::{print_list, print_value, OutputFormat, TableDisplay};

/// One variable or environment entry
#[derive(Serialize)]
pub struct EntryDisplay {
    pub kind: &'static str,
    pub name: String,
    pub value: String,
}

impl TableDisplay for EntryDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Kind", "Name", "Value"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.kind.to_string(), self.name.clone(), self.value.clone()]
    }
}

fn entries(config: &DeploymentConfig) -> Vec<EntryDisplay> {
    let vars = config.vars.iter().map(|(name, value)| EntryDisplay {
        kind: "var",
        name: name.clone(),
        value: match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    });
    let env = config.env_vars.iter().map(|(name, value)| EntryDisplay {
        kind: "env",
        name: name.clone(),
        value: value.clone(),
    });
    vars.chain(env).collect()
}

pub fn execute(config: &HarnessConfig, format: OutputFormat) -> Result<()> {
    let key = config.run_settings().store_key();
    let store = config.stage_store();
    let saved = store
        .load(&key)
        .with_context(|| format!("no saved deployment for {}", key))?
        .redacted();

    match format {
        OutputFormat::Table | OutputFormat::Plain => {
            println!("Working directory: {}", saved.working_dir.display());
            print_list(&entries(&saved), format);
        }
        OutputFormat::Json | OutputFormat::Yaml => print_value(&saved, format),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_list_vars_then_env() {
        let config = DeploymentConfig::new("w")
            .with_var("db_allocated_storage", 10)
            .with_var("environment", "test")
            .with_env("AWS_DEFAULT_REGION", "us-east-1");
        let rows = entries(&config);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].value, "10");
        assert_eq!(rows[1].value, "test");
        assert_eq!(rows[2].kind, "env");
    }
}
