//! Built-in rule profile listing

use anyhow::Result;
use probe_lib::recommendation::{builtin, RecommendationRule, BUILTIN_PROFILES};
use serde::Serialize;
use tabled::{settings::Style, Tabled};

use crate::output::{color_action, print_json, OutputFormat};

#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Rule")]
    name: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Replicas")]
    replicas: u32,
}

#[derive(Serialize)]
struct Profile {
    name: &'static str,
    rules: Vec<RecommendationRule>,
}

/// List every built-in rule profile in match order
pub fn list_rules(format: OutputFormat) -> Result<()> {
    let profiles = BUILTIN_PROFILES
        .iter()
        .map(|&name| {
            Ok(Profile {
                name,
                rules: builtin(name)?.rules().to_vec(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    match format {
        OutputFormat::Json => print_json(&profiles)?,
        OutputFormat::Table => {
            for profile in &profiles {
                println!("{}", profile.name);
                let rows: Vec<RuleRow> = profile
                    .rules
                    .iter()
                    .enumerate()
                    .map(|(i, r)| RuleRow {
                        index: i + 1,
                        name: r.name.clone(),
                        action: color_action(r.action),
                        replicas: r.replicas,
                    })
                    .collect();
                println!("{}\n", tabled::Table::new(rows).with(Style::rounded()));
            }
        }
    }

    Ok(())
}
