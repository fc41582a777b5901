//! Terminal rendering of plans, records and run reports.

use std::collections::BTreeMap;

use chrono::DateTime;
use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};
use layercake_deploy::{DependencyGraph, DeploymentRecord, Manifest, RunReport, UnitId};

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED).set_header(header);
    table
}

/// Deployment order of a manifest with the dependencies of each unit.
pub fn plan_table(manifest: &Manifest) -> anyhow::Result<Table> {
    let graph = DependencyGraph::new(manifest.units());
    let order = graph.sorted()?;

    let mut table = table(vec!["#", "Unit", "Depends on", "Artifact"]);
    for (step, unit) in order.into_iter().enumerate() {
        let index = manifest
            .units()
            .iter()
            .position(|u| u.id == unit.id)
            .unwrap_or_default();

        let mut deps: Vec<String> = graph
            .dependencies_of(index)
            .into_iter()
            .map(UnitId::to_string)
            .collect();
        deps.extend(
            unit.dependencies()
                .filter(|dep| !manifest.contains(dep))
                .map(|dep| format!("{dep} (missing)")),
        );

        table.add_row(vec![
            (step + 1).to_string(),
            unit.id.to_string(),
            deps.join(", "),
            unit.artifact.path.display().to_string(),
        ]);
    }
    Ok(table)
}

/// Recorded state of every unit of a manifest.
pub fn status_table(manifest: &Manifest, records: &BTreeMap<UnitId, DeploymentRecord>) -> Table {
    let mut table = table(vec!["Unit", "State", "Address", "Transaction", "Updated"]);
    for unit in manifest.units() {
        let row = match records.get(&unit.id) {
            Some(record) => vec![
                unit.id.to_string(),
                record.status.label().to_string(),
                record
                    .address()
                    .map(|a| a.to_string())
                    .or_else(|| record.error().map(String::from))
                    .unwrap_or_default(),
                record.tx_hash().map(|h| h.to_string()).unwrap_or_default(),
                DateTime::from_timestamp(record.updated_at, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
            ],
            None => vec![
                unit.id.to_string(),
                "not deployed".to_string(),
                String::new(),
                String::new(),
                String::new(),
            ],
        };
        table.add_row(row);
    }
    table
}

/// Outcome of every unit of a run.
pub fn report_table(report: &RunReport) -> Table {
    let mut table = table(vec!["Unit", "Outcome"]);
    for (unit, outcome) in &report.outcomes {
        table.add_row(vec![unit.to_string(), outcome.to_string()]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use layercake_deploy::{ArgSpec, DeploymentUnit};

    fn manifest() -> Manifest {
        Manifest::new(vec![
            DeploymentUnit::new("FarmerProcessorDelegate", "Delegate.json")
                .arg(ArgSpec::reference("FarmerProcessor"))
                .arg(ArgSpec::reference("Registry")),
            DeploymentUnit::new("FarmerProcessor", "Processor.json"),
        ])
        .unwrap()
    }

    #[test]
    fn test_plan_table_lists_dependencies_first() {
        let rendered = plan_table(&manifest()).expect("Plan should resolve").to_string();
        let processor = rendered.find("Processor.json").unwrap();
        let delegate = rendered.find("Delegate.json").unwrap();
        assert!(processor < delegate, "Dependency should be listed first");
        assert!(rendered.contains("Registry (missing)"));
    }

    #[test]
    fn test_status_table_marks_undeployed_units() {
        let rendered = status_table(&manifest(), &BTreeMap::new()).to_string();
        assert_eq!(rendered.matches("not deployed").count(), 2);
    }
}
