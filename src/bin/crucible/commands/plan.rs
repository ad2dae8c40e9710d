//! `crucible plan` - print the stage sequence of a request.

use anyhow::Result;

use crucible::ops::plan::stage_plan;

use crate::cli::PlanArgs;

pub fn execute(args: PlanArgs) -> Result<()> {
    let request = args.request.to_request()?;
    let entries = stage_plan(&request)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for (index, entry) in entries.iter().enumerate() {
        let mut line = format!(
            "{:>3}. {}/{} [{}]",
            index + 1,
            entry.environment,
            entry.stage,
            entry.kind
        );
        if entry.best_effort {
            line.push_str(" (best effort)");
        }
        println!("{line}");
        if !entry.predecessors.is_empty() {
            println!("       after: {}", entry.predecessors.join(", "));
        }
    }

    Ok(())
}
