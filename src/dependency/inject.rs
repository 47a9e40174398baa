use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::error::{MilexError, Result};

const DIRECTIVE: &str = "#SBATCH --dependency=";
const AFTER_OK: &str = "afterok:";

/// Add upstream job IDs to the dependency directive of an unsubmitted script
///
/// IDs are appended to an existing `afterok:` list in order, without deduplication. Scripts
/// without a dependency directive get one right after the shebang line. Scripts without a
/// shebang line are left untouched. Returns whether the file was changed.
pub fn inject_dependencies(script: &Path, job_ids: &[String]) -> Result<bool> {
    if job_ids.is_empty() {
        return Ok(false);
    }

    let content = fs::read_to_string(script).map_err(MilexError::io(script))?;
    let Some(updated) = add_dependencies(&content, job_ids) else {
        warn!("{} has no shebang line, not adding dependencies", script.display());
        return Ok(false);
    };

    fs::write(script, updated).map_err(MilexError::io(script))?;
    info!("Added dependency on {} to {}", job_ids.join(":"), script.display());
    Ok(true)
}

/// In-memory edit behind [`inject_dependencies`]; None when the script has no shebang
fn add_dependencies(content: &str, job_ids: &[String]) -> Option<String> {
    let new_ids = job_ids.join(":");
    let mut lines: Vec<String> = content.lines().map(String::from).collect();

    if let Some(line) = lines.iter_mut().find(|l| l.starts_with(DIRECTIVE)) {
        *line = match line.rfind(AFTER_OK) {
            Some(at) => {
                let existing = line[at + AFTER_OK.len()..].trim();
                match existing.is_empty() {
                    true => format!("{}{new_ids}", &line[..at + AFTER_OK.len()]),
                    false => format!("{}{existing}:{new_ids}", &line[..at + AFTER_OK.len()]),
                }
            }
            // some other dependency type, e.g. afterany: both must hold
            None => format!("{},{AFTER_OK}{new_ids}", line.trim_end()),
        };
    } else {
        let shebang = lines.iter().position(|l| l.starts_with("#!"))?;
        lines.insert(shebang + 1, format!("{DIRECTIVE}{AFTER_OK}{new_ids}"));
    }

    let mut updated = lines.join("\n");
    if content.ends_with('\n') {
        updated.push('\n');
    }
    Some(updated)
}
