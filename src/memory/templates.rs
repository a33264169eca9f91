//! Default Markdown templates for the four memory files, written when
//! `memory_dir` is first initialized.

pub const GOALS_MD: &str = "\
# Goals

## Savings Targets
- [No patterns recorded yet]

## Stated Aspirations
- [No patterns recorded yet]

## Last Updated
- never
";

pub const BUDGET_MD: &str = "\
# Budget

## Monthly Limits
- [AMOUNT] per category: not yet configured

## Category Budgets
- [No patterns recorded yet]

## Last Updated
- never
";

pub const STATE_MD: &str = "\
# State

## Financial Snapshot
- [No patterns recorded yet]

## Open Items
- [ ]

## Last Updated
- never
";

pub const BEHAVIOR_MD: &str = "\
# Behavior

## Observed Behaviors
- [No patterns recorded yet]

## Impulse Triggers
- [No patterns recorded yet]

## Last Updated
- never
";

/// The four memory file names, in the canonical order they're read in.
pub const MEMORY_FILES: [&str; 4] = ["Goals.md", "Budget.md", "State.md", "Behavior.md"];

/// The default content for a given memory file name.
pub fn default_content(file_name: &str) -> Option<&'static str> {
    match file_name {
        "Goals.md" => Some(GOALS_MD),
        "Budget.md" => Some(BUDGET_MD),
        "State.md" => Some(STATE_MD),
        "Behavior.md" => Some(BEHAVIOR_MD),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_template_has_a_placeholder_section() {
        for f in MEMORY_FILES {
            let content = default_content(f).unwrap();
            assert!(
                content.contains("[No patterns recorded yet]")
                    || content.contains("[AMOUNT]")
                    || content.contains("[ ]"),
                "{f} missing a placeholder marker"
            );
        }
    }

    #[test]
    fn unknown_file_has_no_default() {
        assert!(default_content("Unknown.md").is_none());
    }
}
