//! The `proctor list-kinds` command.

use anyhow::Result;
use comfy_table::Table;

use proctor_core::model::TestKind;

pub fn execute() -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec![
        "Kind",
        "Name",
        "Capture",
        "Min words",
        "Max words",
        "Choices",
        "Prerequisites",
    ]);

    for kind in TestKind::SEQUENCE {
        let params = kind.params();
        let prerequisites = kind
            .prerequisites()
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            kind.to_string(),
            kind.display_name().to_string(),
            format!(
                "{}:{:02}",
                params.capture_seconds / 60,
                params.capture_seconds % 60
            ),
            params.min_words.to_string(),
            params.max_words.to_string(),
            params.choice_count.to_string(),
            if prerequisites.is_empty() {
                "—".to_string()
            } else {
                prerequisites
            },
        ]);
    }

    println!("{table}");
    Ok(())
}
