//! The `proctor validate` command.

use std::path::PathBuf;

use anyhow::Result;

use crate::topics::TopicsFile;

pub fn execute(topics: PathBuf) -> Result<()> {
    let file = TopicsFile::load(&topics)?;

    let mut kinds: Vec<_> = file.banks.iter().collect();
    kinds.sort_by_key(|(kind, _)| kind.to_string());
    for (kind, bank) in kinds {
        println!("{}: {} topics", kind.display_name(), bank.len());
    }

    let problems = file.problems();
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("  problem: {problem}");
        }
        anyhow::bail!("{} topic bank(s) too small", problems.len());
    }

    println!("All topic banks valid");
    Ok(())
}
