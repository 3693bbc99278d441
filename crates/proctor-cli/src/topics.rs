//! Topic bank TOML files.
//!
//! Lets a deployment ship its own topic banks instead of the built-in
//! defaults. Keys are test kinds, values are the candidate-facing options
//! in presentation order.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use proctor_backend::memory::StaticTopics;
use proctor_core::model::TestKind;

/// On-disk topic bank format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicsFile {
    pub banks: HashMap<TestKind, Vec<String>>,
}

impl TopicsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read topics file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse topics file: {}", path.display()))
    }

    /// Problems that would break a session, one message per bank.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (kind, bank) in &self.banks {
            let needed = kind.params().choice_count;
            if bank.len() < needed {
                problems.push(format!(
                    "{}: {} topics, need at least {needed}",
                    kind.display_name(),
                    bank.len()
                ));
            }
        }
        problems
    }

    pub fn into_source(self) -> StaticTopics {
        let mut topics = StaticTopics::new();
        for (kind, bank) in self.banks {
            topics.set_bank(kind, bank);
        }
        topics
    }
}
