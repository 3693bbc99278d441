//! The `proctor init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    // Create proctor.toml
    if std::path::Path::new("proctor.toml").exists() {
        println!("proctor.toml already exists, skipping.");
    } else {
        std::fs::write("proctor.toml", SAMPLE_CONFIG)?;
        println!("Created proctor.toml");
    }

    // Create example topic bank
    let topics_path = std::path::Path::new("topics.toml");
    if topics_path.exists() {
        println!("topics.toml already exists, skipping.");
    } else {
        std::fs::write(topics_path, EXAMPLE_TOPICS)?;
        println!("Created topics.toml");
    }

    println!("\nNext steps:");
    println!("  1. Run: proctor validate --topics topics.toml");
    println!("  2. Run: proctor list-kinds");
    println!("  3. Run: proctor run --kind group-discussion --response-file speech.txt");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# proctor configuration

user_id = "local-candidate"
call_timeout_secs = 10

# In-process backend with a built-in evaluation worker.
[backend]
type = "memory"
free_limit = 3

# Persist submissions and reports as JSON files instead:
# [backend]
# type = "file"
# root = "./proctor-data"

# Or point at a hosted backend:
# [backend]
# type = "remote"
# base_url = "https://api.example.com"
# api_token = "${PROCTOR_API_TOKEN}"
"#;

const EXAMPLE_TOPICS: &str = r#"# proctor topic banks

[banks]
group-discussion = [
    "Social media does more harm than good to public discourse",
    "Should space exploration be funded over social programs",
    "Artificial intelligence will create more jobs than it destroys",
    "Universal basic income is the answer to automation",
]
group-planning = [
    "A flash flood has cut off three villages from the district hospital",
    "A chemical tanker has overturned near a crowded weekly market",
    "A forest fire is advancing on a hillside school during exams",
    "A bridge collapse has stranded two buses across a gorge",
]
lecturette = [
    "Leadership in the digital age",
    "Climate change and national security",
    "The role of discipline in success",
    "Self-reliance in defence manufacturing",
]
"#;
