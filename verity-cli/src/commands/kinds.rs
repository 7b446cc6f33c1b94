use anyhow::Result;
use verity_engine::registry;
use verity_models::{ResourceKind, Verb};

pub fn run() -> Result<()> {
    println!(
        "{:<26} {:<26} {:<16} {:<8} {}",
        "KIND", "ENDPOINT", "VERBS", "AUTOGEN", "SPLIT KEY"
    );
    println!("{}", "-".repeat(90));

    for &kind in ResourceKind::ALL {
        let desc = registry::descriptor(kind);
        let verbs: Vec<&str> = [Verb::Put, Verb::Patch, Verb::Delete]
            .iter()
            .filter(|v| desc.supports(**v))
            .map(|v| v.as_str())
            .collect();

        println!(
            "{:<26} {:<26} {:<16} {:<8} {}",
            kind.as_str(),
            desc.endpoint,
            verbs.join(","),
            if desc.has_autogen { "yes" } else { "-" },
            desc.header_split_key.unwrap_or("-"),
        );
    }

    println!();
    println!("{} kind(s) registered", ResourceKind::ALL.len());
    Ok(())
}
