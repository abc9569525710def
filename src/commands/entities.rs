//! `entities` command: print the configured entity catalogue.

use crate::commands::Outcome;
use crate::config::{EntityConfig, ExportConfig};

/// Prints one line per configured entity.
pub fn execute(config: &ExportConfig) -> Outcome {
    for line in render(&config.entities(), config) {
        println!("{}", line);
    }
    Outcome::Complete
}

fn render(entities: &[EntityConfig], config: &ExportConfig) -> Vec<String> {
    entities
        .iter()
        .map(|entity| {
            let mut line = format!("{:<20} {}", entity.name, entity.resource);
            if let Some(filter) = &entity.filter {
                line.push_str(&format!("  $filter={}", filter));
            }
            if let Some(top) = entity.page_size {
                line.push_str(&format!("  $top={}", top));
            }
            line.push_str(&format!(
                "  -> {}",
                entity.output_dir(&config.output_root).display()
            ));
            line
        })
        .collect()
}
