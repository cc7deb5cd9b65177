use metamodel::{storage, Config};

use super::terminal::Colorize;

/// Prints the custom fields and extra links declared by the metamodel.
pub fn run(config: &Config) -> anyhow::Result<()> {
    let metamodel = storage::load_metamodel(&config.metamodel)?;

    println!("{}", "Custom fields".success());
    if metamodel.custom_fields().is_empty() {
        println!("  {}", "(none)".dim());
    }
    for field in metamodel.custom_fields() {
        println!("  {field}");
    }

    println!("{}", "Extra links".success());
    if metamodel.extra_links().is_empty() {
        println!("  {}", "(none)".dim());
    }
    for link in metamodel.extra_links() {
        println!(
            "  {}  {}",
            link.option,
            format!("(outgoing: {}, incoming: {})", link.outgoing, link.incoming).dim()
        );
    }

    Ok(())
}
