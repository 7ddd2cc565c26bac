use neuroimport::{load_trialdata, Attention};
use std::collections::HashMap;
use std::env;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <path_to_trialdata_file> [--json]", args[0]);
        std::process::exit(1);
    }

    let table = load_trialdata(&args[1])?;

    if args.iter().any(|arg| arg == "--json") {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    println!("Number of trials: {}", table.len());
    println!("Columns: {}", table.column_names().join(", "));

    // Trials per attention condition
    let mut counts: HashMap<Attention, usize> = HashMap::new();
    for attention in table.attention() {
        *counts.entry(attention).or_default() += 1;
    }
    for attention in [
        Attention::Rf,
        Attention::Away1,
        Attention::Away2,
        Attention::Unset,
    ] {
        println!(
            "  {:?}: {} trials",
            attention,
            counts.get(&attention).copied().unwrap_or(0)
        );
    }

    if let Some(fixbreaks) = table.int_column("fixbreak") {
        let broken = fixbreaks.iter().filter(|&&flag| flag != 0).count();
        println!("Fixation breaks: {}", broken);
    }

    Ok(())
}
