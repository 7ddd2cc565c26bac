use neuroimport::{load_data, Field, Value};
use std::env;
use std::error::Error;

fn describe(value: &Value) -> String {
    match value {
        Value::Char(text) => format!("'{}'", text),
        other => format!("{} {:?}", other.class_name(), other.shape()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <path_to_mat_file> [variable ...]", args[0]);
        std::process::exit(1);
    }

    let variables: Vec<String> = args[2..].to_vec();
    let requested = (!variables.is_empty()).then_some(variables.as_slice());

    // Load and normalize the recording
    let recording = load_data(&args[1], requested)?;

    println!("Loaded {} field(s) from {}", recording.len(), args[1]);
    for (name, field) in &recording.fields {
        match field {
            Field::Value(value) => println!("  {}: {}", name, describe(value)),
            Field::Signal(signal) => println!(
                "  {}: aligned signal, timestamps {:?}, samples {:?}",
                name,
                signal.timestamps.shape(),
                signal.samples.shape()
            ),
        }
    }

    // Fields that could not be copied
    for diagnostic in &recording.diagnostics {
        println!("  skipped {}: {}", diagnostic.field, diagnostic.error);
    }

    Ok(())
}
