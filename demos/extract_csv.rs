//! CSV extraction demo - runs the full driver loop and presents the summary.
//!
//! Resolves configuration once at startup (env vars plus argv) and hands it
//! to the core as explicit parameters, then renders the run summary the way
//! the original web form did: coverage per field, an example row, and the
//! estimated cost only when it is greater than zero.
//!
//! Run with:
//!   OPENAI_API_KEY=your-key cargo run --example extract_csv -- input.csv [output-folder]

use colored::Colorize;
use fieldwise::{driver, Client, CostTable, ExtractionSchema, FieldSpec, RunSummary};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

fn get_api_key() -> String {
    std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY environment variable is required")
}
fn get_model() -> String {
    std::env::var("FIELDWISE_MODEL").unwrap_or_else(|_| fieldwise::DEFAULT_MODEL.into())
}
fn get_base_url() -> Option<String> {
    std::env::var("FIELDWISE_BASE_URL").ok()
}

fn header(text: &str) {
    println!();
    println!("{}", format!(" {} ", text).on_blue().bold());
    println!();
}

fn info(label: &str, value: &str) {
    println!("  {}: {}", label.dimmed(), value);
}

fn success(text: &str) {
    println!("{} {}", "✔".green(), text);
}

fn warn(text: &str) {
    println!("{} {}", "⚠".yellow(), text);
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn present(summary: &RunSummary, output_path: &std::path::Path) {
    header("Results");

    if summary.total_cost > 0.0 {
        success(&format!(
            "Extracting values from {} lines cost an estimated ${:.2}.",
            summary.total_lines, summary.total_cost
        ));
    } else {
        success(&format!(
            "Extracting values from {} lines.",
            summary.total_lines
        ));
    }
    info("Results written to", &output_path.display().to_string());

    println!();
    println!("{}", "Summary extractions".bold());
    for (field, count) in &summary.total_extractions {
        info(field, &format!("{}/{}", count, summary.total_lines));
    }

    if !summary.example.is_empty() {
        println!();
        println!("{}", "Example".bold());
        for (key, value) in &summary.example {
            info(key, &value.to_string());
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), fieldwise::Error> {
    let mut args = std::env::args().skip(1);
    let input_path = match args.next() {
        Some(path) => PathBuf::from(path),
        None => {
            warn("Need an input csv file");
            eprintln!("usage: extract_csv <input.csv> [output-folder]");
            std::process::exit(1);
        }
    };
    let output_folder = args.next().map(PathBuf::from).unwrap_or_else(|| ".".into());
    let output_path = output_folder.join(fieldwise::DEFAULT_OUTPUT_FILENAME);

    header("Config");
    let model = get_model();
    info("Model", &model);
    info("Input", &input_path.display().to_string());
    info("Output", &output_path.display().to_string());

    let mut builder = Client::builder(get_api_key()).model(model);
    if let Some(base_url) = get_base_url() {
        info("Base URL", &base_url);
        builder = builder.base_url(base_url);
    }
    let client = builder.build()?;

    // The fields a web form would collect from the user.
    let schema = match ExtractionSchema::new(
        "invoice data",
        vec![
            FieldSpec::parse("invoice_id", "str", "invoice number"),
            FieldSpec::parse("amount", "int", "amount due in dollars"),
        ],
    ) {
        Ok(schema) => schema,
        Err(e) => {
            warn(&e.to_string());
            std::process::exit(1);
        }
    };

    let costs = CostTable::default();

    // A rough upfront estimate; running on a sample first is still the best
    // way to gauge quality and cost.
    if let Ok(contents) = std::fs::read_to_string(&input_path) {
        let rows = contents.lines().filter(|line| !line.is_empty()).count() as u64;
        let projected = fieldwise::projected_cost(&costs, client.model(), rows, 150);
        if projected > 0.0 {
            info(
                "Projected cost",
                &format!("${:.2} for {} rows", projected, rows),
            );
        }
    }

    let pb = spinner("Extracting rows, one model call at a time...");
    let result = driver::run_to_file(&client, &schema, &costs, &input_path, &output_path).await;
    pb.finish_and_clear();

    match result {
        Ok(summary) => {
            present(&summary, &output_path);
            Ok(())
        }
        Err(fieldwise::Error::MissingInput(path)) => {
            warn(&format!("Need to upload csv file: {}", path.display()));
            std::process::exit(1);
        }
        Err(e) => Err(e),
    }
}
