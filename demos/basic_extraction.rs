//! Basic extraction example.
//!
//! This example shows how to extract structured fields from a single line of
//! free text.
//!
//! Run with: `OPENAI_API_KEY=your-key cargo run --example basic_extraction`

use fieldwise::{Client, ExtractionSchema, FieldSpec};

#[tokio::main]
async fn main() -> Result<(), fieldwise::Error> {
    // Create a client with your API key
    let api_key = std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY must be set");
    let client = Client::builder(api_key).build()?;

    // Describe the fields you want to extract
    let schema = ExtractionSchema::new(
        "invoice data",
        vec![
            FieldSpec::parse("invoice_id", "str", "invoice number"),
            FieldSpec::parse("amount", "int", "amount due in dollars"),
        ],
    )?;

    // Extract from one row of text
    let result = client
        .extract(&schema, "Invoice #123 due March 1, amount $50")
        .await?;

    println!("Extracted record: {:#?}", result.record);

    // Usage information is always available
    println!(
        "Tokens used: {} prompt, {} completion",
        result.usage.prompt_tokens, result.usage.completion_tokens
    );

    Ok(())
}
