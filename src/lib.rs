//! Extract user-defined structured fields from free-text CSV rows.
//!
//! fieldwise drives one structured LLM completion per input row: a dynamic
//! contract is built from user-described fields, each row's text is forced
//! through it, and the parsed records stream to an output CSV while coverage
//! and estimated API cost accumulate into a run summary.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use fieldwise::{driver, Client, CostTable, ExtractionSchema, FieldSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fieldwise::Error> {
//!     let client = Client::builder("your-api-key").build()?;
//!
//!     let schema = ExtractionSchema::new(
//!         "invoice data",
//!         vec![
//!             FieldSpec::parse("invoice_id", "str", "invoice number"),
//!             FieldSpec::parse("amount", "int", "amount due"),
//!         ],
//!     )?;
//!
//!     let summary = driver::run_to_file(
//!         &client,
//!         &schema,
//!         &CostTable::default(),
//!         "invoices.csv",
//!         "extracted_data.csv",
//!     )
//!     .await?;
//!
//!     println!("{} rows, ${:.2}", summary.total_lines, summary.total_cost);
//!     Ok(())
//! }
//! ```

mod client;
mod cost;
pub mod driver;
mod error;
mod schema;
mod types;

pub use client::{Client, ClientBuilder, DEFAULT_MODEL};
pub use cost::{projected_cost, CostTable, CostTracker, ModelPrice, AVERAGE_OUTPUT_TOKENS};
pub use driver::{run, run_to_file, DEFAULT_OUTPUT_FILENAME};
pub use error::{Error, Result};
pub use schema::{ExtractionSchema, MAX_FIELDS};
pub use types::{
    ExtractedRecord, FieldKind, FieldSpec, RunSummary, StructuredCompletion, TokenUsage,
};
