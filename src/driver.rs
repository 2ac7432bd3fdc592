//! The per-row extraction loop.

use crate::client::Client;
use crate::cost::{CostTable, CostTracker};
use crate::error::{Error, Result};
use crate::schema::ExtractionSchema;
use crate::types::{ExtractedRecord, RunSummary};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// File name collaborators append to a user-chosen output folder.
pub const DEFAULT_OUTPUT_FILENAME: &str = "extracted_data.csv";

/// Stream CSV rows through the client one at a time, writing extracted rows
/// to `output` and folding statistics into a [`RunSummary`].
///
/// Only the first comma-separated field of each input line is used as the
/// text to extract from; no header row is expected. Blank lines are skipped
/// entirely: not counted, not written. The first processed row fixes the
/// output column order to the schema's attribute names, writes the header,
/// and is captured (with the raw text under `"original_text"`) as the
/// summary's example.
///
/// Output is flushed after every row, so partial output survives a mid-run
/// failure. Any per-row call failure aborts the whole run: the error
/// propagates unmodified and no summary is returned, but rows already
/// written remain in `output`.
pub async fn run<R, W>(
    client: &Client,
    schema: &ExtractionSchema,
    costs: &CostTable,
    input: R,
    output: W,
) -> Result<RunSummary>
where
    R: Read,
    W: Write,
{
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);
    let mut writer = csv::Writer::from_writer(output);

    let columns = schema.columns();
    let mut counts: HashMap<String, u64> = columns.iter().map(|c| (c.to_string(), 0)).collect();
    let mut tracker = CostTracker::new(costs);
    let mut example = ExtractedRecord::new();
    let mut total_lines: u64 = 0;

    for entry in reader.records() {
        let record = entry?;
        let text = match record.get(0) {
            Some(text) => text,
            None => continue,
        };

        debug!(row = total_lines, chars = text.len(), "requesting extraction");
        let completion = client.extract(schema, text).await?;
        tracker.record(client.model(), &completion.usage);

        if total_lines == 0 {
            writer.write_record(&columns)?;
            example = completion.record.clone();
            example.insert("original_text".into(), Value::String(text.to_string()));
        }

        let mut row: Vec<String> = Vec::with_capacity(columns.len());
        for column in &columns {
            let value = completion.record.get(*column).unwrap_or(&Value::Null);
            if extracted(value) {
                if let Some(count) = counts.get_mut(*column) {
                    *count += 1;
                }
            }
            row.push(cell(value));
        }
        writer.write_record(&row)?;
        writer.flush()?;
        total_lines += 1;
    }

    info!(
        rows = total_lines,
        cost = tracker.total(),
        "extraction run finished"
    );
    Ok(RunSummary {
        total_lines,
        total_cost: tracker.total(),
        example,
        total_extractions: counts,
    })
}

/// [`run`] over file paths.
///
/// Fails with [`Error::MissingInput`] before any model call when no file
/// exists at `input_path`. The output file is created or truncated.
pub async fn run_to_file(
    client: &Client,
    schema: &ExtractionSchema,
    costs: &CostTable,
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
) -> Result<RunSummary> {
    let input_path = input_path.as_ref();
    if !input_path.exists() {
        return Err(Error::MissingInput(input_path.to_path_buf()));
    }

    let input = BufReader::new(File::open(input_path)?);
    let output = File::create(output_path)?;
    run(client, schema, costs, input, output).await
}

/// Whether a value counts toward the column's coverage counter.
///
/// Null and the empty string are misses; everything else (including the
/// integer 0) counts.
fn extracted(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldSpec;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    /// Deterministic stub model: derives the function-call arguments from the
    /// user message of each request.
    struct StubModel;

    impl Respond for StubModel {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            let text = body["messages"][1]["content"].as_str().unwrap_or_default();

            if text.contains("boom") {
                return ResponseTemplate::new(500)
                    .set_body_json(json!({"error": {"message": "server exploded"}}));
            }

            let arguments = if text.contains("#123") {
                json!({"invoice_id": "123", "amount": 50})
            } else if text.contains("#124") {
                json!({"invoice_id": "124", "amount": 75})
            } else if text.contains("partial") {
                json!({"invoice_id": "", "amount": null})
            } else {
                json!({"invoice_id": null, "amount": null})
            };

            ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "function_call": {
                            "name": "extract_record",
                            "arguments": arguments.to_string()
                        }
                    }
                }],
                "usage": {"prompt_tokens": 100, "completion_tokens": 20, "total_tokens": 120}
            }))
        }
    }

    async fn stub_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(StubModel)
            .mount(&server)
            .await;
        server
    }

    fn invoice_schema() -> ExtractionSchema {
        ExtractionSchema::new(
            "invoice data",
            vec![
                FieldSpec::parse("invoice_id", "str", "invoice number"),
                FieldSpec::parse("amount", "int", "amount due"),
            ],
        )
        .unwrap()
    }

    fn client_for(server: &MockServer) -> Client {
        Client::builder("test-key")
            .base_url(server.uri())
            .build()
            .unwrap()
    }

    const INVOICES: &str = "\"Invoice #123 due March 1, amount $50\"\n\"Invoice #124 due April 2, amount $75\"\n";

    #[tokio::test]
    async fn test_invoice_scenario() {
        let server = stub_server().await;
        let client = client_for(&server);
        let schema = invoice_schema();
        let costs = CostTable::default();

        let mut out = Vec::new();
        let summary = run(&client, &schema, &costs, INVOICES.as_bytes(), &mut out)
            .await
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "invoice_id,amount\n123,50\n124,75\n"
        );
        assert_eq!(summary.total_lines, 2);
        assert_eq!(summary.total_extractions["invoice_id"], 2);
        assert_eq!(summary.total_extractions["amount"], 2);

        let mut expected = ExtractedRecord::new();
        expected.insert("invoice_id".into(), json!("123"));
        expected.insert("amount".into(), json!(50));
        expected.insert(
            "original_text".into(),
            json!("Invoice #123 due March 1, amount $50"),
        );
        assert_eq!(summary.example, expected);

        let per_call = (100.0 * 0.0010 + 20.0 * 0.0020) / 1000.0;
        assert!((summary.total_cost - 2.0 * per_call).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_blank_lines_skipped() {
        let server = stub_server().await;
        let client = client_for(&server);
        let schema = invoice_schema();
        let costs = CostTable::default();

        let input = "\n\"Invoice #123 due March 1, amount $50\"\n\n\n\"Invoice #124 due April 2, amount $75\"\n\n";
        let mut out = Vec::new();
        let summary = run(&client, &schema, &costs, input.as_bytes(), &mut out)
            .await
            .unwrap();

        assert_eq!(summary.total_lines, 2);
        let written = String::from_utf8(out).unwrap();
        assert_eq!(written.lines().count(), 3); // header + 2 rows
    }

    #[tokio::test]
    async fn test_null_and_empty_values_not_counted() {
        let server = stub_server().await;
        let client = client_for(&server);
        let schema = invoice_schema();
        let costs = CostTable::default();

        let input = "a partial row\nanother row entirely\n";
        let mut out = Vec::new();
        let summary = run(&client, &schema, &costs, input.as_bytes(), &mut out)
            .await
            .unwrap();

        assert_eq!(summary.total_lines, 2);
        assert_eq!(summary.total_extractions["invoice_id"], 0);
        assert_eq!(summary.total_extractions["amount"], 0);

        // Misses still produce output rows, just with empty cells.
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "invoice_id,amount\n,\n,\n"
        );
    }

    #[tokio::test]
    async fn test_rerun_is_byte_identical() {
        let server = stub_server().await;
        let client = client_for(&server);
        let schema = invoice_schema();
        let costs = CostTable::default();

        let mut first = Vec::new();
        let first_summary = run(&client, &schema, &costs, INVOICES.as_bytes(), &mut first)
            .await
            .unwrap();

        let mut second = Vec::new();
        let second_summary = run(&client, &schema, &costs, INVOICES.as_bytes(), &mut second)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first_summary, second_summary);
    }

    #[tokio::test]
    async fn test_call_failure_aborts_but_keeps_written_rows() {
        let server = stub_server().await;
        let client = client_for(&server);
        let schema = invoice_schema();
        let costs = CostTable::default();

        let input = "\"Invoice #123 due March 1, amount $50\"\nboom\n\"Invoice #124 due April 2, amount $75\"\n";
        let mut out = Vec::new();
        let err = run(&client, &schema, &costs, input.as_bytes(), &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Api { status: 500, .. }));
        // The row before the failure was flushed and stays on disk.
        assert_eq!(String::from_utf8(out).unwrap(), "invoice_id,amount\n123,50\n");
    }

    #[tokio::test]
    async fn test_unknown_model_cost_untracked() {
        let server = stub_server().await;
        let client = Client::builder("test-key")
            .base_url(server.uri())
            .model("mystery-model")
            .build()
            .unwrap();
        let schema = invoice_schema();
        let costs = CostTable::default();

        let mut out = Vec::new();
        let summary = run(&client, &schema, &costs, INVOICES.as_bytes(), &mut out)
            .await
            .unwrap();

        assert_eq!(summary.total_lines, 2);
        assert_eq!(summary.total_cost, 0.0);
    }

    #[tokio::test]
    async fn test_empty_input_yields_empty_summary() {
        let server = stub_server().await;
        let client = client_for(&server);
        let schema = invoice_schema();
        let costs = CostTable::default();

        let mut out = Vec::new();
        let summary = run(&client, &schema, &costs, "".as_bytes(), &mut out)
            .await
            .unwrap();

        assert_eq!(summary.total_lines, 0);
        assert!(summary.example.is_empty());
        assert_eq!(summary.total_extractions["invoice_id"], 0);
        assert!(out.is_empty()); // no header without a first row
    }

    #[tokio::test]
    async fn test_run_to_file() {
        let server = stub_server().await;
        let client = client_for(&server);
        let schema = invoice_schema();
        let costs = CostTable::default();

        let dir = tempfile::tempdir().unwrap();
        let input_path = dir.path().join("input.csv");
        std::fs::write(&input_path, INVOICES).unwrap();
        let output_path = dir.path().join(DEFAULT_OUTPUT_FILENAME);

        let summary = run_to_file(&client, &schema, &costs, &input_path, &output_path)
            .await
            .unwrap();

        assert_eq!(summary.total_lines, 2);
        assert_eq!(
            std::fs::read_to_string(&output_path).unwrap(),
            "invoice_id,amount\n123,50\n124,75\n"
        );
    }

    #[tokio::test]
    async fn test_missing_input_checked_before_any_call() {
        let server = stub_server().await;
        let client = client_for(&server);
        let schema = invoice_schema();
        let costs = CostTable::default();

        let dir = tempfile::tempdir().unwrap();
        let err = run_to_file(
            &client,
            &schema,
            &costs,
            dir.path().join("nope.csv"),
            dir.path().join("out.csv"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::MissingInput(_)));
        assert_eq!(server.received_requests().await.unwrap().len(), 0);
    }
}
