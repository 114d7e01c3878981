//! Spreadsheet uploads: validate columns, predict every row, write a result workbook.
//!
//! The whole file is processed inside one request. Large uploads hold the
//! request open until every row is done.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_xlsxwriter::{Workbook, Worksheet};
use serde::Serialize;
use std::io::Cursor;
use std::path::Path;

use crate::error::{ApiError, ApiResult, BulkError};
use crate::predictor::Predictor;
use crate::rules::RuleFields;
use crate::types::{InputRecord, Scalar, TrafficPrediction};

/// Columns every upload needs besides the configured ratio column.
pub const BASE_COLUMNS: [&str; 7] = ["latitude", "longitude", "density", "volume", "capacity", "hour", "speed"];
pub const PREVIEW_ROWS: usize = 10;
pub const OUTPUT_PREFIX: &str = "traffic_results_";
pub const DOWNLOAD_ROUTE: &str = "/download";

const RESULT_COLUMNS: [&str; 13] = [
    "row",
    "input_data",
    "traffic_prediction",
    "traffic_label",
    "traffic_probabilities",
    "day_type_prediction",
    "day_type_label",
    "day_type_probabilities",
    "actual_congested",
    "actual_day_type",
    "vc_ratio",
    "criteria_met",
    "error",
];

/// Header plus data rows of the first worksheet.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<InputRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RowOutcome {
    Success {
        row: usize,
        input_data: InputRecord,
        #[serde(flatten)]
        prediction: TrafficPrediction,
    },
    Failure {
        row: usize,
        error: String,
        input_data: InputRecord,
    },
}

impl RowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RowOutcome::Success { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkSummary {
    pub message: String,
    pub total_rows: usize,
    pub successful_predictions: usize,
    pub errors: usize,
    pub download_url: String,
    pub results: Vec<RowOutcome>,
}

pub fn is_spreadsheet_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".xlsx") || lower.ends_with(".xls")
}

/// `traffic_results_<stem>.xlsx`, using only the last path component of the upload name.
pub fn output_file_name(upload_name: &str) -> String {
    let base = upload_name.rsplit(['/', '\\']).next().unwrap_or(upload_name);
    let stem = match base.rfind('.') {
        Some(i) => &base[..i],
        None => base,
    };
    let stem = if stem.is_empty() || stem == "." || stem == ".." { "upload" } else { stem };
    format!("{}{}.xlsx", OUTPUT_PREFIX, stem)
}

pub fn required_columns(fields: &RuleFields) -> Vec<String> {
    BASE_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(std::iter::once(fields.vc_ratio.clone()))
        .collect()
}

pub fn missing_columns(columns: &[String], fields: &RuleFields) -> Vec<String> {
    required_columns(fields)
        .into_iter()
        .filter(|c| !columns.contains(c))
        .collect()
}

fn cell_to_scalar(cell: &Data) -> Scalar {
    match cell {
        Data::Int(i) => Scalar::Number(*i as f64),
        Data::Float(f) => Scalar::Number(*f),
        Data::String(s) => Scalar::Text(s.clone()),
        Data::Bool(b) => Scalar::Bool(*b),
        Data::DateTime(dt) => Scalar::Number(dt.as_f64()),
        // blank cells behave like NaN: fine for floats, rejected for integers
        Data::Empty => Scalar::Number(f64::NAN),
        other => Scalar::Text(other.to_string()),
    }
}

fn header_name(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Read `.xlsx` or `.xls` bytes. The first row is the header.
pub fn read_table(bytes: Vec<u8>) -> Result<Table, BulkError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook.worksheet_range_at(0).ok_or(BulkError::NoSheet)??;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Table::default());
    };
    let columns: Vec<String> = header.iter().map(header_name).collect();

    let rows = rows
        .map(|cells| {
            columns
                .iter()
                .zip(cells)
                .fold(InputRecord::new(), |rec, (name, cell)| rec.with(name.clone(), cell_to_scalar(cell)))
        })
        .collect();

    Ok(Table { columns, rows })
}

/// Predict every row; a failing row becomes an error entry and the rest carry on.
pub fn process(predictor: &Predictor, table: Table, fields: &RuleFields) -> Vec<RowOutcome> {
    table
        .rows
        .into_iter()
        .enumerate()
        .map(|(i, input_data)| {
            let row = i + 1;
            match predictor.predict(&input_data, fields) {
                Ok(prediction) => RowOutcome::Success {
                    row,
                    input_data,
                    prediction,
                },
                Err(e) => {
                    tracing::warn!("row {} failed: {}", row, e);
                    RowOutcome::Failure {
                        row,
                        error: e.to_string(),
                        input_data,
                    }
                }
            }
        })
        .collect()
}

fn to_json<T: Serialize>(v: &T) -> Result<String, BulkError> {
    serde_json::to_string(v).map_err(|e| BulkError::Write(e.to_string()))
}

fn write_number(sheet: &mut Worksheet, row: u32, col: u16, v: f64) -> Result<(), BulkError> {
    // xlsx has no NaN; leave the cell blank
    if v.is_finite() {
        sheet.write_number(row, col, v)?;
    }
    Ok(())
}

fn write_outcome(sheet: &mut Worksheet, r: u32, outcome: &RowOutcome) -> Result<(), BulkError> {
    match outcome {
        RowOutcome::Success {
            row,
            input_data,
            prediction: p,
        } => {
            sheet.write_number(r, 0, *row as f64)?;
            sheet.write_string(r, 1, to_json(input_data)?)?;
            sheet.write_number(r, 2, p.traffic_prediction as f64)?;
            sheet.write_string(r, 3, p.traffic_label)?;
            sheet.write_string(r, 4, to_json(&p.traffic_probabilities)?)?;
            sheet.write_number(r, 5, p.day_type_prediction as f64)?;
            sheet.write_string(r, 6, p.day_type_label)?;
            sheet.write_string(r, 7, to_json(&p.day_type_probabilities)?)?;
            sheet.write_number(r, 8, f64::from(p.actual_congested))?;
            if let Some(day) = p.actual_day_type {
                sheet.write_number(r, 9, f64::from(day))?;
            }
            write_number(sheet, r, 10, p.vc_ratio)?;
            sheet.write_string(r, 11, to_json(&p.criteria_met)?)?;
        }
        RowOutcome::Failure {
            row,
            error,
            input_data,
        } => {
            sheet.write_number(r, 0, *row as f64)?;
            sheet.write_string(r, 1, to_json(input_data)?)?;
            sheet.write_string(r, 12, error.as_str())?;
        }
    }
    Ok(())
}

pub fn write_results(path: &Path, results: &[RowOutcome]) -> Result<(), BulkError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (col, name) in RESULT_COLUMNS.iter().enumerate() {
        sheet.write_string(0, col as u16, *name)?;
    }
    for (i, outcome) in results.iter().enumerate() {
        write_outcome(sheet, i as u32 + 1, outcome)?;
    }

    workbook.save(path)?;
    Ok(())
}

/// The whole upload flow: model check, extension, columns, rows, result file, summary.
pub fn run(
    predictor: &Predictor,
    fields: &RuleFields,
    file_name: &str,
    bytes: Vec<u8>,
    output_dir: &Path,
) -> ApiResult<BulkSummary> {
    predictor.ready()?;

    if !is_spreadsheet_name(file_name) {
        return Err(ApiError::Validation(
            "please upload an Excel file (.xlsx or .xls)".to_string(),
        ));
    }

    let table = read_table(bytes)?;
    let missing = missing_columns(&table.columns, fields);
    if !missing.is_empty() {
        return Err(BulkError::MissingColumns(missing).into());
    }

    let total_rows = table.rows.len();
    let results = process(predictor, table, fields);
    let successful_predictions = results.iter().filter(|r| r.is_success()).count();

    let output_name = output_file_name(file_name);
    write_results(&output_dir.join(&output_name), &results)?;
    tracing::info!(
        "processed {} rows from {} ({} ok), results in {}",
        total_rows,
        file_name,
        successful_predictions,
        output_name
    );

    Ok(BulkSummary {
        message: "traffic data processed".to_string(),
        total_rows,
        successful_predictions,
        errors: results.len() - successful_predictions,
        download_url: format!("{}/{}", DOWNLOAD_ROUTE, output_name),
        results: results.into_iter().take(PREVIEW_ROWS).collect(),
    })
}
