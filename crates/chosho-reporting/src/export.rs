use std::path::{Path, PathBuf};

use chosho_core::{AggregatedRecord, BatchReport, Record};
use thiserror::Error;

/// Column headers of the per-record table, in output order.
pub const RECORD_HEADERS: [&str; 7] = [
    "区分",
    "細目",
    "支払金額",
    "源泉徴収税額",
    "支払者所在地",
    "支払者名称",
    "支払者電話番号",
];

/// [`RECORD_HEADERS`] plus the group size.
pub const AGGREGATED_HEADERS: [&str; 8] = [
    "区分",
    "細目",
    "支払金額",
    "源泉徴収税額",
    "支払者所在地",
    "支払者名称",
    "支払者電話番号",
    "件数",
];

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Files produced by [`write_exports`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub records_csv: PathBuf,
    pub aggregated_csv: PathBuf,
    pub json: PathBuf,
}

fn record_row(r: &Record) -> [String; 7] {
    [
        r.category.clone(),
        r.detail.clone(),
        r.payment_amount.to_string(),
        r.withholding_tax.to_string(),
        r.payer_address.clone(),
        r.payer_name.clone(),
        r.payer_tel.clone(),
    ]
}

fn aggregated_row(r: &AggregatedRecord) -> [String; 8] {
    [
        r.category.clone(),
        r.detail.clone(),
        r.payment_amount.to_string(),
        r.withholding_tax.to_string(),
        r.payer_address.clone(),
        r.payer_name.clone(),
        r.payer_tel.clone(),
        r.count.to_string(),
    ]
}

/// Header plus one CRLF-terminated row per item. Fields containing a comma,
/// quote or line break are quoted.
fn to_csv<H, R, I>(headers: H, rows: I) -> Result<String, ReportError>
where
    H: IntoIterator,
    H::Item: AsRef<[u8]>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
    I: IntoIterator<Item = R>,
{
    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    wtr.write_record(headers)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

/// The per-record table.
pub fn records_csv(records: &[Record]) -> Result<String, ReportError> {
    to_csv(RECORD_HEADERS, records.iter().map(record_row))
}

/// The aggregated table, with a trailing `件数` column.
pub fn aggregated_csv(aggregated: &[AggregatedRecord]) -> Result<String, ReportError> {
    to_csv(AGGREGATED_HEADERS, aggregated.iter().map(aggregated_row))
}

/// Write `records.csv`, `aggregated.csv` and `result.json` into `dir`,
/// creating it if needed.
pub fn write_exports(dir: &Path, report: &BatchReport) -> Result<ExportPaths, ReportError> {
    std::fs::create_dir_all(dir)?;
    let paths = ExportPaths {
        records_csv: dir.join("records.csv"),
        aggregated_csv: dir.join("aggregated.csv"),
        json: dir.join("result.json"),
    };

    std::fs::write(&paths.records_csv, records_csv(&report.records)?)?;
    std::fs::write(&paths.aggregated_csv, aggregated_csv(&report.aggregated)?)?;
    std::fs::write(&paths.json, serde_json::to_string_pretty(report)?)?;

    tracing::info!(dir = %dir.display(), records = report.records.len(), "wrote exports");
    Ok(paths)
}
