pub mod export;

pub use export::{
    AGGREGATED_HEADERS, ExportPaths, RECORD_HEADERS, ReportError, aggregated_csv, records_csv,
    write_exports,
};
