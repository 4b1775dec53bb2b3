use std::io::Write;
use std::path::Path;

use chosho_core::BatchReport;
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// `1234567` → `¥1,234,567`
pub fn yen(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if amount < 0 {
        format!("-¥{grouped}")
    } else {
        format!("¥{grouped}")
    }
}

/// The same shape the web endpoint returns, minus the job id.
pub fn json_payload(report: &BatchReport) -> anyhow::Result<serde_json::Value> {
    let mut payload = serde_json::to_value(report)?;
    if let Some(obj) = payload.as_object_mut() {
        obj.insert(
            "csv".into(),
            chosho_reporting::records_csv(&report.records)?.into(),
        );
        obj.insert(
            "aggregated_csv".into(),
            chosho_reporting::aggregated_csv(&report.aggregated)?.into(),
        );
    }
    Ok(payload)
}

/// Print one line per aggregated group, then totals and any problems.
pub fn print_summary(
    w: &mut dyn Write,
    report: &BatchReport,
    color: ColorMode,
) -> std::io::Result<()> {
    if report.aggregated.is_empty() {
        writeln!(w, "No payment statements found.")?;
    }

    for agg in &report.aggregated {
        let payer = if agg.payer_name.is_empty() {
            "(名称不明)"
        } else {
            agg.payer_name.as_str()
        };
        if color.enabled() {
            writeln!(w, "{}", payer.bold())?;
        } else {
            writeln!(w, "{}", payer)?;
        }
        writeln!(w, "  {} / {}", agg.category, agg.detail)?;
        writeln!(
            w,
            "  支払金額 {}  源泉徴収税額 {}  ({}件)",
            yen(agg.payment_amount),
            yen(agg.withholding_tax),
            agg.count
        )?;
    }

    let total_payment: i64 = report
        .aggregated
        .iter()
        .fold(0i64, |acc, a| acc.saturating_add(a.payment_amount));
    let total_tax: i64 = report
        .aggregated
        .iter()
        .fold(0i64, |acc, a| acc.saturating_add(a.withholding_tax));

    writeln!(w)?;
    let totals = format!(
        "{} files, {} records, {} groups: 支払金額 {} / 源泉徴収税額 {}",
        report.processed_files,
        report.records.len(),
        report.aggregated.len(),
        yen(total_payment),
        yen(total_tax)
    );
    if color.enabled() {
        writeln!(w, "{}", totals.green())?;
    } else {
        writeln!(w, "{}", totals)?;
    }

    for name in &report.skipped_files {
        let line = format!("Skipped unsupported file: {}", name);
        if color.enabled() {
            writeln!(w, "{}", line.yellow())?;
        } else {
            writeln!(w, "{}", line)?;
        }
    }
    for failure in &report.failed_files {
        let line = format!("Failed: {}: {}", failure.filename, failure.error);
        if color.enabled() {
            writeln!(w, "{}", line.red())?;
        } else {
            writeln!(w, "{}", line)?;
        }
    }
    for page in &report.page_errors {
        let line = format!(
            "{} page {}: {}",
            page.filename, page.page, page.error
        );
        if color.enabled() {
            writeln!(w, "{}", line.yellow())?;
        } else {
            writeln!(w, "{}", line)?;
        }
    }
    Ok(())
}

pub fn print_written(w: &mut dyn Write, path: &Path, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "Wrote {}", path.display().dimmed())
    } else {
        writeln!(w, "Wrote {}", path.display())
    }
}
