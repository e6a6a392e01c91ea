//! Tabular export of a report (CSV attachments).

use serde::Serialize;

use stockrecon_inventory::{Discrepancy, DiscrepancyReport, MatchType};

use super::{Attachment, NotifyError};

const CSV: &str = "text/csv";

#[derive(Serialize)]
struct SummaryRow<'a> {
    metric: &'a str,
    value: String,
}

#[derive(Serialize)]
struct DiscrepancyRow<'a> {
    sku: &'a str,
    product_name: &'a str,
    quantity_a: u64,
    quantity_b: u64,
    difference: i64,
    percentage_difference: f64,
    match_type: &'a str,
}

impl<'a> From<&'a Discrepancy> for DiscrepancyRow<'a> {
    fn from(d: &'a Discrepancy) -> Self {
        Self {
            sku: &d.display_sku,
            product_name: &d.product_name,
            quantity_a: d.quantity_a,
            quantity_b: d.quantity_b,
            difference: d.difference,
            percentage_difference: d.percentage_difference,
            match_type: match d.match_type {
                MatchType::Strict => "strict",
                MatchType::Loose => "loose",
            },
        }
    }
}

/// `summary.csv`, `discrepancies.csv` (bounded to `max_discrepancies`) and `statistics.csv`.
pub fn report_attachments(report: &DiscrepancyReport, max_discrepancies: usize) -> Result<Vec<Attachment>, NotifyError> {
    let summary = [
        SummaryRow {
            metric: "date",
            value: report.date.to_string(),
        },
        SummaryRow {
            metric: "total_discrepancies",
            value: report.total_discrepancies.to_string(),
        },
        SummaryRow {
            metric: "source_a_items",
            value: report.source_item_counts.source_a.to_string(),
        },
        SummaryRow {
            metric: "source_b_items",
            value: report.source_item_counts.source_b.to_string(),
        },
        SummaryRow {
            metric: "discrepancies_included",
            value: report.top(max_discrepancies).len().to_string(),
        },
    ];

    let stats = &report.match_stats;
    let statistics = [
        ("exact_matches", stats.exact_matches),
        ("strict_matches", stats.strict_matches),
        ("loose_matches", stats.loose_matches),
        ("ignored", stats.ignored),
        ("source_only_a", report.source_only_a.len()),
        ("source_only_b", report.source_only_b.len()),
        ("collisions", report.collisions.len()),
    ]
    .map(|(metric, value)| SummaryRow {
        metric,
        value: value.to_string(),
    });

    Ok(vec![
        attachment("summary.csv", write_rows(&summary)?),
        attachment(
            "discrepancies.csv",
            write_rows(report.top(max_discrepancies).iter().map(DiscrepancyRow::from))?,
        ),
        attachment("statistics.csv", write_rows(&statistics)?),
    ])
}

fn attachment(filename: &str, content: Vec<u8>) -> Attachment {
    Attachment {
        filename: filename.to_string(),
        content_type: CSV.to_string(),
        content,
    }
}

fn write_rows<I, R>(rows: I) -> Result<Vec<u8>, NotifyError>
where
    I: IntoIterator<Item = R>,
    R: Serialize,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| NotifyError::Export(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| NotifyError::Export(e.to_string()))
}
