//! Best-effort delivery of a run's report to its recipients.
//!
//! Delivery is gated by [`should_notify`]; the message carries the top
//! discrepancies in its body and CSV attachments built by [`export`].
//! Notification failures never fail a run.

pub mod export;
mod channels;

pub use channels::{InMemoryNotifier, LogNotifier};

use std::fmt::Write as _;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use stockrecon_inventory::DiscrepancyReport;

use crate::config::NotificationConfig;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to export report: {0}")]
    Export(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

/// Enabled, at least one recipient, and something to say (or told to speak anyway).
pub fn should_notify(report: &DiscrepancyReport, config: &NotificationConfig) -> bool {
    config.enabled
        && !config.recipients.is_empty()
        && (report.has_discrepancies() || config.notify_on_zero)
}

pub fn build_notification(
    report: &DiscrepancyReport,
    config: &NotificationConfig,
) -> Result<Notification, NotifyError> {
    let shown = report.top(config.max_discrepancies);

    let subject = format!(
        "Inventory reconciliation {}: {} discrepanc{}",
        report.date,
        report.total_discrepancies,
        if report.total_discrepancies == 1 { "y" } else { "ies" }
    );

    let mut body = String::new();
    let _ = writeln!(body, "Reconciliation date: {}", report.date);
    let _ = writeln!(
        body,
        "Items: {} in source A, {} in source B",
        report.source_item_counts.source_a, report.source_item_counts.source_b
    );
    let _ = writeln!(
        body,
        "Matches: {} exact ({} strict pairs, {} loose pairs), {} ignored",
        report.match_stats.exact_matches,
        report.match_stats.strict_matches,
        report.match_stats.loose_matches,
        report.match_stats.ignored
    );
    let _ = writeln!(
        body,
        "Source-only: {} in A, {} in B",
        report.source_only_a.len(),
        report.source_only_b.len()
    );
    let _ = writeln!(body);

    if shown.is_empty() {
        let _ = writeln!(body, "No discrepancies found.");
    } else {
        let _ = writeln!(
            body,
            "Top {} of {} discrepancies:",
            shown.len(),
            report.total_discrepancies
        );
        for d in shown {
            let _ = writeln!(
                body,
                "  {} ({}): A={} B={} diff={:+} ({}%)",
                d.display_sku, d.product_name, d.quantity_a, d.quantity_b, d.difference, d.percentage_difference
            );
        }
    }

    Ok(Notification {
        recipients: config.recipients.clone(),
        subject,
        body,
        attachments: export::report_attachments(report, config.max_discrepancies)?,
    })
}

/// Delivery channel (email backend, chat webhook, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Gate, build and deliver. Returns whether anything was sent.
    async fn notify(&self, report: &DiscrepancyReport, config: &NotificationConfig) -> Result<bool, NotifyError> {
        if !should_notify(report, config) {
            return Ok(false);
        }
        let notification = build_notification(report, config)?;
        self.deliver(&notification).await?;
        Ok(true)
    }
}
