//! Period reports
//!
//! A report lists every user folder of one collection period with its image
//! count, auto-ledger sum and last manual amount.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::amount::format_amount;
use crate::error::Result;
use crate::ledger::LedgerStore;
use crate::models::{CollectionKey, UserAccount, UserSummary};

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub key: CollectionKey,
    pub users: Vec<UserSummary>,
}

impl Report {
    /// Scan every user folder of the period, in folder-name order
    pub fn for_period(ledger: &LedgerStore, key: &CollectionKey) -> Result<Self> {
        let mut users = Vec::new();
        for folder in ledger.user_folders(key)? {
            if let Some(summary) = ledger.folder_summary(key, &folder)? {
                users.push(summary);
            }
        }
        Ok(Self {
            key: key.clone(),
            users,
        })
    }

    /// Sum over registered users of the city, as counted for payouts
    pub fn city_total(ledger: &LedgerStore, key: &CollectionKey, users: &[UserAccount]) -> Result<Decimal> {
        ledger.aggregate_city(key, users)
    }

    /// Sum of effective totals of every folder in the report
    pub fn total(&self) -> Decimal {
        self.users.iter().map(UserSummary::effective_total).sum()
    }

    /// File name used when the report is sent as a document
    pub fn file_name(&self) -> String {
        format!("report_{}_{}.txt", self.key.city, self.key.period)
    }

    pub fn render(&self, separator: char) -> String {
        if self.users.is_empty() {
            return format!("No reports found for {}.", self.key);
        }

        let mut out = String::new();
        for summary in &self.users {
            out.push_str(&summary.folder);
            out.push('\n');
            out.push_str(&summary_lines(summary, separator));
            out.push_str("\n\n");
        }
        out.push_str(&format!("Total: {}\n", format_amount(self.total(), separator)));
        out
    }
}

/// Reply to `/info`
pub fn render_user_info(summary: Option<&UserSummary>, separator: char) -> String {
    let lines = match summary {
        Some(summary) => summary_lines(summary, separator),
        None => summary_lines(
            &UserSummary {
                folder: String::new(),
                image_count: 0,
                auto_total: Decimal::ZERO,
                last_manual: None,
            },
            separator,
        ),
    };
    format!("Your reports:\n{}", lines)
}

fn summary_lines(summary: &UserSummary, separator: char) -> String {
    let last_manual = summary
        .last_manual
        .map(|a| format_amount(a, separator))
        .unwrap_or_else(|| "not found".to_string());
    format!(
        "Images: {}\nAuto receipts total: {}\nLast manual amount: {}",
        summary.image_count,
        format_amount(summary.auto_total, separator),
        last_manual
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn user(chat_id: i64, first: &str, last: &str) -> UserAccount {
        UserAccount {
            username: None,
            chat_id,
            first_name: first.into(),
            last_name: last.into(),
            city: "Minsk".into(),
            is_admin: false,
        }
    }

    #[test]
    fn test_report_lists_folders_and_totals() {
        let dir = TempDir::new().unwrap();
        let ledger = LedgerStore::new(dir.path(), '.');
        let key = CollectionKey::new("Minsk", "march");
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();

        let anna = user(1, "Anna", "Adams");
        let boris = user(2, "Boris", "Brown");
        ledger.append_auto(&key, &anna, Decimal::from(100), day).unwrap();
        ledger.append_auto(&key, &anna, Decimal::from(50), day).unwrap();
        ledger.append_auto(&key, &boris, Decimal::from(70), day).unwrap();
        ledger.append_manual(&key, &boris, Decimal::new(6550, 2), day).unwrap();
        ledger.store_image(&key, &anna, "1_a.jpg", b"x").unwrap();

        let report = Report::for_period(&ledger, &key).unwrap();
        assert_eq!(report.users.len(), 2);
        assert_eq!(report.users[0].folder, "Adams_Anna");
        assert_eq!(report.users[0].image_count, 1);
        assert_eq!(report.total(), Decimal::new(21550, 2));

        let text = report.render('.');
        assert!(text.starts_with("Adams_Anna\nImages: 1\nAuto receipts total: 150"));
        assert!(text.contains("Last manual amount: 65.50"));
        assert!(text.contains("Last manual amount: not found"));
        assert!(text.ends_with("Total: 215.50\n"));
        assert_eq!(report.file_name(), "report_Minsk_march.txt");

        let city = Report::city_total(&ledger, &key, &[anna, boris]).unwrap();
        assert_eq!(city, report.total());
    }

    #[test]
    fn test_empty_period() {
        let dir = TempDir::new().unwrap();
        let ledger = LedgerStore::new(dir.path(), ',');
        let report = Report::for_period(&ledger, &CollectionKey::new("Gomel", "may")).unwrap();
        assert!(report.users.is_empty());
        assert_eq!(report.render(','), "No reports found for Gomel-may.");
    }

    #[test]
    fn test_user_info_without_folder() {
        let text = render_user_info(None, ',');
        assert_eq!(
            text,
            "Your reports:\nImages: 0\nAuto receipts total: 0\nLast manual amount: not found"
        );
    }
}
