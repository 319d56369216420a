//! Owner-grouped call count report
//!
//! Turns the collector overview into a sorted summary:
//! - methods within an owner sorted by count, descending
//! - owners sorted by their total call count, descending
//! - ties keep first-seen order
//!
//! `detail = false` keeps only the grand totals. Collection is unaffected.

use crate::collector::{MethodCount, Overview};
use crate::filter::PathCategory;
use std::fmt;

/// Report section for one owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerReport {
    pub owner_label: String,
    pub source_path: String,
    pub category: PathCategory,
    pub methods: Vec<MethodCount>,
    pub total: u64,
}

/// Sorted call count summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewReport {
    /// Empty unless rendered with detail
    pub owners: Vec<OwnerReport>,
    pub owner_count: usize,
    pub total_calls: u64,
}

/// Build the report for `overview`
pub fn render_overview_report(overview: &Overview, detail: bool) -> OverviewReport {
    let owner_count = overview.len();
    let total_calls = overview.total_calls();

    if !detail {
        return OverviewReport {
            owners: Vec::new(),
            owner_count,
            total_calls,
        };
    }

    let mut owners: Vec<OwnerReport> = overview
        .entries()
        .iter()
        .map(|entry| {
            let mut methods = entry.per_method_counts.clone();
            // Stable sort keeps first-seen order for equal counts
            methods.sort_by(|a, b| b.count.cmp(&a.count));
            OwnerReport {
                owner_label: entry.owner_label.clone(),
                source_path: entry.source_path.clone(),
                category: PathCategory::of(&entry.source_path),
                total: entry.total(),
                methods,
            }
        })
        .collect();
    owners.sort_by(|a, b| b.total.cmp(&a.total));

    OverviewReport {
        owners,
        owner_count,
        total_calls,
    }
}

impl OverviewReport {
    pub fn is_detailed(&self) -> bool {
        !self.owners.is_empty()
    }
}

impl fmt::Display for OverviewReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_detailed() {
            for owner in &self.owners {
                writeln!(
                    f,
                    "[{}] {} >> {}",
                    owner.category, owner.owner_label, owner.source_path
                )?;
                for method in &owner.methods {
                    writeln!(f, "\t{:<30} {}", method.method_name, method.count)?;
                }
                writeln!(f)?;
            }

            writeln!(f, "--------------------")?;
            writeln!(f, "Total methods called by each owner:")?;
            let width = self
                .owners
                .iter()
                .map(|o| o.owner_label.chars().count())
                .max()
                .unwrap_or(0);
            for owner in &self.owners {
                writeln!(f, "\t{:<width$} {}", owner.owner_label, owner.total, width = width)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "total class or module: {}", self.owner_count)?;
        writeln!(f, "total method calls: {}", self.total_calls)
    }
}
