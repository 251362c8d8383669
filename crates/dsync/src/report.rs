//! 🍽️ End-of-run summary: what happened to each resource type, in a comfy table.

use std::fmt;

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};

/// 📋 Tally for one resource type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeReport {
    pub resource_type: String,
    pub imported: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub failed: usize,
    /// Why the rest of this type was abandoned, if it was.
    pub aborted: Option<String>,
}

impl TypeReport {
    pub fn new(resource_type: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.aborted.is_none()
    }
}

/// 📋 Tally for the whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub types: Vec<TypeReport>,
}

impl RunReport {
    pub fn push(&mut self, report: TypeReport) {
        self.types.push(report);
    }

    pub fn get(&self, resource_type: &str) -> Option<&TypeReport> {
        self.types
            .iter()
            .find(|report| report.resource_type == resource_type)
    }

    pub fn is_clean(&self) -> bool {
        self.types.iter().all(TypeReport::is_clean)
    }

    pub fn failures(&self) -> usize {
        self.types
            .iter()
            .map(|report| report.failed + usize::from(report.aborted.is_some()))
            .sum()
    }

    pub fn merge(&mut self, other: RunReport) {
        for incoming in other.types {
            match self
                .types
                .iter_mut()
                .find(|existing| existing.resource_type == incoming.resource_type)
            {
                Some(existing) => {
                    existing.imported += incoming.imported;
                    existing.created += incoming.created;
                    existing.updated += incoming.updated;
                    existing.skipped += incoming.skipped;
                    existing.deleted += incoming.deleted;
                    existing.failed += incoming.failed;
                    if incoming.aborted.is_some() {
                        existing.aborted = incoming.aborted;
                    }
                }
                None => self.types.push(incoming),
            }
        }
    }

    /// 🍽️ Render as a table. Columns nobody used this run are still shown; zeros are honest.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            "resource type",
            "imported",
            "created",
            "updated",
            "skipped",
            "deleted",
            "failed",
            "status",
        ]);
        for report in &self.types {
            let status = match &report.aborted {
                Some(reason) => format!("aborted: {reason}"),
                None if report.failed > 0 => "partial".to_string(),
                None => "ok".to_string(),
            };
            let number = |n: usize| Cell::new(n).set_alignment(CellAlignment::Right);
            table.add_row(vec![
                Cell::new(&report.resource_type),
                number(report.imported),
                number(report.created),
                number(report.updated),
                number(report.skipped),
                number(report.deleted),
                number(report.failed),
                Cell::new(status),
            ]);
        }
        table
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_import_and_sync_share_a_row() {
        let mut import = RunReport::default();
        import.push(TypeReport {
            imported: 3,
            ..TypeReport::new("aws_integration")
        });
        let mut sync = RunReport::default();
        sync.push(TypeReport {
            created: 2,
            skipped: 1,
            ..TypeReport::new("aws_integration")
        });
        import.merge(sync);

        assert_eq!(import.types.len(), 1);
        let aws = import.get("aws_integration").expect("row");
        assert_eq!((aws.imported, aws.created, aws.skipped), (3, 2, 1));
        assert!(import.is_clean());
    }

    #[test]
    fn the_one_where_the_table_tells_on_failures() {
        let mut report = RunReport::default();
        report.push(TypeReport {
            failed: 1,
            ..TypeReport::new("slack_integration_channels")
        });
        report.push(TypeReport {
            aborted: Some("network down".into()),
            ..TypeReport::new("gcp_integration")
        });
        assert!(!report.is_clean());
        assert_eq!(report.failures(), 2);

        let rendered = report.to_string();
        assert!(rendered.contains("slack_integration_channels"));
        assert!(rendered.contains("partial"));
        assert!(rendered.contains("aborted: network down"));
    }
}
