use flowstat_core::Usage;
use std::collections::HashMap;

/// Token usage per node plus the running execution total.
///
/// A node reporting twice keeps only its latest value, while the total adds
/// every report.
#[derive(Debug, Clone, Default)]
pub struct UsageAccumulator {
    nodes: HashMap<String, Usage>,
    total: Usage,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a report for `node_key`. `None` is ignored.
    pub fn collect(&mut self, node_key: &str, usage: Option<Usage>) {
        let Some(usage) = usage else {
            return;
        };
        self.nodes.insert(node_key.to_string(), usage);
        self.total += usage;
    }

    /// The running total, or `None` while nothing has been counted
    pub fn total(&self) -> Option<Usage> {
        if self.total.is_zero() {
            None
        } else {
            Some(self.total)
        }
    }

    pub fn node(&self, node_key: &str) -> Option<Usage> {
        self.nodes.get(node_key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_absent_until_collected() {
        let mut acc = UsageAccumulator::new();
        assert_eq!(acc.total(), None);

        acc.collect("n1", None);
        assert_eq!(acc.total(), None);

        acc.collect("n1", Some(Usage::new(10, 5, 15)));
        assert_eq!(acc.total(), Some(Usage::new(10, 5, 15)));
    }

    #[test]
    fn test_totals_add_across_nodes() {
        let mut acc = UsageAccumulator::new();
        acc.collect("n1", Some(Usage::new(10, 5, 15)));
        acc.collect("n2", Some(Usage::new(1, 2, 3)));

        assert_eq!(acc.total(), Some(Usage::new(11, 7, 18)));
        assert_eq!(acc.node("n2"), Some(Usage::new(1, 2, 3)));
        assert_eq!(acc.node("n3"), None);
    }

    #[test]
    fn test_repeat_node_overwrites_entry_but_adds_total() {
        let mut acc = UsageAccumulator::new();
        acc.collect("n1", Some(Usage::new(10, 5, 15)));
        acc.collect("n1", Some(Usage::new(2, 2, 4)));

        assert_eq!(acc.node("n1"), Some(Usage::new(2, 2, 4)));
        assert_eq!(acc.total(), Some(Usage::new(12, 7, 19)));
    }

    #[test]
    fn test_zero_report_keeps_total_absent() {
        let mut acc = UsageAccumulator::new();
        acc.collect("n1", Some(Usage::default()));

        assert_eq!(acc.node("n1"), Some(Usage::default()));
        assert_eq!(acc.total(), None);
    }
}
