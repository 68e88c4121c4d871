use std::collections::HashMap;

use crate::agent_engine::state::OperationRecord;
use crate::perception::types::Point;

const SUMMARY_WINDOW: usize = 5;
const POSITIONS_PER_TYPE: usize = 5;

/// In-memory record of every operation performed during one task.
#[derive(Debug, Default)]
pub struct OperationHistory {
    records: Vec<OperationRecord>,
    successful: HashMap<String, Vec<Point>>,
}

impl OperationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: OperationRecord) {
        if record.success {
            if let Some(pos) = record.position {
                let list = self.successful.entry(record.action_type.clone()).or_default();
                list.push(pos);
                if list.len() > POSITIONS_PER_TYPE {
                    list.remove(0);
                }
            }
        }
        tracing::trace!(
            action = %record.action_type,
            success = record.success,
            "operation recorded"
        );
        self.records.push(record);
    }

    pub fn records(&self) -> &[OperationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// One line per recent operation: `type: at (x, y) - ok|failed`.
    pub fn summary(&self) -> String {
        if self.records.is_empty() {
            return "No operations yet".to_string();
        }
        let start = self.records.len().saturating_sub(SUMMARY_WINDOW);
        self.records[start..]
            .iter()
            .map(|op| {
                let at = match op.position {
                    Some(p) => {
                        let (x, y) = p.rounded();
                        format!("at ({x}, {y})")
                    }
                    None => "no position".to_string(),
                };
                let status = if op.success { "ok" } else { "failed" };
                format!("{}: {at} - {status}", op.action_type)
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn successful_positions(&self, action_type: &str) -> &[Point] {
        self.successful
            .get(action_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Earlier successful positions of the same action type lying within
    /// `threshold` times the larger screen dimension of `(x, y)`.
    pub fn similar_positions(
        &self,
        action_type: &str,
        x: f64,
        y: f64,
        threshold: f64,
        screen: (u32, u32),
    ) -> Vec<Point> {
        let radius = threshold * screen.0.max(screen.1) as f64;
        let here = Point::new(x, y);
        self.successful_positions(action_type)
            .iter()
            .copied()
            .filter(|p| p.distance_to(&here) < radius)
            .collect()
    }

    pub fn successful_positions_summary(&self) -> String {
        let mut types: Vec<&String> = self.successful.keys().collect();
        types.sort();
        types
            .into_iter()
            .map(|t| {
                let points = self.successful[t]
                    .iter()
                    .map(|p| {
                        let (x, y) = p.rounded();
                        format!("({x}, {y})")
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{t}: {points}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(kind: &str, x: f64, y: f64, ok: bool) -> OperationRecord {
        OperationRecord::new(kind, Some(Point::new(x, y)), ok, "")
    }

    #[test]
    fn summary_covers_last_five() {
        let mut h = OperationHistory::new();
        assert_eq!(h.summary(), "No operations yet");
        for i in 0..7 {
            h.record(op("mouse_click", i as f64, 0.0, i % 2 == 0));
        }
        h.record(OperationRecord::new("wait", None, true, ""));
        let summary = h.summary();
        assert_eq!(summary.split("; ").count(), 5);
        assert!(summary.starts_with("mouse_click: at (3, 0) - failed"));
        assert!(summary.ends_with("wait: no position - ok"));
    }

    #[test]
    fn keeps_five_successful_positions_per_type() {
        let mut h = OperationHistory::new();
        for i in 0..8 {
            h.record(op("mouse_click", i as f64 * 10.0, 0.0, true));
        }
        h.record(op("mouse_click", 999.0, 0.0, false));
        let kept = h.successful_positions("mouse_click");
        assert_eq!(kept.len(), 5);
        assert_eq!(kept[0], Point::new(30.0, 0.0));
        assert_eq!(kept[4], Point::new(70.0, 0.0));
        assert!(h.successful_positions("type_text").is_empty());
    }

    #[test]
    fn similar_positions_scale_with_screen() {
        let mut h = OperationHistory::new();
        h.record(op("mouse_click", 100.0, 100.0, true));
        h.record(op("mouse_click", 500.0, 500.0, true));
        // 0.1 * 1920 = 192px radius
        let near = h.similar_positions("mouse_click", 150.0, 150.0, 0.1, (1920, 1080));
        assert_eq!(near, vec![Point::new(100.0, 100.0)]);
        assert!(h.similar_positions("scroll_window", 150.0, 150.0, 0.1, (1920, 1080)).is_empty());
    }

    #[test]
    fn positions_summary_is_sorted_by_type() {
        let mut h = OperationHistory::new();
        h.record(op("type_text", 1.0, 2.0, true));
        h.record(op("mouse_click", 3.4, 4.6, true));
        assert_eq!(
            h.successful_positions_summary(),
            "mouse_click: (3, 5)\ntype_text: (1, 2)"
        );
    }
}
