use crate::error::Result;
use crate::schema::MonthlyMetric;
use std::io::Write;

/// Writes the metrics table as CSV with a header row. Absent growth values are
/// written as empty cells.
pub fn write_metrics_csv<W: Write>(metrics: &[MonthlyMetric], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for metric in metrics {
        wtr.serialize(metric)?;
    }
    wtr.flush()?;
    Ok(())
}

/// JSON schema of one metrics row, for consumers of the exported table.
pub fn metrics_json_schema() -> serde_json::Result<serde_json::Value> {
    serde_json::to_value(schemars::schema_for!(MonthlyMetric))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_csv_layout() {
        let month = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let mut metric = MonthlyMetric::new(month, "P2P", 2.0e7);
        metric.mom = Some(0.25);

        let mut out = Vec::new();
        write_metrics_csv(&[metric], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("month,category,amount_base_currency,mom,yoy")
        );
        assert_eq!(lines.next(), Some("2024-02-01,P2P,20000000.0,0.25,"));
    }

    #[test]
    fn test_schema_lists_metric_fields() {
        let schema = metrics_json_schema().unwrap();
        let properties = schema["properties"].as_object().unwrap();
        for field in ["month", "category", "amount_base_currency", "mom", "yoy"] {
            assert!(properties.contains_key(field), "missing {}", field);
        }
    }
}
