use chrono::NaiveDate;
use mfs_trends::filter::matches_marker;
use mfs_trends::utils::add_months;
use mfs_trends::*;
use std::collections::{BTreeMap, HashSet};
use std::fs;

fn month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap()
}

/// Wide table the way the landing page publishes it: one row per category,
/// one column per month, amounts in crore BDT.
fn wide_table(start: NaiveDate, months: i32, categories: &[(&str, f64)]) -> RawTable {
    let mut headers = vec![Some("Particulars".to_string()), None];
    for i in 0..months {
        let m = add_months(start, i).unwrap();
        headers.push(Some(m.format("%b-%Y").to_string()));
    }

    let rows = categories
        .iter()
        .map(|(name, base)| {
            let mut row = vec![Cell::from(*name), Cell::Empty];
            for i in 0..months {
                let value = base * (1.0 + 0.01 * i as f64);
                row.push(Cell::from(format!("{:.2}", value)));
            }
            row
        })
        .collect();

    RawTable {
        headers,
        rows,
        source: Some(SourceTag::Html),
    }
}

#[test]
fn test_scenario_a_wide_cash_in() {
    let raw = RawTable::new(
        ["Particulars", "Jan-2024", "Feb-2024"],
        vec![vec!["Cash In".into(), "10,000,000".into(), "12,000,000".into()]],
    );

    let report = MfsPipeline::default().tidy(&raw);
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[0].date, month(2024, 1));
    assert_eq!(report.records[0].category, "Cash In");
    assert!((report.records[0].amount_base_currency - 10_000_000.0 * 1e7).abs() < 1.0);
    assert_eq!(report.records[1].date, month(2024, 2));
    assert!((report.records[1].amount_base_currency - 12_000_000.0 * 1e7).abs() < 1.0);
}

#[test]
fn test_scenario_b_growth_shapes() {
    let records: Vec<TidyRecord> = (1..=3)
        .map(|m| TidyRecord::new(month(2023, m), "P2P", m as f64))
        .collect();
    let metrics = add_growth(aggregate_monthly(&records));

    assert_eq!(metrics.len(), 3);
    assert!(metrics[0].mom.is_none());
    assert!(metrics[1].mom.is_some());
    assert!(metrics[2].mom.is_some());
    assert!(metrics.iter().all(|m| m.yoy.is_none()));
}

#[test]
fn test_scenario_c_missing_manual_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        manual_override_path: Some(dir.path().join("data").join("mfs_manual.csv")),
        ..PipelineConfig::default()
    };
    let pipeline = MfsPipeline::new(config).unwrap();

    let raw = wide_table(month(2024, 1), 3, &[("P2P", 8.0), ("Cash Out", 19.0)]);
    let output = pipeline.run_with_configured_overrides(&raw);

    assert!(output.warnings.is_empty());
    assert_eq!(output.metrics.len(), 6);
}

#[test]
fn test_manual_file_takes_precedence() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("mfs_manual.csv");
    fs::write(
        &path,
        "month,category,amount_bdt\n2024-01-01,P2P,150\n2024-04-01,P2P,400\n",
    )?;

    let raw = RawTable::new(
        ["month", "category", "amount_crore_bdt"],
        vec![vec!["2024-01-01".into(), "P2P".into(), "0.00001".into()]],
    );
    let output = MfsPipeline::default().run(&raw, &ManualOverrideSource::File(path));

    assert!(output.warnings.is_empty());
    let jan: Vec<_> = output
        .tidy
        .iter()
        .filter(|r| r.date == month(2024, 1) && r.category == "P2P")
        .collect();
    assert_eq!(jan.len(), 1);
    assert_eq!(jan[0].amount_base_currency, 150.0);
    assert_eq!(output.tidy.len(), 2);
    Ok(())
}

#[test]
fn test_malformed_manual_file_is_a_warning() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("mfs_manual.csv");
    fs::write(&path, "month,category,amount_bdt\nnot-a-month,P2P,150\n")?;

    let raw = wide_table(month(2024, 1), 2, &[("P2P", 8.0)]);
    let output = MfsPipeline::default().run(&raw, &ManualOverrideSource::File(path.clone()));

    assert_eq!(output.metrics.len(), 2);
    assert_eq!(output.warnings.len(), 1);
    let PipelineWarning::ManualOverrideSkipped { path: reported, .. } = &output.warnings[0];
    assert_eq!(reported, &path);
    assert!(output.warnings[0].to_string().contains("could not be merged"));
    Ok(())
}

#[test]
fn test_header_normalization_is_idempotent() {
    let raw = wide_table(
        month(2023, 11),
        4,
        &[("Utility Bill Payment (P2B)", 2.0), ("Merchant Payment", 4.0)],
    );
    let synonyms = HeaderSynonyms::default();
    let once = normalize_headers(&raw, &synonyms);
    let twice = normalize_headers(&once, &synonyms);
    assert_eq!(once, twice);
    assert_eq!(once.header_names()[0], "category");
}

#[test]
fn test_unit_conversion_is_exact() {
    for value in [0.5, 1.0, 19.37, 12_345.678] {
        let raw = RawTable::new(
            ["month", "category", "amount_crore_bdt"],
            vec![vec!["2024-06-01".into(), "Others".into(), Cell::Number(value)]],
        );
        let report = MfsPipeline::default().tidy(&raw);
        let amount = report.records[0].amount_base_currency;
        assert!((amount - value * 1e7).abs() <= 1e-6 * amount.abs());
    }
}

#[test]
fn test_surviving_categories_carry_a_marker() {
    let raw = wide_table(
        month(2024, 1),
        2,
        &[
            ("Cash In", 20.0),
            ("Number of Accounts (in lakh)", 2000.0),
            ("Total Transactions", 90.0),
            ("Government Payment", 1.0),
            ("Inward Remittance", 3.0),
        ],
    );
    let config = PipelineConfig::default();
    let report = MfsPipeline::default().tidy(&raw);

    assert_eq!(report.records.len(), 4);
    for record in &report.records {
        assert!(matches_marker(&record.category, &config.category_markers));
    }
    assert_eq!(report.skipped.get(&Skip::UnrecognizedCategory), Some(&6));
}

#[test]
fn test_sample_data_end_to_end() {
    let raw = sample_raw();
    let output = MfsPipeline::default().run(&raw, &ManualOverrideSource::None);

    assert_eq!(output.tidy.len(), 96);
    assert_eq!(output.metrics.len(), 96);

    let keys: HashSet<_> = output
        .metrics
        .iter()
        .map(|m| (m.month, m.category.clone()))
        .collect();
    assert_eq!(keys.len(), output.metrics.len());

    let categories: HashSet<_> = output.metrics.iter().map(|m| m.category.as_str()).collect();
    for category in MfsCategory::ALL {
        assert!(categories.contains(category.label()));
    }

    for metric in &output.metrics {
        if metric.month == month(2024, 1) {
            assert!(metric.mom.is_none());
        } else {
            assert!(metric.mom.is_some());
        }
        assert!(metric.yoy.is_none());
    }

    // A single year of history is never eligible for anomaly flags.
    let flags = MfsPipeline::default().anomalies(&output.metrics);
    assert_eq!(flags.len(), 8);
    assert!(flags.values().flatten().all(|f| !f.is_anomalous));
}

#[test]
fn test_multi_year_growth_and_anomalies() {
    let mut raw = wide_table(month(2021, 1), 36, &[("P2P", 8.0), ("Cash In", 20.0)]);
    // Sep-2022 spike; month columns start after the label and blank columns.
    raw.rows[0][2 + 20] = Cell::from("80.00");

    let pipeline = MfsPipeline::default();
    let output = pipeline.run(&raw, &ManualOverrideSource::None);
    assert_eq!(output.metrics.len(), 72);

    let by_key: BTreeMap<_, _> = output
        .metrics
        .iter()
        .map(|m| ((m.category.as_str(), m.month), m))
        .collect();
    assert!(by_key[&("Cash In", month(2021, 12))].yoy.is_none());
    let yoy = by_key[&("Cash In", month(2022, 1))].yoy.unwrap();
    assert!((yoy - (1.12 / 1.0 - 1.0)).abs() < 1e-3);

    let flags = pipeline.anomalies_for(&output.metrics, "P2P");
    assert_eq!(flags.len(), 36);
    let spike = flags.iter().find(|f| f.month == month(2022, 9)).unwrap();
    assert!(spike.is_anomalous);
}

#[test]
fn test_short_series_never_flagged_end_to_end() {
    let mut raw = wide_table(month(2022, 1), 23, &[("Merchant Payment", 4.0)]);
    raw.rows[0][2 + 10] = Cell::from("4000");

    let pipeline = MfsPipeline::default();
    let output = pipeline.run(&raw, &ManualOverrideSource::None);
    let flags = pipeline.anomalies_for(&output.metrics, "Merchant Payment");
    assert_eq!(flags.len(), 23);
    assert!(flags.iter().all(|f| !f.is_anomalous));
}

#[test]
fn test_export_round_trip_through_csv_reader() -> anyhow::Result<()> {
    let output = MfsPipeline::default().run(&sample_raw(), &ManualOverrideSource::None);

    let mut buffer = Vec::new();
    write_metrics_csv(&output.metrics, &mut buffer)?;

    let mut rdr = csv::Reader::from_reader(buffer.as_slice());
    let parsed: Vec<MonthlyMetric> = rdr.deserialize().collect::<std::result::Result<_, _>>()?;
    assert_eq!(parsed.len(), output.metrics.len());
    assert_eq!(parsed[0].category, output.metrics[0].category);
    assert_eq!(parsed[0].mom, None);
    Ok(())
}

#[test]
fn test_overflowing_amount_never_reaches_tidy_records() {
    let huge = format!("1{}", "0".repeat(302));
    let raw = RawTable::new(
        ["month", "category", "amount_crore_bdt"],
        vec![
            vec!["2024-01-01".into(), "P2P".into(), huge.into()],
            vec!["2024-01-01".into(), "Cash In".into(), "2".into()],
        ],
    );
    let report = MfsPipeline::default().tidy(&raw);

    assert_eq!(report.records.len(), 1);
    assert!(report.records.iter().all(|r| r.amount_base_currency.is_finite()));
    assert_eq!(report.skipped.get(&Skip::MissingAmount), Some(&1));
}

#[test]
fn test_latest_summary_and_mix_from_sample() {
    let output = MfsPipeline::default().run(&sample_raw(), &ManualOverrideSource::None);

    let summary = latest_summary(&output.metrics).unwrap();
    assert_eq!(summary.month, month(2024, 12));
    assert_eq!(summary.categories, 8);
    assert!(summary.mean_mom.is_some());
    assert_eq!(summary.mean_yoy, None);

    let mix = category_mix(&output.metrics);
    assert_eq!(mix.len(), output.metrics.len());
    let december: f64 = mix
        .iter()
        .filter(|s| s.month == month(2024, 12))
        .filter_map(|s| s.share)
        .sum();
    assert!((december - 1.0).abs() < 1e-9);
}
