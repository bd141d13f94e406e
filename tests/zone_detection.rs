//! Detection-strategy behavior on synthetic tables: the literal seed
//! scenarios plus the structural invariants every strategy must uphold.

mod common;

use common::{sample_ohlcv, sine_oscillator, square_oscillator, with_column};
use zonelab::analyze_zones;
use zonelab::data;
use zonelab::detect::registry::build_detector;
use zonelab::detect::{
    CmpOp, DetectionStrategy, ExternalZone, Predicate, ZoneDetectionConfig, ZonesSource,
};
use zonelab::models::ZoneInfo;

fn assert_structural_invariants(zones: &[ZoneInfo], n: usize, config: &ZoneDetectionConfig) {
    for (i, zone) in zones.iter().enumerate() {
        assert_eq!(zone.zone_id, i, "zone ids must be sequential from 0");
        assert!(zone.start_idx <= zone.end_idx);
        assert!(zone.end_idx < n);
        assert_eq!(zone.duration, zone.end_idx - zone.start_idx + 1);
        assert!(zone.duration >= config.min_duration);
        assert!(
            config.zone_types.iter().any(|t| t == &zone.zone_type || t == "any"),
            "zone type '{}' not in configured set",
            zone.zone_type
        );
        assert_eq!(zone.indicator_context.detection_strategy, config.strategy);
        assert_eq!(zone.data.height(), zone.duration);
    }
    for pair in zones.windows(2) {
        assert!(
            pair[1].start_idx > pair[0].end_idx,
            "zones must be ordered and non-overlapping"
        );
    }
}

// ── Scenario A: zero-crossing on a sine indicator ────────────────────────────

#[test]
fn zero_crossing_sine_wave_scenario() {
    let n = 200;
    let df = with_column(sample_ohlcv(n), "osc", sine_oscillator(n, 40));
    let config = ZoneDetectionConfig::new("zero_crossing").with_rule("indicator_col", "osc");
    let detection = build_detector("zero_crossing")
        .unwrap()
        .detect_zones(&df, &config)
        .unwrap();
    let zones = detection.zones;

    assert_eq!(zones.len(), 10, "one zone per sine half-period");
    assert_structural_invariants(&zones, n, &config);

    // sin(0) is exactly 0 and coerces positive, so the run starts bull.
    assert_eq!(zones[0].zone_type, "bull");
    for pair in zones.windows(2) {
        assert_ne!(pair[0].zone_type, pair[1].zone_type, "zones must alternate");
    }

    // Half-period boundaries land on float sign epsilons; every zone stays
    // within one bar of the ideal 20.
    let total: usize = zones.iter().map(|z| z.duration).sum();
    assert_eq!(total, n);
    for zone in &zones {
        assert!(
            (19..=21).contains(&zone.duration),
            "zone duration {} strays from the half-period",
            zone.duration
        );
    }

    // Detection-strategy property: inside a bull zone the indicator is
    // strictly positive except possibly one leading zero-valued bar.
    for zone in &zones {
        let values = data::column_to_f64(&zone.data, "osc").unwrap();
        match zone.zone_type.as_str() {
            "bull" => {
                assert!(values.iter().skip(1).all(|&v| v > 0.0));
                assert!(values[0] >= 0.0);
            }
            "bear" => {
                assert!(values.iter().all(|&v| v < 0.0));
            }
            other => panic!("unexpected zone type {other}"),
        }
    }
}

#[test]
fn zero_crossing_square_wave_has_exact_durations() {
    let n = 200;
    let df = with_column(sample_ohlcv(n), "osc", square_oscillator(n, 20));
    let config = ZoneDetectionConfig::new("zero_crossing").with_rule("indicator_col", "osc");
    let zones = build_detector("zero_crossing")
        .unwrap()
        .detect_zones(&df, &config)
        .unwrap()
        .zones;

    assert_eq!(zones.len(), 10);
    let ids: Vec<usize> = zones.iter().map(|z| z.zone_id).collect();
    assert_eq!(ids, (0..10).collect::<Vec<_>>());
    for (i, zone) in zones.iter().enumerate() {
        assert_eq!(zone.duration, 20);
        assert_eq!(zone.start_idx, i * 20);
        assert_eq!(
            zone.zone_type,
            if i % 2 == 0 { "bull" } else { "bear" }
        );
    }
}

// ── Scenario B: threshold on RSI-like values ─────────────────────────────────

#[test]
fn threshold_rsi_scenario() {
    let n = 100;
    let rsi: Vec<f64> = (0..n)
        .map(|i| 50.0 + 30.0 * (std::f64::consts::TAU * i as f64 / 25.0).sin())
        .collect();
    let df = with_column(sample_ohlcv(n), "rsi", rsi);
    let config = ZoneDetectionConfig::new("threshold")
        .with_rule("indicator_col", "rsi")
        .with_rule("upper_threshold", 70.0)
        .with_rule("lower_threshold", 30.0)
        .with_min_duration(3)
        .with_zone_types(["overbought", "neutral", "oversold"]);
    let zones = build_detector("threshold")
        .unwrap()
        .detect_zones(&df, &config)
        .unwrap()
        .zones;

    assert_structural_invariants(&zones, n, &config);
    assert!(zones.iter().any(|z| z.zone_type == "overbought"));
    assert!(zones.iter().any(|z| z.zone_type == "oversold"));

    for zone in &zones {
        let values = data::column_to_f64(&zone.data, "rsi").unwrap();
        match zone.zone_type.as_str() {
            "overbought" => assert!(values.iter().all(|&v| v > 70.0)),
            "oversold" => assert!(values.iter().all(|&v| v < 30.0)),
            "neutral" => assert!(values.iter().all(|&v| (30.0..=70.0).contains(&v))),
            other => panic!("unexpected zone type {other}"),
        }
    }
}

// ── Line crossing ────────────────────────────────────────────────────────────

#[test]
fn line_crossing_dominance_holds_inside_zones() {
    let n = 120;
    let fast: Vec<f64> = (0..n)
        .map(|i| 100.0 + (std::f64::consts::TAU * i as f64 / 30.0).sin() * 4.0)
        .collect();
    let slow = vec![100.0; n];
    let df = with_column(with_column(sample_ohlcv(n), "fast", fast), "slow", slow);
    let config = ZoneDetectionConfig::new("line_crossing")
        .with_rule("line1_col", "fast")
        .with_rule("line2_col", "slow");
    let zones = build_detector("line_crossing")
        .unwrap()
        .detect_zones(&df, &config)
        .unwrap()
        .zones;

    assert_structural_invariants(&zones, n, &config);
    assert!(zones.len() >= 4);
    for zone in &zones {
        let fast = data::column_to_f64(&zone.data, "fast").unwrap();
        let slow = data::column_to_f64(&zone.data, "slow").unwrap();
        for (f, s) in fast.iter().zip(slow.iter()) {
            match zone.zone_type.as_str() {
                "bull" => assert!(f > s),
                "bear" => assert!(f < s),
                other => panic!("unexpected zone type {other}"),
            }
        }
        assert_eq!(zone.indicator_context.signal_line.as_deref(), Some("slow"));
    }
}

// ── Scenario C: combined AND with one always-false predicate ─────────────────

#[test]
fn combined_and_with_false_predicate_yields_empty_result() {
    let df = sample_ohlcv(60);
    let conditions = vec![
        Predicate::custom("always_true", |df| Ok(vec![true; df.height()])),
        Predicate::custom("always_false", |df| Ok(vec![false; df.height()])),
    ];
    let result = analyze_zones(&df)
        .detect_zones("combined")
        .rule("conditions", conditions)
        .rule("logic", "AND")
        .zone_types(["active"])
        .with_cache(false)
        .build()
        .unwrap();

    assert_eq!(result.metadata.total_zones, 0);
    assert!(result.zones.is_empty());
    assert_eq!(result.statistics.total_zones, 0);
}

#[test]
fn combined_predicates_hold_on_every_zone_bar() {
    let n = 80;
    let osc = sine_oscillator(n, 16);
    let df = with_column(sample_ohlcv(n), "osc", osc);
    let config = ZoneDetectionConfig::new("combined")
        .with_rule(
            "conditions",
            vec![Predicate::compare("osc", CmpOp::Gt, 0.0)],
        )
        .with_zone_types(["active", "inactive"]);
    let zones = build_detector("combined")
        .unwrap()
        .detect_zones(&df, &config)
        .unwrap()
        .zones;

    assert_structural_invariants(&zones, n, &config);
    for zone in &zones {
        let values = data::column_to_f64(&zone.data, "osc").unwrap();
        match zone.zone_type.as_str() {
            "active" => assert!(values.iter().all(|&v| v > 0.0)),
            "inactive" => assert!(values.iter().all(|&v| v <= 0.0)),
            other => panic!("unexpected zone type {other}"),
        }
    }
}

// ── Scenario D: preloaded zones outside the data range ───────────────────────

#[test]
fn preloaded_zones_outside_range_warn_and_yield_empty_result() {
    let df = sample_ohlcv(50);
    let rows = vec![ExternalZone {
        zone_id: 0,
        zone_type: "bull".into(),
        start_time: chrono::NaiveDate::from_ymd_opt(2030, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap(),
        end_time: chrono::NaiveDate::from_ymd_opt(2030, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap(),
    }];
    let result = analyze_zones(&df)
        .detect_zones("preloaded")
        .rule("zones_data", ZonesSource::Rows(rows))
        .zone_types(["any"])
        .with_cache(false)
        .build()
        .unwrap();

    assert_eq!(result.metadata.total_zones, 0);
    assert!(result
        .metadata
        .warnings
        .iter()
        .any(|w| w.contains("no bars")));
}

#[test]
fn preloaded_zone_stays_within_tolerance_window() {
    let df = sample_ohlcv(48);
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(5, 0, 0)
        .unwrap();
    let end = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    let rows = vec![ExternalZone {
        zone_id: 3,
        zone_type: "supply".into(),
        start_time: start,
        end_time: end,
    }];
    let config = ZoneDetectionConfig::new("preloaded")
        .with_rule("zones_data", ZonesSource::Rows(rows))
        .with_rule("time_tolerance", "30min")
        .with_zone_types(["any"]);
    let zones = build_detector("preloaded")
        .unwrap()
        .detect_zones(&df, &config)
        .unwrap()
        .zones;

    assert_eq!(zones.len(), 1);
    let tolerance = chrono::Duration::minutes(30);
    assert!(zones[0].start_time >= start - tolerance);
    assert!(zones[0].end_time <= end + tolerance);
}

// ── Registry behavior ────────────────────────────────────────────────────────

#[test]
fn unknown_strategy_error_lists_known_names() {
    let err = build_detector("wavelet").unwrap_err();
    let msg = err.to_string();
    for known in ["zero_crossing", "threshold", "line_crossing", "preloaded", "combined"] {
        assert!(msg.contains(known), "error should list '{known}'");
    }
}
