use regime_allocator::config::HedgeConfig;
use regime_allocator::model::regime::HedgePreference;
use regime_allocator::regime::HedgePreferenceRouter;

fn router() -> HedgePreferenceRouter {
    HedgePreferenceRouter::new(&HedgeConfig {
        enabled: true,
        correlation_lookback: 5,
        correlation_threshold: 0.2,
    })
    .unwrap()
}

const PRIMARY: [f64; 6] = [100.0, 101.0, 103.0, 102.0, 105.0, 104.0];

#[test]
fn co_moving_rates_route_to_hard_assets() {
    let proxy: Vec<f64> = PRIMARY.iter().map(|p| p * 0.9).collect();
    let r = router();
    let corr = r.correlation(&PRIMARY, &proxy).unwrap();
    assert!(corr > 0.99);
    assert_eq!(r.route(&PRIMARY, &proxy), HedgePreference::Hard);
}

#[test]
fn inverse_rates_route_to_paper() {
    let proxy = [100.0, 99.0, 97.0, 98.0, 95.0, 96.0];
    let r = router();
    assert!(r.correlation(&PRIMARY, &proxy).unwrap() < 0.0);
    assert_eq!(r.route(&PRIMARY, &proxy), HedgePreference::Paper);
}

#[test]
fn short_or_flat_history_defaults_to_paper() {
    let r = router();
    assert_eq!(r.required_history(), 6);
    assert_eq!(r.route(&PRIMARY[1..], &PRIMARY[1..]), HedgePreference::Paper);
    assert!(r.correlation(&PRIMARY, &[50.0; 6]).is_none());
    assert_eq!(r.route(&PRIMARY, &[50.0; 6]), HedgePreference::Paper);
}

#[test]
fn uses_trailing_window_only() {
    let mut primary = vec![100.0, 50.0, 150.0];
    primary.extend_from_slice(&PRIMARY);
    let mut proxy = vec![100.0, 150.0, 50.0];
    proxy.extend(PRIMARY.iter().map(|p| p * 2.0));
    assert_eq!(router().route(&primary, &proxy), HedgePreference::Hard);
}

#[test]
fn rejects_out_of_range_threshold() {
    let cfg = HedgeConfig {
        correlation_threshold: 1.5,
        ..HedgeConfig::default()
    };
    assert!(HedgePreferenceRouter::new(&cfg).is_err());
}
