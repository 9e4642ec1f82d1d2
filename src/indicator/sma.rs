use rust_decimal::Decimal;

/// Simple moving average of the last `period` values.
///
/// Returns `None` until at least `period` values exist.
pub fn sma(values: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    let sum: Decimal = window.iter().copied().sum();
    Some(sum / Decimal::from(period as u64))
}

/// Fractional change between the latest value and the one `lookback` bars
/// earlier. `None` on short history or a zero base price.
pub fn rate_of_change(values: &[Decimal], lookback: usize) -> Option<Decimal> {
    if lookback == 0 || values.len() <= lookback {
        return None;
    }
    let last = values[values.len() - 1];
    let base = values[values.len() - 1 - lookback];
    if base.is_zero() {
        return None;
    }
    Some(last / base - Decimal::ONE)
}
