// ── Pure aggregates over backend values ──

use crate::model::Temperatures;

/// Arithmetic mean of every sensor, `None` when there are no sensors.
pub fn mean_temperature(temperatures: &Temperatures) -> Option<f64> {
    if temperatures.is_empty() {
        return None;
    }
    let total: f64 = temperatures.values().sum();
    let count = f64::from(u32::try_from(temperatures.len()).unwrap_or(u32::MAX));
    Some(total / count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_sensors() {
        let temps = Temperatures::from([("CPU".to_owned(), 50.0), ("GPU".to_owned(), 70.0)]);
        assert_eq!(mean_temperature(&temps), Some(60.0));
    }

    #[test]
    fn empty_map_has_no_mean() {
        assert_eq!(mean_temperature(&Temperatures::new()), None);
    }
}
