use chrono::{DateTime, Datelike, Utc};

use crate::model::*;

use super::AdvisorError;

/// Per-vehicle, per-calendar-month (UTC) fuel figures.
///
/// Distance is the odometer delta between the first and last reading inside
/// the month; a fill-up in the previous month never contributes. Output is
/// ordered by vehicle, then month.
pub fn monthly_fuel_summary(entries: &[FuelLogEntry]) -> Result<Vec<PeriodSummary>, AdvisorError> {
    let mut sorted: Vec<&FuelLogEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.resource_id.cmp(&b.resource_id).then(a.at.cmp(&b.at)));

    let mut summaries: Vec<PeriodSummary> = Vec::new();
    let mut period_start_odometer = 0.0;
    let mut previous: Option<&FuelLogEntry> = None;

    for entry in sorted {
        let date = DateTime::<Utc>::from_timestamp_millis(entry.at)
            .ok_or(AdvisorError::InvalidTimestamp(entry.at))?;
        let (year, month) = (date.year(), date.month());

        if let Some(prev) = previous
            && prev.resource_id == entry.resource_id
            && entry.odometer < prev.odometer
        {
            return Err(AdvisorError::OdometerRegression {
                resource_id: entry.resource_id,
                at: entry.at,
                previous: prev.odometer,
                reading: entry.odometer,
            });
        }
        previous = Some(entry);

        let same_period = summaries.last().is_some_and(|s| {
            s.resource_id == entry.resource_id && s.year == year && s.month == month
        });
        if !same_period {
            period_start_odometer = entry.odometer;
            summaries.push(PeriodSummary {
                resource_id: entry.resource_id,
                year,
                month,
                entries: 0,
                total_cost: 0.0,
                total_fuel: 0.0,
                distance: 0.0,
                efficiency: None,
            });
        }
        if let Some(period) = summaries.last_mut() {
            period.entries += 1;
            period.total_cost += entry.cost;
            period.total_fuel += entry.fuel;
            period.distance = entry.odometer - period_start_odometer;
        }
    }

    for period in &mut summaries {
        period.efficiency = (period.distance > 0.0 && period.total_fuel > 0.0)
            .then(|| period.distance / period.total_fuel);
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn at(month: u32, day: u32) -> Ms {
        Utc.with_ymd_and_hms(2024, month, day, 12, 0, 0)
            .unwrap()
            .timestamp_millis()
    }

    fn fill(resource_id: Ulid, at: Ms, odometer: f64, fuel: f64, cost: f64) -> FuelLogEntry {
        FuelLogEntry {
            resource_id,
            at,
            odometer,
            fuel,
            cost,
        }
    }

    #[test]
    fn single_month_efficiency() {
        let v = Ulid::new();
        let summary = monthly_fuel_summary(&[
            fill(v, at(1, 1), 1000.0, 10.0, 15.0),
            fill(v, at(1, 15), 1400.0, 12.0, 18.0),
        ])
        .unwrap();

        assert_eq!(summary.len(), 1);
        let jan = &summary[0];
        assert_eq!((jan.year, jan.month), (2024, 1));
        assert_eq!(jan.entries, 2);
        assert_eq!(jan.distance, 400.0);
        assert_eq!(jan.total_fuel, 22.0);
        assert_eq!(jan.total_cost, 33.0);
        let efficiency = jan.efficiency.unwrap();
        assert!((efficiency - 18.18).abs() < 0.01, "got {efficiency}");
    }

    #[test]
    fn unsorted_input_is_ordered_first() {
        let v = Ulid::new();
        let summary = monthly_fuel_summary(&[
            fill(v, at(1, 15), 1400.0, 12.0, 18.0),
            fill(v, at(1, 1), 1000.0, 10.0, 15.0),
        ])
        .unwrap();
        assert_eq!(summary[0].distance, 400.0);
    }

    #[test]
    fn distance_never_crosses_month_boundary() {
        let v = Ulid::new();
        let summary = monthly_fuel_summary(&[
            fill(v, at(1, 31), 1000.0, 30.0, 45.0),
            fill(v, at(2, 2), 1100.0, 5.0, 7.5),
            fill(v, at(2, 20), 1300.0, 8.0, 12.0),
        ])
        .unwrap();

        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].month, 1);
        assert_eq!(summary[0].distance, 0.0);
        assert_eq!(summary[0].efficiency, None);
        assert_eq!(summary[1].month, 2);
        assert_eq!(summary[1].distance, 200.0);
        assert_eq!(summary[1].total_fuel, 13.0);
    }

    #[test]
    fn vehicles_are_summarized_separately() {
        let a = Ulid::new();
        let b = Ulid::new();
        let summary = monthly_fuel_summary(&[
            fill(a, at(3, 1), 500.0, 10.0, 10.0),
            fill(b, at(3, 2), 90_000.0, 40.0, 60.0),
            fill(a, at(3, 10), 700.0, 10.0, 10.0),
            fill(b, at(3, 12), 90_600.0, 40.0, 60.0),
        ])
        .unwrap();

        assert_eq!(summary.len(), 2);
        let by_vehicle = |id: Ulid| summary.iter().find(|s| s.resource_id == id).unwrap();
        assert_eq!(by_vehicle(a).distance, 200.0);
        assert_eq!(by_vehicle(b).distance, 600.0);
        assert_eq!(by_vehicle(b).efficiency, Some(7.5));
    }

    #[test]
    fn zero_fuel_leaves_efficiency_undefined() {
        let v = Ulid::new();
        let summary = monthly_fuel_summary(&[
            fill(v, at(4, 1), 100.0, 0.0, 0.0),
            fill(v, at(4, 2), 150.0, 0.0, 0.0),
        ])
        .unwrap();
        assert_eq!(summary[0].distance, 50.0);
        assert_eq!(summary[0].efficiency, None);
    }

    #[test]
    fn odometer_regression_is_rejected() {
        let v = Ulid::new();
        let result = monthly_fuel_summary(&[
            fill(v, at(5, 1), 2000.0, 10.0, 10.0),
            fill(v, at(5, 2), 1990.0, 10.0, 10.0),
        ]);
        assert!(matches!(
            result,
            Err(AdvisorError::OdometerRegression { reading, .. }) if reading == 1990.0
        ));
    }

    #[test]
    fn empty_log() {
        assert!(monthly_fuel_summary(&[]).unwrap().is_empty());
    }
}
