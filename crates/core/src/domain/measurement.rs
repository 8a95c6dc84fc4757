use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Attribute that a measured design perimeter is written into.
pub const PERIMETER_ATTRIBUTE: &str = "Perimeter Inches";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementSource {
    Drawings,
    SvgFallback,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerimeterMeasurement {
    pub perimeter_inches: Decimal,
    pub perimeter_lf: Decimal,
    pub source: MeasurementSource,
}

impl PerimeterMeasurement {
    pub fn from_inches(perimeter_inches: Decimal, source: MeasurementSource) -> Self {
        let perimeter_inches = perimeter_inches.round_dp(3);
        Self {
            perimeter_inches,
            perimeter_lf: (perimeter_inches / Decimal::from(12)).round_dp(3),
            source,
        }
    }

    pub fn is_measurable(&self) -> bool {
        self.perimeter_inches > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{MeasurementSource, PerimeterMeasurement};

    #[test]
    fn linear_feet_are_derived_from_inches() {
        let measurement =
            PerimeterMeasurement::from_inches(Decimal::new(150_1234, 4), MeasurementSource::Drawings);
        assert_eq!(measurement.perimeter_inches, Decimal::new(150_123, 3));
        assert_eq!(measurement.perimeter_lf, Decimal::new(12_510, 3));
        assert!(measurement.is_measurable());
    }
}
