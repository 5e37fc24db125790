use crate::entities::alert::{AlertCategory, AlertStatus};
use crate::entities::environmental_reading;
use chrono::NaiveDateTime;
use serde::Serialize;

/// Inclusive range; an absent side is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Bounds {
    pub const fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub const fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn is_below(&self, value: f64) -> bool {
        self.min.is_some_and(|min| value < min)
    }

    pub fn is_above(&self, value: f64) -> bool {
        self.max.is_some_and(|max| value > max)
    }

    pub fn contains(&self, value: f64) -> bool {
        !self.is_below(value) && !self.is_above(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    Temperature,
    Humidity,
    LightLevel,
}

impl Parameter {
    pub fn category(self) -> AlertCategory {
        match self {
            Parameter::Temperature => AlertCategory::Temperature,
            Parameter::Humidity => AlertCategory::Humidity,
            Parameter::LightLevel => AlertCategory::Light,
        }
    }

    pub fn read(self, m: &Measurements) -> f64 {
        match self {
            Parameter::Temperature => m.temperature,
            Parameter::Humidity => m.humidity,
            Parameter::LightLevel => m.light_level,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "temperature" => Some(Parameter::Temperature),
            "humidity" => Some(Parameter::Humidity),
            "light_level" | "lightLevel" | "light" => Some(Parameter::LightLevel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurements {
    pub temperature: f64,
    pub humidity: f64,
    pub light_level: f64,
}

impl From<&environmental_reading::Model> for Measurements {
    fn from(reading: &environmental_reading::Model) -> Self {
        Self {
            temperature: reading.temperature,
            humidity: reading.humidity,
            light_level: reading.light_level,
        }
    }
}

/// Safe operating ranges, checked in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdTable {
    rules: Vec<(Parameter, Bounds)>,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::new(vec![
            (Parameter::Temperature, Bounds::between(18.0, 26.0)),
            (Parameter::Humidity, Bounds::between(40.0, 70.0)),
            (Parameter::LightLevel, Bounds::at_least(20.0)),
        ])
    }
}

impl ThresholdTable {
    pub fn new(rules: Vec<(Parameter, Bounds)>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[(Parameter, Bounds)] {
        &self.rules
    }

    pub fn bounds(&self, parameter: Parameter) -> Option<Bounds> {
        self.rules
            .iter()
            .find(|(p, _)| *p == parameter)
            .map(|(_, b)| *b)
    }
}

/// An alert that has been decided on but not stored yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertCandidate {
    pub category: AlertCategory,
    pub value: f64,
    pub status: AlertStatus,
    pub triggered_at: NaiveDateTime,
}

/// One candidate per out-of-range parameter, in table order. Repeated
/// breaches across readings are not coalesced.
pub fn evaluate(
    table: &ThresholdTable,
    measurements: &Measurements,
    now: NaiveDateTime,
) -> Vec<AlertCandidate> {
    table
        .rules()
        .iter()
        .filter_map(|(parameter, bounds)| {
            let value = parameter.read(measurements);
            (!bounds.contains(value)).then(|| AlertCandidate {
                category: parameter.category(),
                value,
                status: AlertStatus::Active,
                triggered_at: now,
            })
        })
        .collect()
}

/// Equipment the farm should switch on given the latest reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Adjustments {
    pub ventilation: bool,
    pub heating: bool,
    pub cooling: bool,
    pub lighting: bool,
}

pub fn recommend_adjustments(table: &ThresholdTable, m: &Measurements) -> Adjustments {
    let mut adjustments = Adjustments::default();

    if let Some(bounds) = table.bounds(Parameter::Temperature) {
        if bounds.is_above(m.temperature) {
            adjustments.cooling = true;
            adjustments.ventilation = true;
        } else if bounds.is_below(m.temperature) {
            adjustments.heating = true;
        }
    }
    if let Some(bounds) = table.bounds(Parameter::Humidity) {
        if bounds.is_above(m.humidity) {
            adjustments.ventilation = true;
        }
    }
    if let Some(bounds) = table.bounds(Parameter::LightLevel) {
        if bounds.is_below(m.light_level) {
            adjustments.lighting = true;
        }
    }

    adjustments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn reading(temperature: f64, humidity: f64, light_level: f64) -> Measurements {
        Measurements {
            temperature,
            humidity,
            light_level,
        }
    }

    #[test]
    fn hot_reading_raises_only_temperature() {
        let alerts = evaluate(&ThresholdTable::default(), &reading(30.0, 50.0, 25.0), now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].category, AlertCategory::Temperature);
        assert_eq!(alerts[0].value, 30.0);
        assert_eq!(alerts[0].status, AlertStatus::Active);
        assert_eq!(alerts[0].triggered_at, now());
    }

    #[test]
    fn humid_and_dark_reading_keeps_declared_order() {
        let alerts = evaluate(&ThresholdTable::default(), &reading(22.0, 80.0, 10.0), now());
        let got: Vec<_> = alerts.iter().map(|a| (a.category, a.value)).collect();
        assert_eq!(
            got,
            vec![(AlertCategory::Humidity, 80.0), (AlertCategory::Light, 10.0)]
        );
    }

    #[test]
    fn every_temperature_outside_range_yields_one_alert() {
        let table = ThresholdTable::default();
        for t in [-5.0, 0.0, 17.9, 26.1, 30.0, 45.5] {
            let alerts = evaluate(&table, &reading(t, 55.0, 100.0), now());
            assert_eq!(alerts.len(), 1, "temperature {t}");
            assert_eq!(alerts[0].category, AlertCategory::Temperature);
            assert_eq!(alerts[0].value, t);
        }
    }

    #[test]
    fn bounds_are_inclusive() {
        let table = ThresholdTable::default();
        assert!(evaluate(&table, &reading(18.0, 40.0, 20.0), now()).is_empty());
        assert!(evaluate(&table, &reading(26.0, 70.0, 5000.0), now()).is_empty());
    }

    #[test]
    fn adjustments_follow_the_table() {
        let table = ThresholdTable::default();
        assert_eq!(
            recommend_adjustments(&table, &reading(28.0, 75.0, 10.0)),
            Adjustments {
                ventilation: true,
                heating: false,
                cooling: true,
                lighting: true,
            }
        );
        assert_eq!(
            recommend_adjustments(&table, &reading(15.0, 50.0, 40.0)),
            Adjustments {
                heating: true,
                ..Adjustments::default()
            }
        );
        assert_eq!(
            recommend_adjustments(&table, &reading(22.0, 50.0, 40.0)),
            Adjustments::default()
        );
    }

    #[test]
    fn parameter_names() {
        assert_eq!(Parameter::parse("light_level"), Some(Parameter::LightLevel));
        assert_eq!(Parameter::parse("lightLevel"), Some(Parameter::LightLevel));
        assert_eq!(Parameter::parse("pressure"), None);
    }
}
