//! Small dimensional type system for shopping-list math. Units belong to
//! exactly one dimension; conversion is only defined within a dimension and
//! never falls back to a numeric default.

/// A unit-conversion family. No conversion exists between families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Mass,
    Volume,
    Count,
}

/// Discrete-count unit spellings. All denote "one item" regardless of label
/// and are mutually convertible 1:1.
const COUNT_UNITS: &[&str] = &[
    "piece", "pieces", "pc", "pcs", "unit", "units", "pack", "packs", "bunch", "bunches", "個",
    "本", "枚", "束", "パック", "袋",
];

/// Classify a unit string, returning its dimension and the factor to the
/// dimension's base unit (g for mass, ml for volume, 1 for count).
#[must_use]
pub fn dimension_of(unit: &str) -> Option<(Dimension, f64)> {
    let lower = unit.trim().to_lowercase();
    match lower.as_str() {
        "g" | "gram" | "grams" => Some((Dimension::Mass, 1.0)),
        "kg" | "kilogram" | "kilograms" => Some((Dimension::Mass, 1000.0)),
        "ml" | "milliliter" | "milliliters" | "millilitre" | "millilitres" => {
            Some((Dimension::Volume, 1.0))
        }
        "l" | "liter" | "liters" | "litre" | "litres" => Some((Dimension::Volume, 1000.0)),
        _ if COUNT_UNITS.contains(&lower.as_str()) => Some((Dimension::Count, 1.0)),
        _ => None,
    }
}

/// Convert `amount` from one unit to another.
///
/// Identical units pass the amount through unchanged. Otherwise a value is
/// returned if and only if both units share a dimension: mass and volume
/// scale through the dimension's base unit and round to 3 decimals, count
/// conversions are identity. Unknown units and cross-dimension pairs yield
/// `None`.
#[must_use]
pub fn convert(amount: f64, from: &str, to: &str) -> Option<f64> {
    let from_key = from.trim().to_lowercase();
    let to_key = to.trim().to_lowercase();
    if from_key == to_key {
        return Some(amount);
    }

    let (from_dim, from_factor) = dimension_of(&from_key)?;
    let (to_dim, to_factor) = dimension_of(&to_key)?;
    if from_dim != to_dim {
        return None;
    }

    match from_dim {
        // "piece" and "個" both mean one item; relabeling changes nothing.
        Dimension::Count => Some(amount),
        Dimension::Mass | Dimension::Volume => {
            Some(round3(amount * from_factor / to_factor))
        }
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
