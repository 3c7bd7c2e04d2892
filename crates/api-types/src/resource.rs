//! Resource-quantity arithmetic
//!
//! Kubernetes serializes resource quantities as strings (`2`, `500Mi`,
//! `100m`). This module parses them into milli-units so requested and
//! available capacity can be compared and summed without losing the `m`
//! suffix granularity used by CPU-style resources.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use thiserror::Error;

/// Named resource amounts, as found in pod specs and ElasticQuota objects.
pub type ResourceList = BTreeMap<String, Quantity>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("invalid quantity {0:?}")]
    Invalid(String),

    #[error("unsupported suffix {suffix:?} in quantity {value:?}")]
    UnsupportedSuffix { value: String, suffix: String },
}

/// Parse a quantity into milli-units: `1` -> 1000, `100m` -> 100,
/// `1Ki` -> 1_024_000.
pub fn parse_quantity(quantity: &Quantity) -> Result<i64, QuantityError> {
    let value = quantity.0.trim();
    if value.is_empty() {
        return Err(QuantityError::Invalid(quantity.0.clone()));
    }

    let split = value
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(value.len());
    let (numeric, suffix) = value.split_at(split);

    let numeric: f64 = numeric
        .parse()
        .map_err(|_| QuantityError::Invalid(quantity.0.clone()))?;

    // Milli-scaled multiplier for each suffix.
    let multiplier: f64 = match suffix {
        "" => 1000.0,
        "m" => 1.0,
        "k" => 1000.0 * 1000.0,
        "M" => 1000.0 * 1000.0 * 1000.0,
        "G" => 1000.0 * 1000.0 * 1000.0 * 1000.0,
        "T" => 1000.0 * 1000.0 * 1000.0 * 1000.0 * 1000.0,
        "Ki" => 1000.0 * 1024.0,
        "Mi" => 1000.0 * 1024.0 * 1024.0,
        "Gi" => 1000.0 * 1024.0 * 1024.0 * 1024.0,
        "Ti" => 1000.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => {
            return Err(QuantityError::UnsupportedSuffix {
                value: quantity.0.clone(),
                suffix: suffix.to_string(),
            })
        }
    };

    Ok((numeric * multiplier) as i64)
}

/// Parse a quantity that counts whole items (GPUs, MIG profile instances).
/// Fractional or negative values are rejected.
pub fn parse_count(quantity: &Quantity) -> Result<u64, QuantityError> {
    let millis = parse_quantity(quantity)?;
    if millis < 0 || millis % 1000 != 0 {
        return Err(QuantityError::Invalid(quantity.0.clone()));
    }
    Ok((millis / 1000) as u64)
}

/// Render milli-units back into a quantity string: whole values render plain,
/// everything else keeps the `m` suffix.
pub fn format_millis(millis: i64) -> Quantity {
    if millis % 1000 == 0 {
        Quantity((millis / 1000).to_string())
    } else {
        Quantity(format!("{millis}m"))
    }
}

/// Sum `addend` into `acc` resource by resource.
pub fn add(acc: &mut ResourceList, addend: &ResourceList) -> Result<(), QuantityError> {
    for (name, quantity) in addend {
        let millis = parse_quantity(quantity)?;
        let current = match acc.get(name) {
            Some(q) => parse_quantity(q)?,
            None => 0,
        };
        acc.insert(name.clone(), format_millis(current + millis));
    }
    Ok(())
}

/// Subtract `sub` from `base` resource by resource, flooring at zero.
pub fn saturating_sub(base: &ResourceList, sub: &ResourceList) -> Result<ResourceList, QuantityError> {
    let mut out = ResourceList::new();
    for (name, quantity) in base {
        let mut millis = parse_quantity(quantity)?;
        if let Some(q) = sub.get(name) {
            millis = (millis - parse_quantity(q)?).max(0);
        }
        out.insert(name.clone(), format_millis(millis));
    }
    Ok(out)
}

/// True when every resource in `request` is available in `capacity`.
/// Resources absent from `capacity` have zero availability.
pub fn fits_within(request: &ResourceList, capacity: &ResourceList) -> Result<bool, QuantityError> {
    for (name, quantity) in request {
        let requested = parse_quantity(quantity)?;
        let available = match capacity.get(name) {
            Some(q) => parse_quantity(q)?,
            None => 0,
        };
        if requested > available {
            return Ok(false);
        }
    }
    Ok(true)
}
