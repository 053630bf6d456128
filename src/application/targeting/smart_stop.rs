use crate::domain::trading::types::Side;

/// Protective stop for a new position.
///
/// The low-volume area wins when it sits strictly between the structural swing and the entry,
/// otherwise the swing is used. Distances wider than `max_fraction` of entry are pulled in to the cap.
pub fn smart_stop(side: Side, entry: f64, lva: Option<f64>, swing: f64, max_fraction: f64) -> f64 {
    let lva_inside = lva.filter(|&l| match side {
        Side::Long => swing < l && l < entry,
        Side::Short => entry < l && l < swing,
    });

    let candidate = lva_inside.unwrap_or(swing);
    let cap = entry * max_fraction;

    if (entry - candidate).abs() > cap {
        entry - side.sign() * cap
    } else {
        candidate
    }
}
