//! Delivery sectors and their altitude above sea level.
//!
//! The altitude column in the `sector` profile comes from this table, so the
//! entries must match the ones the scaler was fit on.

/// Sector name → altitude in metres.
const SECTOR_ALTITUDES: &[(&str, f64)] = &[
    ("centro", 3640.0),
    ("sopocachi", 3590.0),
    ("miraflores", 3600.0),
    ("san pedro", 3650.0),
    ("villa fatima", 3700.0),
    ("zona sur", 3250.0),
    ("calacoto", 3270.0),
    ("achumani", 3330.0),
    ("obrajes", 3350.0),
    ("el alto", 4050.0),
];

/// Canonical form used for lookups and one-hot encoding.
///
/// Lowercases, trims and folds the Spanish diacritics (á é í ó ú ü ñ) to
/// ASCII. Other accented letters are kept as-is, so table entries must be
/// plain ASCII for lookups to match.
pub fn normalize_sector(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' => 'a',
            'é' | 'è' => 'e',
            'í' | 'ì' => 'i',
            'ó' | 'ò' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Altitude for a sector, or `None` when the sector is not served.
pub fn altitude_for(sector: &str) -> Option<f64> {
    let key = normalize_sector(sector);
    SECTOR_ALTITUDES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, alt)| *alt)
}

/// All known sector names, in table order.
pub fn known_sectors() -> impl Iterator<Item = &'static str> {
    SECTOR_ALTITUDES.iter().map(|(name, _)| *name)
}
