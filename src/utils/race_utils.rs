use chrono::{NaiveDate, NaiveTime};

use crate::models::error::MappingError;

pub fn parse_points(raw: &str) -> Result<f64, MappingError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p >= 0.0)
        .ok_or_else(|| MappingError::new("points", raw))
}

pub fn parse_position(raw: &str) -> Result<u32, MappingError> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| MappingError::new("position", raw))
}

pub fn parse_count(field: &'static str, raw: &str) -> Result<u32, MappingError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| MappingError::new(field, raw))
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, MappingError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| MappingError::new("date", raw))
}

/// Upstream times look like `14:00:00Z`; they are already UTC.
pub fn parse_time(raw: &str) -> Result<NaiveTime, MappingError> {
    let trimmed = raw.trim().trim_end_matches('Z');
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f"))
        .map_err(|_| MappingError::new("time", raw))
}

/// Uppercase full name used as the cross-provider matching key.
pub fn name_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

pub fn fold_diacritics(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => out.push('a'),
            'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => out.push('A'),
            'ç' | 'ć' | 'č' => out.push('c'),
            'Ç' | 'Ć' | 'Č' => out.push('C'),
            'è' | 'é' | 'ê' | 'ë' | 'ě' => out.push('e'),
            'È' | 'É' | 'Ê' | 'Ë' | 'Ě' => out.push('E'),
            'ì' | 'í' | 'î' | 'ï' => out.push('i'),
            'Ì' | 'Í' | 'Î' | 'Ï' => out.push('I'),
            'ñ' | 'ń' => out.push('n'),
            'Ñ' | 'Ń' => out.push('N'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => out.push('o'),
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' => out.push('O'),
            'ù' | 'ú' | 'û' | 'ü' | 'ů' => out.push('u'),
            'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ů' => out.push('U'),
            'ý' | 'ÿ' => out.push('y'),
            'Ý' => out.push('Y'),
            'š' | 'ś' => out.push('s'),
            'Š' | 'Ś' => out.push('S'),
            'ž' | 'ź' | 'ż' => out.push('z'),
            'Ž' | 'Ź' | 'Ż' => out.push('Z'),
            'ř' => out.push('r'),
            'Ř' => out.push('R'),
            'ł' => out.push('l'),
            'Ł' => out.push('L'),
            'ß' => out.push_str("ss"),
            _ => out.push(c),
        }
    }
    out
}

/// Lowercase `snake_case` id in the style of the historical provider,
/// e.g. `"Oliver BEARMAN"` becomes `oliver_bearman`.
pub fn slugify(name: &str) -> String {
    let folded = fold_diacritics(name).to_lowercase();
    let mut slug = String::with_capacity(folded.len());
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}
