use std::fmt;
use std::str::FromStr;

use crate::{GeoError, LatLon, StatusOr};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    fn limit(self) -> f64 {
        match self {
            Axis::Latitude => 90.0,
            Axis::Longitude => 180.0,
        }
    }

    fn hemispheres(self) -> (char, char) {
        match self {
            Axis::Latitude => ('N', 'S'),
            Axis::Longitude => ('E', 'W'),
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Latitude => write!(f, "latitude"),
            Axis::Longitude => write!(f, "longitude"),
        }
    }
}

fn parse_error(input: &str, reason: impl Into<String>) -> GeoError {
    GeoError::Parse {
        input: input.to_string(),
        reason: reason.into(),
    }
}

/// Strips a leading or trailing hemisphere letter. Returns true for S or W.
fn take_hemisphere<'a>(input: &str, text: &'a str, axis: Axis) -> StatusOr<(&'a str, bool)> {
    let (positive, negative) = axis.hemispheres();
    let first = text.chars().next();
    let last = text.chars().last();

    let (letter, rest) = match (first, last) {
        (Some(c), _) if c.is_ascii_alphabetic() => (Some(c), &text[c.len_utf8()..]),
        (_, Some(c)) if c.is_ascii_alphabetic() => (Some(c), &text[..text.len() - c.len_utf8()]),
        _ => (None, text),
    };

    match letter.map(|c| c.to_ascii_uppercase()) {
        None => Ok((rest, false)),
        Some(c) if c == positive => Ok((rest, false)),
        Some(c) if c == negative => Ok((rest, true)),
        Some(c) => Err(parse_error(input, format!("'{}' is not a {} hemisphere", c, axis))),
    }
}

/// Parses decimal degrees or degrees/minutes/seconds into signed decimal degrees.
///
/// Accepted forms include `-122.3321`, `122.3321W`, `W122.3321`,
/// `47°36'22.3"N`, `47 36 22.3 N` and `47:36:22.3N`.
pub fn parse_coordinate(text: &str, axis: Axis) -> StatusOr<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(parse_error(text, "empty coordinate"));
    }

    let (body, southern_or_western) = take_hemisphere(text, trimmed, axis)?;
    let cleaned: String = body
        .chars()
        .map(|c| match c {
            '°' | '\'' | '"' | '′' | '″' | ':' | 'º' => ' ',
            other => other,
        })
        .collect();

    let parts = cleaned
        .split_whitespace()
        .map(|part| {
            part.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| parse_error(text, format!("'{}' is not a number", part)))
        })
        .collect::<StatusOr<Vec<f64>>>()?;

    let (degrees, minutes, seconds) = match parts.as_slice() {
        [d] => (*d, 0.0, 0.0),
        [d, m] => (*d, *m, 0.0),
        [d, m, s] => (*d, *m, *s),
        [] => return Err(parse_error(text, "no degrees")),
        _ => return Err(parse_error(text, "too many components")),
    };

    if parts.len() > 1 && degrees.fract() != 0.0 {
        return Err(parse_error(text, "fractional degrees cannot carry minutes"));
    }
    if parts.len() > 2 && minutes.fract() != 0.0 {
        return Err(parse_error(text, "fractional minutes cannot carry seconds"));
    }
    if !(0.0..60.0).contains(&minutes) || !(0.0..60.0).contains(&seconds) {
        return Err(parse_error(text, "minutes and seconds must be in [0, 60)"));
    }

    let negative_sign = degrees.is_sign_negative();
    if negative_sign && southern_or_western {
        return Err(parse_error(text, "both a minus sign and a hemisphere letter"));
    }

    let magnitude = degrees.abs() + minutes / 60.0 + seconds / 3600.0;
    let value = if negative_sign || southern_or_western {
        -magnitude
    } else {
        magnitude
    };

    if value.abs() > axis.limit() {
        return Err(parse_error(
            text,
            format!("{} must be within ±{}", axis, axis.limit()),
        ));
    }
    Ok(value)
}

pub fn parse_lat_lon(lat: &str, lon: &str) -> StatusOr<LatLon> {
    Ok(LatLon {
        lat: parse_coordinate(lat, Axis::Latitude)?,
        lon: parse_coordinate(lon, Axis::Longitude)?,
    })
}

impl FromStr for LatLon {
    type Err = GeoError;

    /// Parses `"lat,lon"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(',') {
            Some((lat, lon)) => parse_lat_lon(lat, lon),
            None => Err(parse_error(s, "expected 'lat,lon'")),
        }
    }
}
