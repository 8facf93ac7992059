//! Geographic coordinates in free-text descriptions
//!
//! Dataset descriptions mention sampling sites in whatever notation the
//! author liked. Each supported notation has its own parser; every parser
//! runs over the whole text and the results are pooled, de-duplicated and
//! sorted. Range checking is left to the document builder.

use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::debug;

/// A point in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatePair {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
}

impl CoordinatePair {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation: 0.0,
        }
    }

    /// Latitude within ±90 and longitude within ±180
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// `deg + min/60 + sec/3600`, negative for S and W
pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64, direction: char) -> f64 {
    let decimal = degrees + minutes / 60.0 + seconds / 3600.0;
    signed(decimal, direction)
}

/// `deg + min/60`, negative for S and W
pub fn dm_to_decimal(degrees: f64, minutes: f64, direction: char) -> f64 {
    signed(degrees + minutes / 60.0, direction)
}

fn signed(value: f64, direction: char) -> f64 {
    match direction {
        'S' | 'W' => -value,
        _ => value,
    }
}

#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("coordinate pattern is valid")
}

// 8.994410°, -79.543000°
static DECIMAL_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?:^|[^\w.+-])([+-]?\d+(?:\.\d+)?)°?\s*,\s*([+-]?\d+(?:\.\d+)?)°?\b")
});

// 8.910718°N, -79.528919°  (longitude direction optional)
static DECIMAL_CARDINAL: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?:^|[^\w.+-])([+-]?\d+(?:\.\d+)?)°?\s*([NS]),\s*([+-]?\d+(?:\.\d+)?)°?\s*([EW])?\b")
});

// 7° 38.422'N, 81° 42.079'W
static DEGREES_MINUTES: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b(\d+)°\s*(\d+(?:\.\d+)?)'?\s*([NS]),\s*(\d+)°\s*(\d+(?:\.\d+)?)'?\s*([EW])\b")
});

// 9°9'42.36"N, 79°50'15.67"W
static DEGREES_MINUTES_SECONDS: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r#"\b(\d+)°\s*(\d+)'\s*(\d+(?:\.\d+)?)"?\s*([NS]),\s*(\d+)°\s*(\d+)'\s*(\d+(?:\.\d+)?)"?\s*([EW])\b"#,
    )
});

// 0°41′ S latitude, 76°24′ W longitude
static PROSE_DEGREES_MINUTES: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b(\d+)°\s*(\d+)′\s*([NS])\s*latitude,\s*(\d+)°\s*(\d+)′\s*([EW])\s*longitude\b")
});

// 8° 38.743'N    79° 2.887'W
static SPACED_DEGREES_MINUTES: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b(\d+)°\s*(\d+(?:\.\d+)?)'?\s*([NS])\s+(\d+)°\s*(\d+(?:\.\d+)?)'?\s*([EW])\b")
});

// Location: 7.69633 -81.61603
static LOCATION_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\bLocation:\s*([+-]?\d+(?:\.\d+)?)\s+([+-]?\d+(?:\.\d+)?)\b")
});

/// One way of writing a coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notation {
    DecimalPair,
    DecimalCardinal,
    DegreesMinutes,
    DegreesMinutesSeconds,
    ProseDegreesMinutes,
    SpacedDegreesMinutes,
    LocationPrefix,
}

impl Notation {
    /// Every notation, in the order they are tried
    pub const ALL: [Notation; 7] = [
        Notation::DecimalPair,
        Notation::DecimalCardinal,
        Notation::DegreesMinutes,
        Notation::DegreesMinutesSeconds,
        Notation::ProseDegreesMinutes,
        Notation::SpacedDegreesMinutes,
        Notation::LocationPrefix,
    ];

    fn pattern(self) -> &'static Regex {
        match self {
            Notation::DecimalPair => &DECIMAL_PAIR,
            Notation::DecimalCardinal => &DECIMAL_CARDINAL,
            Notation::DegreesMinutes => &DEGREES_MINUTES,
            Notation::DegreesMinutesSeconds => &DEGREES_MINUTES_SECONDS,
            Notation::ProseDegreesMinutes => &PROSE_DEGREES_MINUTES,
            Notation::SpacedDegreesMinutes => &SPACED_DEGREES_MINUTES,
            Notation::LocationPrefix => &LOCATION_PREFIX,
        }
    }

    /// Every pair written in this notation, in text order
    pub fn extract(self, text: &str) -> Vec<CoordinatePair> {
        self.pattern()
            .captures_iter(text)
            .filter_map(|caps| {
                let pair = self.convert(&caps);
                debug!(notation = ?self, matched = &caps[0], ?pair, "Coordinate match");
                pair
            })
            .collect()
    }

    fn convert(self, caps: &Captures<'_>) -> Option<CoordinatePair> {
        let pair = match self {
            Notation::DecimalPair | Notation::LocationPrefix => {
                CoordinatePair::new(number(caps, 1)?, number(caps, 2)?)
            },
            Notation::DecimalCardinal => {
                let latitude = signed(number(caps, 1)?.abs(), direction(caps, 2)?);
                let longitude = match direction(caps, 4) {
                    Some(dir) => signed(number(caps, 3)?.abs(), dir),
                    None => number(caps, 3)?,
                };
                CoordinatePair::new(latitude, longitude)
            },
            Notation::DegreesMinutes | Notation::SpacedDegreesMinutes => CoordinatePair::new(
                dms_to_decimal(number(caps, 1)?, number(caps, 2)?, 0.0, direction(caps, 3)?),
                dms_to_decimal(number(caps, 4)?, number(caps, 5)?, 0.0, direction(caps, 6)?),
            ),
            Notation::DegreesMinutesSeconds => CoordinatePair::new(
                dms_to_decimal(
                    number(caps, 1)?,
                    number(caps, 2)?,
                    number(caps, 3)?,
                    direction(caps, 4)?,
                ),
                dms_to_decimal(
                    number(caps, 5)?,
                    number(caps, 6)?,
                    number(caps, 7)?,
                    direction(caps, 8)?,
                ),
            ),
            Notation::ProseDegreesMinutes => CoordinatePair::new(
                dm_to_decimal(number(caps, 1)?, number(caps, 2)?, direction(caps, 3)?),
                dm_to_decimal(number(caps, 4)?, number(caps, 5)?, direction(caps, 6)?),
            ),
        };
        Some(pair)
    }
}

fn number(caps: &Captures<'_>, group: usize) -> Option<f64> {
    caps.get(group)?.as_str().parse().ok()
}

fn direction(caps: &Captures<'_>, group: usize) -> Option<char> {
    caps.get(group)?.as_str().chars().next()
}

/// All coordinate pairs mentioned in `description`
///
/// Returns `None` when the text has neither a degree sign nor a
/// `Location:` marker. Otherwise the pairs of every notation are pooled,
/// exact duplicates removed and the rest sorted by latitude, then longitude.
pub fn get_lat_lon(description: &str) -> Option<Vec<CoordinatePair>> {
    if !description.contains('°') && !description.contains("Location:") {
        return None;
    }

    let mut pairs: Vec<CoordinatePair> = Notation::ALL
        .iter()
        .flat_map(|notation| notation.extract(description))
        .collect();

    pairs.sort_by(|a, b| {
        a.latitude
            .total_cmp(&b.latitude)
            .then(a.longitude.total_cmp(&b.longitude))
    });
    pairs.dedup();

    debug!(count = pairs.len(), "Extracted coordinate pairs");
    Some(pairs)
}
