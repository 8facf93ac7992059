//! Personal name splitting
//!
//! Names arrive as one free-text string. They are split into given and
//! family parts by three ordered rules:
//!
//! 1. `"Family, Given"`
//! 2. a family name with a lower-case particle, `"Michiel van Breugel"`
//! 3. the last whitespace token is the family name
//!
//! Parsing never fails. Anything short of both parts is logged and returned
//! as a partial result the caller has to handle explicitly.

use tracing::warn;

/// Particles that start a family name, tried in this order
pub const FAMILY_PARTICLES: &[&str] = &[
    " del ", " van ", " de ", " von ", " der ", " di ", " la ", " le ", " da ", " el ", " al ",
    " bin ",
];

/// Outcome of splitting a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedName {
    /// Both parts found
    Parsed { given: String, family: String },
    /// Only a family name could be found (single-token names)
    PartialFamily { family: String },
    /// Nothing usable
    Unparsed,
}

impl ParsedName {
    pub fn given(&self) -> Option<&str> {
        match self {
            ParsedName::Parsed { given, .. } => Some(given),
            _ => None,
        }
    }

    pub fn family(&self) -> Option<&str> {
        match self {
            ParsedName::Parsed { family, .. } | ParsedName::PartialFamily { family } => {
                Some(family)
            },
            ParsedName::Unparsed => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ParsedName::Parsed { .. })
    }

    fn from_parts(given: String, family: String) -> Self {
        match (given.is_empty(), family.is_empty()) {
            (false, false) => ParsedName::Parsed { given, family },
            (true, false) => ParsedName::PartialFamily { family },
            _ => ParsedName::Unparsed,
        }
    }
}

/// Split a full name, logging a warning when a part is missing
pub fn parse(fullname: &str) -> ParsedName {
    let collapsed = fullname.split_whitespace().collect::<Vec<_>>().join(" ");
    let parsed = split(&collapsed);
    if !parsed.is_complete() {
        warn!(
            name = fullname,
            given = ?parsed.given(),
            family = ?parsed.family(),
            "Could not fully parse personal name"
        );
    }
    parsed
}

/// Tuple form of [`parse`]
pub fn parse_name(fullname: &str) -> (Option<String>, Option<String>) {
    let parsed = parse(fullname);
    (
        parsed.given().map(str::to_string),
        parsed.family().map(str::to_string),
    )
}

fn split(name: &str) -> ParsedName {
    if let Some((family, given)) = name.split_once(", ") {
        return ParsedName::from_parts(title_case(given.trim()), title_case(family.trim()));
    }

    // ASCII lowering keeps byte offsets aligned with `name`
    let lowered = name.to_ascii_lowercase();
    for particle in FAMILY_PARTICLES {
        if let Some(idx) = lowered.find(particle) {
            let given = title_case(&name[..idx]);
            let remainder = title_case(&name[idx + particle.len()..]);
            let family = format!("{} {}", particle.trim(), remainder);
            return ParsedName::from_parts(given, family);
        }
    }

    let tokens: Vec<&str> = name.split(' ').filter(|t| !t.is_empty()).collect();
    match tokens.split_last() {
        Some((last, rest)) => ParsedName::from_parts(title_case(&rest.join(" ")), title_case(last)),
        None => ParsedName::Unparsed,
    }
}

/// Upper-case the first letter of every run of letters, lower-case the rest
///
/// "o'neil-smith" becomes "O'Neil-Smith".
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}
