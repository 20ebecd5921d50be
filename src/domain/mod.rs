use crate::error::ValidationError;
use std::fmt;
use std::str::FromStr;

pub const MIN_LABEL_LEN: usize = 3;
pub const MAX_LABEL_LEN: usize = 63;

/// Argentine second-level zones served by the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Zone {
    Ar,
    #[default]
    ComAr,
    NetAr,
    OrgAr,
    GobAr,
    MilAr,
    IntAr,
    TurAr,
    MusicaAr,
    CoopAr,
    MutualAr,
    BetAr,
    SegAr,
    SenasaAr,
}

impl Zone {
    pub const ALL: [Zone; 14] = [
        Zone::Ar,
        Zone::ComAr,
        Zone::NetAr,
        Zone::OrgAr,
        Zone::GobAr,
        Zone::MilAr,
        Zone::IntAr,
        Zone::TurAr,
        Zone::MusicaAr,
        Zone::CoopAr,
        Zone::MutualAr,
        Zone::BetAr,
        Zone::SegAr,
        Zone::SenasaAr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Ar => ".ar",
            Zone::ComAr => ".com.ar",
            Zone::NetAr => ".net.ar",
            Zone::OrgAr => ".org.ar",
            Zone::GobAr => ".gob.ar",
            Zone::MilAr => ".mil.ar",
            Zone::IntAr => ".int.ar",
            Zone::TurAr => ".tur.ar",
            Zone::MusicaAr => ".musica.ar",
            Zone::CoopAr => ".coop.ar",
            Zone::MutualAr => ".mutual.ar",
            Zone::BetAr => ".bet.ar",
            Zone::SegAr => ".seg.ar",
            Zone::SenasaAr => ".senasa.ar",
        }
    }

    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(Zone::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Finds the longest zone `input` ends with, so `x.com.ar` resolves to
    /// `.com.ar` rather than `.ar`.
    fn detect_suffix(input: &str) -> Option<Zone> {
        Self::ALL
            .iter()
            .filter(|zone| input.ends_with(zone.as_str()))
            .max_by_key(|zone| zone.as_str().len())
            .copied()
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = ValidationError;

    /// Accepts the zone with or without its leading dot, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_lowercase();
        let dotted = if trimmed.starts_with('.') {
            trimmed
        } else {
            format!(".{}", trimmed)
        };

        Self::ALL
            .iter()
            .find(|zone| zone.as_str() == dotted)
            .copied()
            .ok_or_else(|| ValidationError::UnsupportedZone {
                zone: s.trim().to_string(),
                supported: Self::supported_list(),
            })
    }
}

/// Normalized lookup target: lower-cased label plus its zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainKey {
    label: String,
    zone: Zone,
}

impl DomainKey {
    /// Builds a key from caller input.
    ///
    /// A zone suffix inside `raw` is split off; otherwise `explicit_zone`
    /// applies, falling back to `.com.ar`. An explicit zone is always
    /// validated, but a suffix detected in `raw` wins when both are present.
    pub fn normalize(raw: &str, explicit_zone: Option<&str>) -> Result<Self, ValidationError> {
        let input = raw.trim().trim_end_matches('.').to_lowercase();

        let explicit = explicit_zone
            .filter(|z| !z.trim().is_empty())
            .map(Zone::from_str)
            .transpose()?;

        let (label, zone) = match (Zone::detect_suffix(&input), explicit) {
            (Some(detected), explicit) => {
                if let Some(explicit) = explicit.filter(|z| *z != detected) {
                    tracing::warn!(
                        "Zone detected in '{}' ({}) differs from requested zone ({}); using detected zone",
                        input,
                        detected,
                        explicit
                    );
                }
                let label = &input[..input.len() - detected.as_str().len()];
                (label.to_string(), detected)
            }
            (None, Some(explicit)) => (input, explicit),
            (None, None) => (input, Zone::default()),
        };

        validate_label(&label)?;
        Ok(Self { label, zone })
    }

    pub fn new(label: &str, zone: Zone) -> Result<Self, ValidationError> {
        let label = label.trim().to_lowercase();
        validate_label(&label)?;
        Ok(Self { label, zone })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }
}

impl fmt::Display for DomainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.label, self.zone)
    }
}

fn validate_label(label: &str) -> Result<(), ValidationError> {
    if label.is_empty() {
        return Err(ValidationError::EmptyLabel);
    }

    let len = label.chars().count();
    if len < MIN_LABEL_LEN {
        return Err(ValidationError::LabelTooShort {
            label: label.to_string(),
            min: MIN_LABEL_LEN,
        });
    }
    if len > MAX_LABEL_LEN {
        return Err(ValidationError::LabelTooLong {
            label: label.to_string(),
            max: MAX_LABEL_LEN,
        });
    }

    // IDN labels (ñ, á, ...) are accepted; dots would mean a subdomain.
    let valid_chars = label.chars().all(|c| c.is_alphanumeric() || c == '-');
    if !valid_chars || label.starts_with('-') || label.ends_with('-') {
        return Err(ValidationError::InvalidLabel(label.to_string()));
    }

    Ok(())
}
