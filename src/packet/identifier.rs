//! Stream identifier
//!
//! The 4-tuple (network, station, channel, location_code) names a logical
//! data stream. Publishers are sloppy about casing and padding, so the
//! proxy canonicalizes identifiers on ingest: fields are trimmed and
//! uppercased, and an empty location code becomes `"--"`.

/// Identifies the logical stream a packet belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StreamIdentifier {
    /// Network code (e.g., "UU")
    pub network: String,
    /// Station code (e.g., "CWU")
    pub station: String,
    /// Channel code (e.g., "HHZ")
    pub channel: String,
    /// Location code (e.g., "01"); canonically "--" when unset
    pub location_code: String,
}

impl StreamIdentifier {
    /// Create a new identifier
    pub fn new(
        network: impl Into<String>,
        station: impl Into<String>,
        channel: impl Into<String>,
        location_code: impl Into<String>,
    ) -> Self {
        Self {
            network: network.into(),
            station: station.into(),
            channel: channel.into(),
            location_code: location_code.into(),
        }
    }

    /// Canonicalize all fields in place
    ///
    /// Trims surrounding whitespace, uppercases, and replaces an empty
    /// location code with `"--"`.
    pub fn normalize(&mut self) {
        self.network = normalize_field(&self.network);
        self.station = normalize_field(&self.station);
        self.channel = normalize_field(&self.channel);
        self.location_code = normalize_field(&self.location_code);
        if self.location_code.is_empty() {
            self.location_code = "--".to_string();
        }
    }

    /// Whether all mandatory fields are non-empty
    ///
    /// The location code is not mandatory; normalization substitutes "--".
    pub fn is_complete(&self) -> bool {
        !self.network.is_empty() && !self.station.is_empty() && !self.channel.is_empty()
    }
}

fn normalize_field(field: &str) -> String {
    field.trim().to_ascii_uppercase()
}

impl std::fmt::Display for StreamIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.channel, self.location_code
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_uppercases() {
        let mut id = StreamIdentifier::new("  uu ", "cwu", "hhz", " 01 ");
        id.normalize();

        assert_eq!(id.network, "UU");
        assert_eq!(id.station, "CWU");
        assert_eq!(id.channel, "HHZ");
        assert_eq!(id.location_code, "01");
    }

    #[test]
    fn test_normalize_empty_location_code() {
        let mut id = StreamIdentifier::new("uu", "cwu", "hhz", "");
        id.normalize();

        assert_eq!(id.location_code, "--");
    }

    #[test]
    fn test_normalize_whitespace_location_code() {
        let mut id = StreamIdentifier::new("UU", "CWU", "HHZ", "   ");
        id.normalize();

        assert_eq!(id.location_code, "--");
    }

    #[test]
    fn test_is_complete() {
        let id = StreamIdentifier::new("UU", "CWU", "HHZ", "01");
        assert!(id.is_complete());

        let mut missing = StreamIdentifier::new("  ", "CWU", "HHZ", "01");
        missing.normalize();
        assert!(!missing.is_complete());
    }

    #[test]
    fn test_display() {
        let id = StreamIdentifier::new("UU", "CWU", "HHZ", "01");
        assert_eq!(id.to_string(), "UU.CWU.HHZ.01");
    }
}
