use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum DistributionError {
    /// A record is missing a required field (product, region, quantity, ...).
    MissingField { table: String, line: usize, field: &'static str },
    /// A quantity, weight or year cell is not a valid number.
    InvalidQuantity { table: String, line: usize, value: String },
    /// Missing required column in input data.
    MissingColumn { table: String, column: String },
    /// CSV reader error (bad quoting, ragged rows, ...).
    Csv(String),
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad tolerance, missing columns, ...).
    ConfigValidation(String),
    /// The region filter left nothing to distribute over.
    EmptyUniverse { level: Option<u8>, country: Option<String> },
    /// Impedance matrix is not square or has unreadable labels.
    MalformedMatrix(String),
    /// No canonical name scored at or above the configured minimum similarity.
    AmbiguousMatch { label: String, best: Option<String>, score: f64, min_similarity: f64 },
}

impl DistributionError {
    /// Malformed input record. These abort a run immediately.
    pub fn is_data_error(&self) -> bool {
        matches!(self, Self::MissingField { .. } | Self::InvalidQuantity { .. })
    }
}

impl fmt::Display for DistributionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { table, line, field } => {
                write!(f, "{table}, line {line}: missing required field '{field}'")
            }
            Self::InvalidQuantity { table, line, value } => {
                write!(f, "{table}, line {line}: cannot parse numeric value '{value}'")
            }
            Self::MissingColumn { table, column } => {
                write!(f, "{table}: missing column '{column}'")
            }
            Self::Csv(msg) => write!(f, "CSV error: {msg}"),
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::EmptyUniverse { level, country } => {
                let level = level.map(|l| l.to_string()).unwrap_or_else(|| "any".into());
                let country = country.as_deref().unwrap_or("any");
                write!(f, "no regions left after filtering (level={level}, country={country})")
            }
            Self::MalformedMatrix(msg) => write!(f, "malformed impedance matrix: {msg}"),
            Self::AmbiguousMatch { label, best, score, min_similarity } => match best {
                Some(best) => write!(
                    f,
                    "label '{label}': best match '{best}' scores {score:.3}, below minimum {min_similarity:.3}"
                ),
                None => write!(f, "label '{label}': no candidate names to match against"),
            },
        }
    }
}

impl std::error::Error for DistributionError {}

impl From<csv::Error> for DistributionError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}
