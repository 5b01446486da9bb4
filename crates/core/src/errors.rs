use thiserror::Error;

use crate::domain::item::MechanismTrack;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown mechanism track `{0}`")]
    UnknownTrack(String),
    #[error("goal track {0:?} appears more than once")]
    DuplicateGoal(MechanismTrack),
    #[error("user profile must declare at least one skin type")]
    EmptySkinType,
    #[error("invalid weight for `{field}`: {value}")]
    InvalidWeight { field: String, value: String },
    #[error("no conversion rate for currency `{0}`")]
    UnknownCurrency(String),
    #[error("amount {amount} {currency} overflows when converted to the reference currency")]
    ConversionOverflow { amount: String, currency: String },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApplicationError {
    /// Stable class name used in structured command output.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(_) => "domain_contract",
            Self::Integration(_) => "integration",
            Self::Configuration(_) => "config_validation",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Domain(_) | Self::InvalidRequest(_) => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Integration(_) => "A recommendation dependency is unavailable. Please retry shortly.",
            Self::Configuration(_) => "An unexpected configuration error occurred.",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::item::MechanismTrack;
    use crate::errors::{ApplicationError, DomainError};

    #[test]
    fn domain_error_maps_to_contract_class() {
        let error = ApplicationError::from(DomainError::UnknownTrack("glow".to_owned()));

        assert_eq!(error.error_class(), "domain_contract");
        assert_eq!(
            error.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
        assert_eq!(error.to_string(), "unknown mechanism track `glow`");
    }

    #[test]
    fn duplicate_goal_message_names_track() {
        let error = DomainError::DuplicateGoal(MechanismTrack::Brightening);
        assert!(error.to_string().contains("Brightening"));
    }

    #[test]
    fn integration_error_has_retry_message() {
        let error = ApplicationError::Integration("index offline".to_owned());

        assert_eq!(error.error_class(), "integration");
        assert!(error.user_message().contains("retry"));
    }
}
