use thiserror::Error;

/// An error code and message returned by the compute provider's API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Why a launch request failed.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Provider refused the request: {0}")]
    Provider(#[from] ProviderError),

    #[error("Couldn't reach the provider: {0}")]
    Transport(#[source] anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorCategory {
    /// Too many API calls.
    RequestLimitExceeded,
    /// No capacity left for this type in the market asked for.
    InsufficientCapacity,
    /// The spot ceiling undercuts the live market price.
    SpotPriceTooLow,
    /// The type can't be launched in this region at all.
    Unsupported,
    InvalidParameter,
    /// The request itself is malformed.
    MissingParameter,
    /// Unlimited burst credits aren't available for this type.
    CreditSpecificationUnsupported,
    Other,
    Transport,
}

/// What to do about a failed launch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    pub category: ProviderErrorCategory,
    /// Switching from spot to on-demand may help.
    pub should_fallback: bool,
    /// Repeating the same request after a pause may help.
    pub should_retry: bool,
    /// Giving up on this error means the run as a whole failed.
    pub is_fatal: bool,
}

impl ProviderErrorCategory {
    pub fn from_code(code: &str) -> Self {
        match code {
            "RequestLimitExceeded" | "Throttling" => Self::RequestLimitExceeded,
            "InsufficientInstanceCapacity" | "InsufficientCapacity" => Self::InsufficientCapacity,
            "SpotMaxPriceTooLow" => Self::SpotPriceTooLow,
            "Unsupported" | "UnsupportedOperation" => Self::Unsupported,
            "InvalidParameterValue" | "InvalidParameterCombination" => Self::InvalidParameter,
            "MissingParameter" => Self::MissingParameter,
            "InstanceCreditSpecification.NotSupported" => Self::CreditSpecificationUnsupported,
            _ => Self::Other,
        }
    }
}

pub fn classify(error: &LaunchError) -> Classification {
    use ProviderErrorCategory::*;

    let category = match error {
        LaunchError::Provider(e) => ProviderErrorCategory::from_code(&e.code),
        LaunchError::Transport(_) => Transport,
    };
    let (should_fallback, should_retry, is_fatal) = match category {
        RequestLimitExceeded | Other | Transport => (false, true, false),
        InsufficientCapacity | SpotPriceTooLow => (true, true, false),
        Unsupported => (false, false, false),
        InvalidParameter => (true, false, true),
        MissingParameter => (false, false, true),
        CreditSpecificationUnsupported => (false, true, false),
    };
    Classification {
        category,
        should_fallback,
        should_retry,
        is_fatal,
    }
}
