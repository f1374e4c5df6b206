use crate::core::basis::BasisError;
use crate::core::cluster::CatalogError;
use crate::core::symbols::SymbolError;
use crate::core::translation::TranslationError;
use thiserror::Error;

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed model: raised before the object becomes usable.
    Configuration,
    /// Corrupted internal state or a violated calling protocol.
    Consistency,
    /// Bad input to a single call; state is untouched.
    InvalidArgument,
    /// Misuse of the move protocol by the driver.
    Logic,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid cluster catalog: {source}")]
    Catalog {
        #[from]
        source: CatalogError,
    },

    #[error("Invalid translation table: {source}")]
    Translation {
        #[from]
        source: TranslationError,
    },

    #[error("Invalid basis functions: {source}")]
    Basis {
        #[from]
        source: BasisError,
    },

    #[error("Updater is not initialized; construction or the last ECI update failed")]
    NotInitialized,

    #[error(
        "There are no correlation functions corresponding to the cluster name(s) {given:?}. Available names: {available:?}"
    )]
    UnknownCluster {
        given: Vec<String>,
        available: Vec<String>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid symbol: {source}")]
    Symbol {
        #[from]
        source: SymbolError,
    },

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Logic error: {0}")]
    Logic(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_)
            | Self::Catalog { .. }
            | Self::Translation { .. }
            | Self::Basis { .. }
            | Self::UnknownCluster { .. } => ErrorKind::Configuration,
            Self::InvalidArgument(_) | Self::Symbol { .. } => ErrorKind::InvalidArgument,
            Self::Consistency(_) => ErrorKind::Consistency,
            Self::NotInitialized | Self::Logic(_) => ErrorKind::Logic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_error_taxonomy() {
        assert_eq!(
            EngineError::from(CatalogError::MalformedName("x".into())).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            EngineError::UnknownCluster {
                given: vec![],
                available: vec![]
            }
            .kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            EngineError::from(SymbolError::SiteOutOfRange { site: 9, len: 4 }).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            EngineError::Consistency("cycle".into()).kind(),
            ErrorKind::Consistency
        );
        assert_eq!(EngineError::NotInitialized.kind(), ErrorKind::Logic);
    }

    #[test]
    fn unknown_cluster_message_lists_available_names() {
        let err = EngineError::UnknownCluster {
            given: vec!["c2_x".into()],
            available: vec!["c1".into(), "c2_d0000_0".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("c2_x"));
        assert!(msg.contains("c2_d0000_0"));
    }
}
