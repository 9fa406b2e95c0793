//! Configuration errors raised at command-load time.
//!
//! These are programmer errors: a malformed argument list or a reserved
//! type-name collision is reported immediately and loudly when the owning
//! command is loaded, never swallowed at parse time.

/// Errors from argument-list and type-registry configuration.
#[derive(Debug, thiserror::Error)]
pub enum BanterError {
    #[error("type name is reserved: {0}")]
    ReservedType(String),

    #[error("duplicate argument id: {0}")]
    DuplicateArgument(String),

    #[error("argument '{0}' matches a flag but has no flag spellings")]
    MissingFlagSpelling(String),

    #[error("argument '{0}' has an empty literal alias group")]
    EmptyLiterals(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offender() {
        let err = BanterError::ReservedType("union".into());
        assert_eq!(err.to_string(), "type name is reserved: union");

        let err = BanterError::MissingFlagSpelling("verbose".into());
        assert!(err.to_string().contains("verbose"));
    }
}
