use thiserror::Error;

type TypeName = &'static str;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Maximum recursion depth exceeded \"{0}\"")]
    RecursionError(u32),
    #[error("{}", message)]
    UserDefined { message: String },
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("Context must be an object, got {0}")]
    InvalidContext(TypeName),
    #[error("Value contains a cycle")]
    CyclicValue,
}

impl Error {
    /// Failure raised by a host callable.
    pub fn user_defined(message: impl Into<String>) -> Self {
        Error::UserDefined {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::recursion(Error::RecursionError(64), "Maximum recursion depth exceeded \"64\"")]
    #[case::user_defined(Error::user_defined("boom"), "boom")]
    #[case::runtime(Error::Runtime("bad input".to_string()), "Runtime error: bad input")]
    #[case::context(Error::InvalidContext("array"), "Context must be an object, got array")]
    fn test_display(#[case] error: Error, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }
}
