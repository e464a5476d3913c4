//! Error conversion at crate boundaries.

/// Define a `From` conversion between two error types.
///
/// Transport adapters use this to turn library errors into the structured
/// failure type of the client without repeating `map_err` chains.
///
/// # Syntax
///
/// ```ignore
/// error_boundary!(SourceError => TargetError, |err_var| {
///     // conversion logic returning TargetError
/// });
/// ```
///
/// # Example
///
/// ```
/// use docstore_core::error_boundary;
///
/// #[derive(Debug, thiserror::Error)]
/// enum StoreError {
///     #[error("payload: {0}")]
///     Payload(String),
/// }
///
/// error_boundary!(serde_json::Error => StoreError, |e| {
///     StoreError::Payload(e.to_string())
/// });
///
/// fn decode(raw: &str) -> Result<serde_json::Value, StoreError> {
///     Ok(serde_json::from_str(raw)?)
/// }
///
/// assert!(decode("{").is_err());
/// ```
#[macro_export]
macro_rules! error_boundary {
    ($inner:ty => $outer:ty, |$err:ident| $body:expr) => {
        impl ::std::convert::From<$inner> for $outer {
            fn from($err: $inner) -> $outer {
                $body
            }
        }
    };
}

#[cfg(test)]
mod tests {
    #[derive(Debug, thiserror::Error, PartialEq)]
    enum TestError {
        #[error("Payload: {0}")]
        Payload(String),
        #[error("Parse: {0}")]
        Parse(String),
    }

    error_boundary!(serde_json::Error => TestError, |e| {
        TestError::Payload(e.to_string())
    });

    #[test]
    fn test_boundary_enables_question_mark() {
        fn decode(raw: &str) -> Result<serde_json::Value, TestError> {
            let value = serde_json::from_str(raw)?;
            Ok(value)
        }

        match decode("{\"id\":").unwrap_err() {
            TestError::Payload(msg) => assert!(msg.contains("EOF")),
            other => panic!("Expected Payload variant, got {other:?}"),
        }
        assert!(decode("{\"id\":\"a\"}").is_ok());
    }

    #[test]
    #[allow(non_local_definitions)]
    fn test_multiple_boundaries_for_one_target() {
        error_boundary!(std::num::ParseIntError => TestError, |e| {
            TestError::Parse(e.to_string())
        });

        fn parse_throughput(s: &str) -> Result<u32, TestError> {
            Ok(s.parse::<u32>()?)
        }

        assert_eq!(parse_throughput("400"), Ok(400));
        match parse_throughput("four hundred").unwrap_err() {
            TestError::Parse(msg) => assert!(msg.contains("invalid digit")),
            other => panic!("Expected Parse variant, got {other:?}"),
        }
    }
}
