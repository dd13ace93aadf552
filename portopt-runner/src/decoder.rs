//! Classifying a finished process into a typed result or a failure.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::GatewayError;
use crate::invoker::ProcessOutput;

/// Decode `output` into `T`.
///
/// - exit 0: stdout must deserialize into `T`, else `MalformedSuccess`.
///   stderr is ignored.
/// - any other exit (or a signal): `Computation` with the code, the stderr
///   text and, if stdout is a JSON object with an `error` string, that
///   message.
pub fn decode<T: DeserializeOwned>(output: &ProcessOutput) -> Result<T, GatewayError> {
    if !output.success() {
        return Err(GatewayError::Computation {
            code: output.code,
            stderr: output.stderr.clone(),
            reported: reported_error(&output.stdout),
        });
    }

    if !output.stderr.trim().is_empty() {
        debug!(stderr = %output.stderr.trim_end(), "external process stderr on success");
    }

    let body = output.stdout.trim();
    if body.is_empty() {
        return Err(GatewayError::MalformedSuccess {
            reason: "empty stdout".into(),
            stdout_len: output.stdout.len(),
        });
    }

    serde_json::from_str(body).map_err(|e| GatewayError::MalformedSuccess {
        reason: e.to_string(),
        stdout_len: output.stdout.len(),
    })
}

/// The `error` field the external script prints on failure, if present.
fn reported_error(stdout: &str) -> Option<String> {
    let value: Value = serde_json::from_str(stdout.trim()).ok()?;
    match value.get("error")? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portopt_core::domain::{MarketData, OptimizationResult};

    fn output(code: Option<i32>, stdout: &str, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    #[test]
    fn zero_exit_with_broken_json_is_malformed_success() {
        let err = decode::<MarketData>(&output(Some(0), "{not json", "")).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedSuccess { stdout_len: 9, .. }));
    }

    #[test]
    fn non_zero_exit_is_computation_failure_regardless_of_stdout() {
        for stdout in ["", "{\"allocation\":{}}", "garbage"] {
            let err = decode::<MarketData>(&output(Some(1), stdout, "boom")).unwrap_err();
            match err {
                GatewayError::Computation { code, stderr, .. } => {
                    assert_eq!(code, Some(1));
                    assert_eq!(stderr, "boom");
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn reported_error_is_extracted_from_stdout() {
        let err = decode::<MarketData>(&output(
            Some(1),
            r#"{"error": "No data for symbol XYZ"}"#,
            "Traceback ...",
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Computation { reported: Some(ref m), .. } if m == "No data for symbol XYZ"
        ));
    }

    #[test]
    fn stderr_noise_does_not_fail_success() {
        let data: MarketData = decode(&output(
            Some(0),
            "{\"symbol\":\"AAPL\",\"currentPrice\":190.5}\n",
            "WARNING: falling back to cached prices\n",
        ))
        .unwrap();
        assert_eq!(data.get("symbol").and_then(|v| v.as_str()), Some("AAPL"));
    }

    #[test]
    fn optimization_result_missing_required_field_is_malformed() {
        let err = decode::<OptimizationResult>(&output(
            Some(0),
            r#"{"allocation":{"AAPL":1.0},"expectedReturn":8.1}"#,
            "",
        ))
        .unwrap_err();
        assert!(matches!(err, GatewayError::MalformedSuccess { .. }));
    }

    #[test]
    fn weights_are_not_checked() {
        let result: OptimizationResult = decode(&output(
            Some(0),
            r#"{"allocation":{"AAPL":0.9,"MSFT":0.9},"expectedReturn":8.1,"expectedRisk":12.0}"#,
            "",
        ))
        .unwrap();
        assert_eq!(result.weight("MSFT"), Some(0.9));
    }

    #[test]
    fn signal_termination_is_computation_failure() {
        let err = decode::<MarketData>(&output(None, "", "")).unwrap_err();
        assert!(matches!(err, GatewayError::Computation { code: None, .. }));
    }
}
