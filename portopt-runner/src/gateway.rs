//! Named computations backed by the external scripts.
//!
//! Each operation runs the same protocol: shape the request, write it to a
//! fresh artifact, run `executable script artifact [extra args...]`, decode
//! stdout, and release the artifact on every exit path.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

use portopt_core::domain::{
    resolve_method, MarketData, MarketDataRequest, OptimizationRequest, OptimizationResult,
    SessionId,
};

use crate::config::GatewayConfig;
use crate::decoder::decode;
use crate::error::GatewayError;
use crate::exchange::ArtifactExchange;
use crate::invoker::{CancelFlag, InvokeOptions, ProcessInvoker, SystemInvoker};

pub struct Gateway {
    config: GatewayConfig,
    exchange: ArtifactExchange,
    invoker: Arc<dyn ProcessInvoker>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_invoker(config, Arc::new(SystemInvoker::new()))
    }

    pub fn with_invoker(config: GatewayConfig, invoker: Arc<dyn ProcessInvoker>) -> Self {
        let exchange = ArtifactExchange::new(config.work_dir());
        Self {
            config,
            exchange,
            invoker,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Fetch market data for `symbol` over `period`. Both are required.
    pub fn fetch_market_data(
        &self,
        symbol: &str,
        period: &str,
    ) -> Result<MarketData, GatewayError> {
        self.fetch_market_data_with_cancel(symbol, period, None)
    }

    pub fn fetch_market_data_with_cancel(
        &self,
        symbol: &str,
        period: &str,
        cancel: Option<CancelFlag>,
    ) -> Result<MarketData, GatewayError> {
        let _span = info_span!("fetch_market_data", symbol, period).entered();

        if symbol.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("symbol is empty".into()));
        }
        if period.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("period is empty".into()));
        }

        let payload = MarketDataRequest::new(symbol, period);
        self.invoke(
            "fetch",
            &self.config.fetch_script_path(),
            &payload,
            &[],
            cancel,
        )
    }

    /// Run the optimizer for `request`.
    ///
    /// `session` and the resolved method name (default `MPT`) are passed as
    /// positional arguments after the artifact path, not inside the payload.
    pub fn optimize_portfolio(
        &self,
        request: &OptimizationRequest,
        session: &SessionId,
        method: Option<&str>,
    ) -> Result<OptimizationResult, GatewayError> {
        self.optimize_portfolio_with_cancel(request, session, method, None)
    }

    pub fn optimize_portfolio_with_cancel(
        &self,
        request: &OptimizationRequest,
        session: &SessionId,
        method: Option<&str>,
        cancel: Option<CancelFlag>,
    ) -> Result<OptimizationResult, GatewayError> {
        let method = resolve_method(method);
        let _span =
            info_span!("optimize_portfolio", session = %session, method = %method).entered();

        let payload = request.shape();
        info!(
            stocks = payload.stocks.len(),
            total_investment = payload.total_investment,
            "optimization request shaped"
        );

        self.invoke(
            "optimize",
            &self.config.optimize_script_path(),
            &payload,
            &[session.to_string(), method],
            cancel,
        )
    }

    fn invoke<P, T>(
        &self,
        op: &str,
        script: &Path,
        payload: &P,
        extra_args: &[String],
        cancel: Option<CancelFlag>,
    ) -> Result<T, GatewayError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let artifact = self.exchange.write(op, payload)?;

        let mut args = Vec::with_capacity(extra_args.len() + 1);
        args.push(artifact.path().to_string_lossy().into_owned());
        args.extend_from_slice(extra_args);

        let opts = InvokeOptions::default()
            .with_timeout(self.config.timeout())
            .with_cancel(cancel);

        let outcome = self
            .invoker
            .run(&self.config.executable, script, &args, &opts)
            .and_then(|output| {
                info!(exit_code = ?output.code, "external process finished");
                debug!(stdout = %output.stdout.trim_end(), "external process stdout");
                if !output.stderr.is_empty() {
                    debug!(stderr = %output.stderr.trim_end(), "external process stderr");
                }
                decode(&output)
            });

        if let Err(e) = artifact.release() {
            warn!(error = %e, "failed to release request artifact");
        }

        if let Err(e) = &outcome {
            log_failure(op, e);
        }
        outcome
    }
}

fn log_failure(op: &str, err: &GatewayError) {
    match err {
        GatewayError::Computation {
            code,
            stderr,
            reported,
        } => error!(
            op,
            exit_code = ?code,
            reported = reported.as_deref().unwrap_or(""),
            stderr = %stderr.trim_end(),
            "external computation failed"
        ),
        GatewayError::MalformedSuccess { reason, stdout_len } => error!(
            op,
            reason = %reason,
            stdout_len,
            "external computation produced unusable output"
        ),
        other => error!(op, error = %other, configuration = other.is_configuration(), "gateway operation failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::ProcessOutput;
    use parking_lot::Mutex;
    use portopt_core::domain::HoldingInput;
    use std::path::PathBuf;

    /// Records each call and answers with a canned output.
    struct ScriptedInvoker {
        reply: Result<ProcessOutput, fn() -> GatewayError>,
        calls: Mutex<Vec<(String, PathBuf, Vec<String>, bool)>>,
    }

    impl ScriptedInvoker {
        fn replying(code: i32, stdout: &str) -> Self {
            Self {
                reply: Ok(ProcessOutput {
                    code: Some(code),
                    stdout: stdout.into(),
                    stderr: String::new(),
                }),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(err: fn() -> GatewayError) -> Self {
            Self {
                reply: Err(err),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ProcessInvoker for ScriptedInvoker {
        fn run(
            &self,
            executable: &str,
            script: &Path,
            args: &[String],
            _opts: &InvokeOptions,
        ) -> Result<ProcessOutput, GatewayError> {
            let artifact_exists = Path::new(&args[0]).exists();
            self.calls.lock().push((
                executable.to_string(),
                script.to_path_buf(),
                args.to_vec(),
                artifact_exists,
            ));
            match &self.reply {
                Ok(out) => Ok(out.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    fn gateway(dir: &Path, invoker: Arc<ScriptedInvoker>) -> Gateway {
        let config = GatewayConfig {
            executable: "python3".into(),
            script_dir: PathBuf::from("/scripts"),
            work_dir: Some(dir.to_path_buf()),
            ..GatewayConfig::default()
        };
        Gateway::with_invoker(config, invoker)
    }

    fn is_empty_dir(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn optimize_passes_session_and_method_positionally() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::replying(
            0,
            r#"{"allocation":{"AAPL":100.0},"expectedReturn":9.0,"expectedRisk":15.0}"#,
        ));
        let gw = gateway(dir.path(), Arc::clone(&invoker));

        let request = OptimizationRequest {
            stocks: vec![HoldingInput::new("AAPL")],
            ..OptimizationRequest::default()
        };
        let result = gw
            .optimize_portfolio(&request, &SessionId::from("sess-1"), Some("  "))
            .unwrap();
        assert_eq!(result.weight("AAPL"), Some(100.0));

        let calls = invoker.calls.lock();
        let (exe, script, args, existed) = &calls[0];
        assert_eq!(exe, "python3");
        assert_eq!(script, &PathBuf::from("/scripts/optimize_portfolio.py"));
        assert_eq!(args.len(), 3);
        assert!(args[0].contains("input_optimize_"));
        assert_eq!(args[1], "sess-1");
        assert_eq!(args[2], "MPT");
        assert!(existed, "artifact must exist while the process runs");
        assert!(is_empty_dir(dir.path()));
    }

    #[test]
    fn fetch_passes_only_the_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::replying(0, r#"{"symbol":"AAPL"}"#));
        let gw = gateway(dir.path(), Arc::clone(&invoker));

        gw.fetch_market_data("AAPL", "1d").unwrap();
        let calls = invoker.calls.lock();
        assert_eq!(calls[0].1, PathBuf::from("/scripts/fetch_stock_data.py"));
        assert_eq!(calls[0].2.len(), 1);
    }

    #[test]
    fn artifact_released_on_every_failure() {
        let dir = tempfile::tempdir().unwrap();
        let request = OptimizationRequest::default();
        let session = SessionId::from("s");

        let cases: Vec<Arc<ScriptedInvoker>> = vec![
            Arc::new(ScriptedInvoker::replying(1, "")),
            Arc::new(ScriptedInvoker::replying(0, "{not json")),
            Arc::new(ScriptedInvoker::failing(|| GatewayError::Spawn {
                program: "python3".into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })),
            Arc::new(ScriptedInvoker::failing(|| GatewayError::Timeout {
                after: std::time::Duration::from_secs(1),
            })),
        ];

        for invoker in cases {
            let gw = gateway(dir.path(), Arc::clone(&invoker));
            assert!(gw.optimize_portfolio(&request, &session, None).is_err());
            assert!(invoker.calls.lock()[0].3);
            assert!(is_empty_dir(dir.path()));
        }
    }

    #[test]
    fn blank_symbol_is_rejected_before_any_process_runs() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = Arc::new(ScriptedInvoker::replying(0, "{}"));
        let gw = gateway(dir.path(), Arc::clone(&invoker));
        assert!(matches!(
            gw.fetch_market_data(" ", "1d"),
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(invoker.calls.lock().is_empty());
    }
}
