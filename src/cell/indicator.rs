use tracing::info;

/// Operator-facing status lamp codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSignal {
    /// Waiting for the workspace to be reset.
    Resetting,
    /// The selected pixel had no executable position.
    InvalidAction,
    Success,
    Failure,
    /// A learning pass is running.
    Learning,
}

/// Fire-and-forget status signaling. The core never consumes a response
/// and a broken lamp must not interrupt a run, so the call is infallible
/// by contract; implementations swallow and log their own transport
/// errors.
pub trait IndicatorLight: Send + Sync {
    fn signal(&mut self, signal: StatusSignal);
}

/// Default indicator: the status only goes to the log.
pub struct LogIndicator;

impl IndicatorLight for LogIndicator {
    fn signal(&mut self, signal: StatusSignal) {
        info!("Status signal: {:?}", signal);
    }
}

/// Indicator for tests and headless runs.
#[derive(Default)]
pub struct NullIndicator;

impl IndicatorLight for NullIndicator {
    fn signal(&mut self, _signal: StatusSignal) {}
}
