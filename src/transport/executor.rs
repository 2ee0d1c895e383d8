//! Transport executor.
//!
//! # Responsibilities
//! - Issue the method-specific call on a borrowed connection
//! - Suspend the calling task until the call completes
//! - Treat a reported status of 0 as a timeout
//! - Classify raised failures, propagating only the fatal class

use tracing::{error, warn};

use crate::transport::error::{classify, Classified, FatalError, NetworkFailure};
use crate::transport::{ChunkSink, Connection, RawResponse, TransportParams};

/// Result of a call that did not raise a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed(RawResponse),
    NetworkFailure(NetworkFailure),
}

/// Issue one call on `connection` and classify the result.
///
/// Under load some transports report a finished call with status 0 instead
/// of raising a timeout; that case is returned as a timeout failure.
pub async fn execute<T: Connection>(
    connection: &mut T,
    params: &TransportParams,
    on_chunk: Option<&mut ChunkSink>,
) -> Result<Outcome, FatalError> {
    match connection.call(params, on_chunk).await {
        Ok(response) if response.status == 0 => {
            warn!(method = %params.method, "Transport reported status 0, treating as timeout");
            Ok(Outcome::NetworkFailure(NetworkFailure::timeout(
                "transport completed with status 0",
            )))
        }
        Ok(response) => Ok(Outcome::Completed(response)),
        Err(e) => match classify(e) {
            Classified::Network(failure) => {
                warn!(method = %params.method, error = %failure, "Network failure captured");
                Ok(Outcome::NetworkFailure(failure))
            }
            Classified::Fatal(fatal) => {
                error!(method = %params.method, error = %fatal, "Fatal transport error");
                Err(fatal)
            }
        },
    }
}
