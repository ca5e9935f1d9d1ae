//! Action invoker port — calls an external action endpoint.

use std::future::Future;

use cadence_domain::error::CadenceError;

/// Posts a snapshot to an action endpoint.
pub trait ActionInvoker {
    /// POST `body` (JSON) to `url`.
    ///
    /// Any non-2xx status or transport failure is reported as
    /// [`CadenceError::ActionInvocation`].
    fn invoke(&self, url: &str, body: &str) -> impl Future<Output = Result<(), CadenceError>> + Send;
}
