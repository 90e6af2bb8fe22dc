use std::ptr;
use std::sync::Arc;

use cpx_host::{ErrorClass, HostRuntime, Session};

use crate::argset::ArgumentSet;
use crate::build_cache::CompiledProbe;
use crate::outcome::Outcome;

/// Calls the probe's wrapper with `args` in a fresh host session.
///
/// Never fails: marshalling problems, raised exceptions and protocol
/// violations of the native code all come back as `Outcome::Error`.
pub fn invoke(probe: &CompiledProbe, runtime: &Arc<HostRuntime>, args: &ArgumentSet) -> Outcome {
    let session = match Session::enter(Arc::clone(runtime)) {
        Ok(session) => session,
        Err(err) => return Outcome::Error(err),
    };
    let tuple = session.import(&args.to_tuple());
    let entry = probe.entry();

    // SAFETY: `entry` is the wrapper the module registered; it only touches
    // handles issued by `session` and the host function table.
    let result = unsafe { entry(ptr::null_mut(), tuple) };
    let pending = session.take_error();

    match (result.is_null(), pending) {
        (true, Some(err)) => Outcome::Error(err),
        (true, None) => Outcome::error(
            ErrorClass::SystemError,
            format!(
                "<built-in function {}> returned NULL without setting an exception",
                probe.name()
            ),
        ),
        (false, Some(err)) => {
            log::debug!("probe {} returned a value with {err} pending", probe.name());
            Outcome::error(
                ErrorClass::SystemError,
                format!(
                    "<built-in function {}> returned a result with an exception set",
                    probe.name()
                ),
            )
        }
        (false, None) => session.export(result).into(),
    }
}
