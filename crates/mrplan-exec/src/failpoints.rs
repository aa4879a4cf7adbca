//! Named failpoints (feature: `failpoints`).
//!
//! With the feature enabled, a point fails when its name appears in the
//! comma-separated `MRPLAN_FAILPOINTS` environment variable. Without the
//! feature every point passes.

use mrplan_core::error::ExecError;

pub const FAILPOINTS_ENV: &str = "MRPLAN_FAILPOINTS";

/// Code carried by errors raised from a failpoint.
pub const FAILPOINT_CODE: u32 = 9999;

#[cfg(feature = "failpoints")]
pub fn check(name: &str) -> Result<(), ExecError> {
    use mrplan_core::error::ErrorSource;

    let armed = std::env::var(FAILPOINTS_ENV).unwrap_or_default();
    if armed.split(',').map(str::trim).any(|p| p == name) {
        tracing::warn!(failpoint = name, "failpoint triggered");
        return Err(ExecError::new(
            FAILPOINT_CODE,
            ErrorSource::Remote,
            format!("failpoint triggered: {name}"),
        ));
    }
    Ok(())
}

#[cfg(not(feature = "failpoints"))]
#[inline(always)]
pub fn check(_name: &str) -> Result<(), ExecError> {
    Ok(())
}
