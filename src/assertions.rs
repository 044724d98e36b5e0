// SPDX-License-Identifier: Apache-2.0

//! Assertion extensions. [`install`] wires two capabilities into the
//! process, once, before any test runs: promise-aware assertions that await
//! a future before evaluating it, and bignum-aware assertions that compare
//! through the configured arbitrary-precision binding instead of native
//! numeric coercion. Installation is idempotent; a missing or broken
//! numeric binding is a fatal configuration error, not a test failure.

use crate::bignum::{Big, ParseBigError};
use crate::config::{ConfigError, HarnessConfig};
use crate::fixtures;
use once_cell::sync::OnceCell;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

static EXTENSIONS: OnceCell<Extensions> = OnceCell::new();

/// The arbitrary-precision numeric binding assertions compare through,
/// resolved by name from the configuration.
#[derive(Clone, Copy)]
pub struct NumericBinding {
    pub name: &'static str,
    pub parse: fn(&str) -> Result<Big, ParseBigError>,
}

/// The process-wide assertion extensions. Published exactly once by
/// [`install`].
pub struct Extensions {
    numeric: NumericBinding,
    resolve_timeout: Duration,
    deploy_timeout: Duration,
}

impl Extensions {
    fn from_config(config: &HarnessConfig) -> Result<Self, ConfigError> {
        let numeric = match config.numeric_backend.as_str() {
            "big" => NumericBinding { name: "big", parse: str::parse },
            other => return Err(ConfigError::UnknownNumericBackend(other.to_string())),
        };

        // the binding must reproduce a golden fixture exactly
        let one_token = (numeric.parse)("1000000000000000000")
            .map_err(|_| ConfigError::NumericBindingBroken(numeric.name.to_string()))?;
        if one_token != fixtures::fixtures().one_token {
            return Err(ConfigError::NumericBindingBroken(numeric.name.to_string()));
        }

        Ok(Extensions {
            numeric,
            resolve_timeout: config.resolve_timeout(),
            deploy_timeout: config.deploy_timeout(),
        })
    }

    pub fn numeric(&self) -> &NumericBinding {
        &self.numeric
    }

    pub fn resolve_timeout(&self) -> Duration {
        self.resolve_timeout
    }

    pub fn deploy_timeout(&self) -> Duration {
        self.deploy_timeout
    }
}

/// Installs the assertion extensions from [`HarnessConfig::load`]. Safe to
/// call from every suite file; only the first call does any work.
pub fn install() -> Result<&'static Extensions, ConfigError> {
    if let Some(ext) = EXTENSIONS.get() {
        return Ok(ext);
    }
    let ext = Extensions::from_config(&HarnessConfig::load()?)?;
    debug!(backend = ext.numeric.name, "assertion extensions installed");
    Ok(EXTENSIONS.get_or_init(|| ext))
}

/// The installed extensions.
///
/// Panics when [`install`] has not run: assertions before installation are
/// a wiring mistake of the suite, not a test failure.
pub fn extensions() -> &'static Extensions {
    EXTENSIONS
        .get()
        .expect("assertion extensions are not installed; call assertions::install() first")
}

/// Awaits `fut` and returns its success value. A rejection or a result
/// that fails to arrive within the configured resolve timeout is an
/// assertion failure.
pub async fn resolves<T, E: fmt::Display>(fut: impl Future<Output = Result<T, E>>) -> T {
    resolve_within(extensions().resolve_timeout(), fut).await
}

/// Awaits `fut` and returns its error. Resolving successfully, or not
/// settling within the configured resolve timeout, is an assertion failure.
pub async fn rejects<T: fmt::Debug, E>(fut: impl Future<Output = Result<T, E>>) -> E {
    let dur = extensions().resolve_timeout();
    match timeout(dur, fut).await {
        Err(_) => panic!("future did not settle within {dur:?}"),
        Ok(Ok(v)) => panic!("expected the future to reject, it resolved to {v:?}"),
        Ok(Err(e)) => e,
    }
}

async fn resolve_within<T, E: fmt::Display>(
    dur: Duration,
    fut: impl Future<Output = Result<T, E>>,
) -> T {
    match timeout(dur, fut).await {
        Err(_) => panic!("future did not resolve within {dur:?}"),
        Ok(Err(e)) => panic!("expected the future to resolve, it rejected: {e}"),
        Ok(Ok(v)) => v,
    }
}

#[doc(hidden)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BigCmp {
    Eq,
    Gt,
    Lt,
}

#[doc(hidden)]
pub fn assert_big(
    cmp: BigCmp,
    actual: Result<Big, ParseBigError>,
    expected: Result<Big, ParseBigError>,
    actual_expr: &str,
    expected_expr: &str,
) {
    let ext = extensions();
    let coerce = |value: Result<Big, ParseBigError>, expr: &str| {
        value.unwrap_or_else(|e| {
            panic!(
                "cannot interpret `{expr}` through the '{}' numeric binding: {e}",
                ext.numeric().name
            )
        })
    };
    let actual = coerce(actual, actual_expr);
    let expected = coerce(expected, expected_expr);

    let (holds, op) = match cmp {
        BigCmp::Eq => (actual == expected, "=="),
        BigCmp::Gt => (actual > expected, ">"),
        BigCmp::Lt => (actual < expected, "<"),
    };
    if !holds {
        panic!(
            "assertion failed: `{actual_expr}` {op} `{expected_expr}`\n  left: {actual}\n right: {expected}"
        );
    }
}

/// Asserts exact numeric equality through the installed bignum binding.
/// Either operand may be a `Big`, a native integer, or a literal in string
/// form.
#[macro_export]
macro_rules! assert_big_eq {
    ($actual:expr, $expected:expr $(,)?) => {
        $crate::assertions::assert_big(
            $crate::assertions::BigCmp::Eq,
            $crate::bignum::IntoBig::into_big($actual),
            $crate::bignum::IntoBig::into_big($expected),
            stringify!($actual),
            stringify!($expected),
        )
    };
}

/// Asserts `actual > expected` through the installed bignum binding.
#[macro_export]
macro_rules! assert_big_gt {
    ($actual:expr, $expected:expr $(,)?) => {
        $crate::assertions::assert_big(
            $crate::assertions::BigCmp::Gt,
            $crate::bignum::IntoBig::into_big($actual),
            $crate::bignum::IntoBig::into_big($expected),
            stringify!($actual),
            stringify!($expected),
        )
    };
}

/// Asserts `actual < expected` through the installed bignum binding.
#[macro_export]
macro_rules! assert_big_lt {
    ($actual:expr, $expected:expr $(,)?) => {
        $crate::assertions::assert_big(
            $crate::assertions::BigCmp::Lt,
            $crate::bignum::IntoBig::into_big($actual),
            $crate::bignum::IntoBig::into_big($expected),
            stringify!($actual),
            stringify!($expected),
        )
    };
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bignum::big;
    use pretty_assertions::assert_eq;

    #[test]
    fn unknown_backend_is_a_config_error() {
        let config = HarnessConfig {
            numeric_backend: "bn254".to_string(),
            ..Default::default()
        };
        assert_eq!(
            Extensions::from_config(&config).err(),
            Some(ConfigError::UnknownNumericBackend("bn254".to_string()))
        );
    }

    #[test]
    fn install_is_idempotent() {
        let first = install().unwrap() as *const Extensions;
        let second = install().unwrap() as *const Extensions;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn resolves_awaits_before_evaluating() {
        install().unwrap();

        let fut = async {
            tokio::task::yield_now().await;
            Ok::<_, ParseBigError>(big(7u8))
        };
        assert_eq!(resolves(fut).await, big(7u8));
    }

    #[tokio::test]
    #[should_panic(expected = "did not resolve within")]
    async fn resolves_times_out_on_pending_futures() {
        resolve_within(
            Duration::from_millis(10),
            std::future::pending::<Result<(), ParseBigError>>(),
        )
        .await;
    }

    #[tokio::test]
    #[should_panic(expected = "expected the future to reject")]
    async fn rejects_fails_on_success() {
        install().unwrap();
        rejects(async { Ok::<_, ParseBigError>(1u8) }).await;
    }

    #[test]
    fn big_assertions_accept_mixed_representations() {
        install().unwrap();
        assert_big_eq!(big(1u8) * Big::exp10(18), "1000000000000000000");
        assert_big_gt!("0x10", 15u8);
        assert_big_lt!(-5i32, "0");
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn big_eq_reports_mismatches() {
        install().unwrap();
        assert_big_eq!(1u8, 2u8);
    }
}
