// SPDX-License-Identifier: Apache-2.0

use crate::exporters::config::Protocol;
use std::error::Error;
use tower::BoxError;

/// Parse a single key-value pair
pub(crate) fn parse_key_val<T, U>(s: &str) -> Result<(T, U), BoxError>
where
    T: std::str::FromStr,
    T::Err: Error + Send + Sync + 'static,
    U: std::str::FromStr,
    U::Err: Error + Send + Sync + 'static,
{
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{s}`"))?;
    Ok((s[..pos].trim().parse()?, s[pos + 1..].trim().parse()?))
}

/// Unknown protocol names fall back to OTLP instead of failing startup
pub(crate) fn parse_protocol(s: &str) -> Result<Protocol, BoxError> {
    Ok(Protocol::from_name(s.trim()))
}

/// Only the exact value `true` enables the flag
pub(crate) fn parse_true_only(s: &str) -> Result<bool, BoxError> {
    Ok(s == "true")
}
