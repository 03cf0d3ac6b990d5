use tracing::warn;

use haex_backend::BackendError;

/// Runs a read-path fetch up to `attempts` times. Mirrors the bounded
/// automatic retry of the platform's query layer: after the last attempt
/// the error is returned for the caller to retain as state.
pub(crate) async fn fetch_with_retry<T, F, Fut>(
    what: &str,
    attempts: u32,
    mut op: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                warn!("{what}: attempt {attempt}/{attempts} failed, retrying: {err}");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
