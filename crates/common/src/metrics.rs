use lazy_static::lazy_static;
use prometheus::{Encoder, Registry, TextEncoder};

lazy_static! {
    /// Registry shared by every crate in the workspace
    pub static ref NMZ_METRICS_REGISTRY: Registry =
        Registry::new_custom(Some("nmz".to_string()), None).unwrap();
}

/// Renders the registry in the Prometheus text exposition format.
pub fn gather_text() -> eyre::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&NMZ_METRICS_REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
