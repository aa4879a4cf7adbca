//! Metrics hook.
//!
//! Library code only emits `tracing` events; wire a subscriber (and any
//! exporter) in the binary layer.

pub fn emit_span(event: &str, key_values: &[(&str, String)]) {
    let span = tracing::span!(tracing::Level::TRACE, "mrplan", event);
    let _enter = span.enter();
    for (k, v) in key_values {
        tracing::trace!(%event, %k, %v, "metric");
    }
}
