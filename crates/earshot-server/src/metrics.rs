//! Prometheus metrics recorder and HTTP metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle `/metrics` renders from. Call once at startup,
/// before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// `/transcribe` responses (counter, labels: status).
pub const HTTP_TRANSCRIBE_RESPONSES_TOTAL: &str = "http_transcribe_responses_total";
/// Multipart bodies rejected before reaching the pipeline (counter, labels: reason).
pub const HTTP_REJECTED_UPLOADS_TOTAL: &str = "http_rejected_uploads_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(HTTP_TRANSCRIBE_RESPONSES_TOTAL, "status" => "200").increment(2);
        });
        let output = render(&handle);
        assert!(output.contains("http_transcribe_responses_total"), "{output}");
        assert!(output.contains("status=\"200\""), "{output}");
    }

    #[test]
    fn metric_constants_are_snake_case() {
        for name in [HTTP_TRANSCRIBE_RESPONSES_TOTAL, HTTP_REJECTED_UPLOADS_TOTAL] {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{name}"
            );
        }
    }
}
