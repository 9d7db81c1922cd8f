use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct DispatchMetrics {
    pub registry: Registry,
    pub requests: IntCounter,
    pub errors: IntCounter,
    pub quits: IntCounter,
    pub active_sessions: IntGauge,
}

impl DispatchMetrics {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let requests = IntCounter::new("vc_requests_total", "Total core requests executed")
            .map_err(|e| format!("metrics init error: {e}"))?;
        let errors = IntCounter::new("vc_request_errors_total", "Core requests answered with an error")
            .map_err(|e| format!("metrics init error: {e}"))?;
        let quits = IntCounter::new("vc_quit_requests_total", "QUIT requests received")
            .map_err(|e| format!("metrics init error: {e}"))?;
        let active_sessions = IntGauge::new("vc_active_sessions", "Currently registered sessions")
            .map_err(|e| format!("metrics init error: {e}"))?;
        let _ = registry.register(Box::new(requests.clone()));
        let _ = registry.register(Box::new(errors.clone()));
        let _ = registry.register(Box::new(quits.clone()));
        let _ = registry.register(Box::new(active_sessions.clone()));
        Ok(Self {
            registry,
            requests,
            errors,
            quits,
            active_sessions,
        })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_counters() {
        let metrics = DispatchMetrics::new().unwrap();
        metrics.requests.inc();
        let text = metrics.encode_text();
        assert!(text.contains("vc_requests_total 1"));
        assert!(text.contains("vc_active_sessions 0"));
    }
}
