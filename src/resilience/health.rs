//! Health score derived from a metrics summary

use serde::Serialize;

use super::metrics::MetricsSummary;

/// Health status buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl HealthStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Self::Excellent
        } else if score >= 75.0 {
            Self::Good
        } else if score >= 50.0 {
            Self::Fair
        } else if score >= 25.0 {
            Self::Poor
        } else {
            Self::Critical
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthComponents {
    pub error_rate_score: f64,
    pub latency_score: f64,
    pub volume_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub health_score: f64,
    pub status: HealthStatus,
    pub components: HealthComponents,
    pub summary: MetricsSummary,
    pub recommendations: Vec<String>,
}

impl HealthReport {
    /// Score the summary.
    ///
    /// Weights: error rate 50%, latency 30%, volume 20%. A window without
    /// traffic scores zero on volume.
    pub fn from_summary(summary: MetricsSummary) -> Self {
        let error_rate_score = (100.0 - summary.error_rate * 500.0).max(0.0);
        let latency_score = (100.0 - summary.avg_processing_time_ms / 100.0).max(0.0);
        let volume_score = (summary.total_requests as f64 * 2.0).min(100.0);

        let health_score = error_rate_score * 0.5 + latency_score * 0.3 + volume_score * 0.2;
        let recommendations = recommendations(&summary, health_score);

        Self {
            health_score: round1(health_score),
            status: HealthStatus::from_score(health_score),
            components: HealthComponents {
                error_rate_score: round1(error_rate_score),
                latency_score: round1(latency_score),
                volume_score: round1(volume_score),
            },
            summary,
            recommendations,
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn recommendations(summary: &MetricsSummary, health_score: f64) -> Vec<String> {
    let mut out = Vec::new();

    if summary.error_rate > 0.1 {
        out.push("High error rate detected - review error logs and fix common issues");
    }
    if summary.avg_processing_time_ms > 15000.0 {
        out.push("Slow processing times - consider optimizing document processing");
    }
    if summary.total_requests < 10 {
        out.push("Low request volume - verify service availability and monitoring");
    }
    if health_score < 50.0 {
        out.push("Critical health score - immediate investigation required");
    }
    if summary.errors_by_code.contains_key("API_AUTHENTICATION_FAILED") {
        out.push("Authentication failures detected - verify API key configuration");
    }
    if summary.errors_by_code.contains_key("FILE_TOO_LARGE") {
        out.push("File size errors - consider implementing better size validation");
    }
    if out.is_empty() {
        out.push("System operating normally - continue monitoring");
    }

    out.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn summary(total: u64, errors: u64, avg_ms: f64) -> MetricsSummary {
        let error_rate = if total == 0 {
            0.0
        } else {
            errors as f64 / total as f64
        };
        MetricsSummary {
            start_time: Utc::now(),
            end_time: Utc::now(),
            total_requests: total,
            total_errors: errors,
            error_rate,
            success_rate: 1.0 - error_rate,
            avg_processing_time_ms: avg_ms,
            errors_by_code: BTreeMap::new(),
            errors_by_operation: BTreeMap::new(),
            errors_by_severity: BTreeMap::new(),
            top_error_messages: Vec::new(),
        }
    }

    #[test]
    fn test_healthy_service_scores_excellent() {
        let report = HealthReport::from_summary(summary(100, 0, 200.0));
        // 0.5*100 + 0.3*98 + 0.2*100
        assert_eq!(report.health_score, 99.4);
        assert_eq!(report.status, HealthStatus::Excellent);
        assert_eq!(
            report.recommendations,
            vec!["System operating normally - continue monitoring".to_string()]
        );
    }

    #[test]
    fn test_no_traffic() {
        let report = HealthReport::from_summary(summary(0, 0, 0.0));
        assert_eq!(report.components.volume_score, 0.0);
        assert_eq!(report.health_score, 80.0);
        assert_eq!(report.status, HealthStatus::Good);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.starts_with("Low request volume")));
    }

    #[test]
    fn test_failing_service_recommendations() {
        let mut s = summary(50, 25, 20000.0);
        s.errors_by_code
            .insert("API_AUTHENTICATION_FAILED".to_string(), 20);
        s.errors_by_code.insert("FILE_TOO_LARGE".to_string(), 5);
        let report = HealthReport::from_summary(s);

        assert_eq!(report.status, HealthStatus::Critical);
        assert_eq!(report.recommendations.len(), 5);
        assert!(report.recommendations[0].starts_with("High error rate"));
        assert!(report.recommendations[1].starts_with("Slow processing"));
        assert!(report.recommendations[2].starts_with("Critical health score"));
        assert!(report.recommendations[3].starts_with("Authentication failures"));
        assert!(report.recommendations[4].starts_with("File size errors"));
    }

    #[test]
    fn test_status_boundaries() {
        assert_eq!(HealthStatus::from_score(90.0), HealthStatus::Excellent);
        assert_eq!(HealthStatus::from_score(89.9), HealthStatus::Good);
        assert_eq!(HealthStatus::from_score(75.0), HealthStatus::Good);
        assert_eq!(HealthStatus::from_score(50.0), HealthStatus::Fair);
        assert_eq!(HealthStatus::from_score(25.0), HealthStatus::Poor);
        assert_eq!(HealthStatus::from_score(24.9), HealthStatus::Critical);
    }
}
