use serde::{Deserialize, Serialize};
use std::time::Instant;
use vision::{AnalysisRequest, AnalysisResponse};

use crate::client::AnalyzeApi;
use crate::samples::{evaluate, EvalSample, Expectation, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SampleStatus {
    Success,
    ApiError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleResult {
    pub sample_index: usize,
    pub payload: AnalysisRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Expectation>,
    pub status: SampleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_output: Option<AnalysisResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub evaluation: Verdict,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub total: usize,
    pub evaluated: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Percentage of evaluated samples that passed.
    pub accuracy: f64,
    pub avg_latency_ms: f64,
    pub results: Vec<SampleResult>,
}

impl EvalReport {
    fn from_results(results: Vec<SampleResult>) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.evaluation.pass == Some(true)).count();
        let failed = results.iter().filter(|r| r.evaluation.pass == Some(false)).count();
        let evaluated = passed + failed;
        let accuracy = if evaluated > 0 {
            passed as f64 / evaluated as f64 * 100.0
        } else {
            0.0
        };
        let avg_latency_ms = if total > 0 {
            results.iter().map(|r| r.latency_ms).sum::<f64>() / total as f64
        } else {
            0.0
        };

        Self {
            total,
            evaluated,
            passed,
            failed,
            skipped: total - evaluated,
            accuracy,
            avg_latency_ms,
            results,
        }
    }
}

/// Replays labeled samples against the API one at a time.
pub struct EvalRunner<C> {
    client: C,
}

impl<C: AnalyzeApi> EvalRunner<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub async fn run(&self, samples: &[EvalSample]) -> EvalReport {
        tracing::info!(samples = samples.len(), "Starting evaluation");

        let mut results = Vec::with_capacity(samples.len());
        for (index, sample) in samples.iter().enumerate() {
            let result = self.run_sample(index, sample).await;
            tracing::info!(
                index = index + 1,
                total = samples.len(),
                sku = %sample.sku,
                pass = ?result.evaluation.pass,
                reason = %result.evaluation.reason,
                "Sample evaluated"
            );
            results.push(result);
        }

        let report = EvalReport::from_results(results);
        tracing::info!(
            passed = report.passed,
            evaluated = report.evaluated,
            accuracy = report.accuracy,
            "Evaluation finished"
        );
        report
    }

    async fn run_sample(&self, index: usize, sample: &EvalSample) -> SampleResult {
        let payload = sample.to_request();
        let start = Instant::now();
        let outcome = self.client.analyze(&payload).await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let (status, api_output, error, evaluation) = match outcome {
            Ok(response) => {
                let verdict = evaluate(sample, &response);
                (SampleStatus::Success, Some(response), None, verdict)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                let verdict = Verdict {
                    pass: Some(false),
                    reason: format!("API call failed: {}", message),
                };
                (SampleStatus::ApiError, None, Some(message), verdict)
            }
        };

        SampleResult {
            sample_index: index,
            payload,
            expected_answer: sample.expected_answer.clone(),
            expected: sample.expect.clone(),
            status,
            api_output,
            error,
            evaluation,
            latency_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use vision::ComplianceValue;

    /// Answers from a fixed table keyed by question; unknown questions fail.
    struct TableApi(HashMap<String, AnalysisResponse>);

    #[async_trait]
    impl AnalyzeApi for TableApi {
        async fn analyze(&self, request: &AnalysisRequest) -> anyhow::Result<AnalysisResponse> {
            self.0
                .get(&request.question)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("API status 404: unknown"))
        }
    }

    fn answer(text: &str) -> AnalysisResponse {
        AnalysisResponse {
            answer: text.to_string(),
            attributes: Default::default(),
            compliance: Default::default(),
            grounding: None,
        }
    }

    fn sample(question: &str, expected: Option<&str>) -> EvalSample {
        EvalSample {
            sku: "SH-001".into(),
            question: question.into(),
            context_ids: vec!["spec_catalog".into(), "brand_rules_shoes_v1".into()],
            expected_answer: expected.map(str::to_string),
            expect: None,
        }
    }

    #[tokio::test]
    async fn aggregates_pass_fail_and_skip() {
        let mut forbidden = answer("Cannot claim that.");
        forbidden
            .compliance
            .insert("R-103".into(), ComplianceValue::Note("fail".into()));

        let api = TableApi(HashMap::from([
            ("Leather?".to_string(), answer("Yes")),
            ("Color?".to_string(), answer("Red")),
            ("Orthopedic?".to_string(), forbidden),
            ("Anything?".to_string(), answer("Sure")),
        ]));

        let mut orthopedic = sample("Orthopedic?", None);
        orthopedic.expect = Some(Expectation {
            forbid_claim_rule: Some("R-103".into()),
            allow_insufficient: false,
        });

        let samples = vec![
            sample("Leather?", Some("yes")),
            sample("Color?", Some("brown")),
            orthopedic,
            sample("Anything?", None),
            sample("Unknown?", Some("n/a")),
        ];

        let report = EvalRunner::new(api).run(&samples).await;

        assert_eq!(report.total, 5);
        assert_eq!(report.passed, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(report.skipped, 1);
        assert!((report.accuracy - 50.0).abs() < 1e-9);
        assert_eq!(report.results[4].status, SampleStatus::ApiError);
        assert_eq!(report.results[0].payload.context_ids, vec!["brand_rules_shoes_v1"]);
    }

    #[tokio::test]
    async fn empty_run_has_zero_accuracy() {
        let report = EvalRunner::new(TableApi(HashMap::new())).run(&[]).await;

        assert_eq!(report.total, 0);
        assert_eq!(report.accuracy, 0.0);
    }

    #[test]
    fn report_serializes_status_like_the_log() {
        let report = EvalReport::from_results(vec![SampleResult {
            sample_index: 0,
            payload: sample("Leather?", None).to_request(),
            expected_answer: None,
            expected: None,
            status: SampleStatus::ApiError,
            api_output: None,
            error: Some("API status 502".into()),
            evaluation: Verdict {
                pass: Some(false),
                reason: "API call failed".into(),
            },
            latency_ms: 1.0,
        }]);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["results"][0]["status"], "API_ERROR");
        assert_eq!(value["failed"], 1);
    }
}
