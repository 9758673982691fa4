pub mod client;
pub mod runner;
pub mod samples;

pub use client::{AnalyzeApi, HttpAnalyzeClient};
pub use runner::{EvalReport, EvalRunner, SampleResult, SampleStatus};
pub use samples::{evaluate, load_samples, parse_samples, EvalSample, Expectation, Verdict};
