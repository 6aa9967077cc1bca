//! Iteration body seam and the per-iteration context handed to it

use crate::models::{Sample, Tags};
use async_trait::async_trait;
use rand::rngs::StdRng;
use std::sync::Arc;

/// Unit of work a virtual worker executes once per iteration
///
/// Implementations record their observations on the context; the pool
/// appends them to the collector only after `iterate` returns, so an
/// iteration aborted mid-flight leaves no trace.
#[async_trait]
pub trait IterationBody: Send + Sync {
    async fn iterate(&self, ctx: &mut IterationContext);
}

/// Everything one iteration may read or produce
pub struct IterationContext {
    scenario: Arc<str>,
    worker_id: u64,
    iteration: u64,
    tags: Arc<Tags>,
    rng: StdRng,
    samples: Vec<Sample>,
}

impl IterationContext {
    pub fn new(
        scenario: Arc<str>,
        worker_id: u64,
        iteration: u64,
        tags: Arc<Tags>,
        rng: StdRng,
    ) -> Self {
        Self {
            scenario,
            worker_id,
            iteration,
            tags,
            rng,
            samples: Vec::new(),
        }
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Worker-owned random source, seeded when the run is seeded
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn counter(&mut self, metric: &str, value: f64) {
        let tags = self.tags_with(&[]);
        self.samples.push(Sample::counter(metric, value, tags));
    }

    pub fn rate(&mut self, metric: &str, hit: bool) {
        let tags = self.tags_with(&[]);
        self.samples.push(Sample::rate(metric, hit, tags));
    }

    pub fn trend(&mut self, metric: &str, value: f64) {
        let tags = self.tags_with(&[]);
        self.samples.push(Sample::trend(metric, value, tags));
    }

    /// Record a sample built by the caller; scenario tags are merged in
    /// without overriding the sample's own tags
    pub fn push(&mut self, mut sample: Sample) {
        for (key, value) in self.tags.iter() {
            sample
                .tags
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self.samples.push(sample);
    }

    /// Scenario tags plus `extra`
    pub fn tags_with(&self, extra: &[(&str, &str)]) -> Tags {
        let mut tags = (*self.tags).clone();
        for (key, value) in extra {
            tags.insert((*key).to_string(), (*value).to_string());
        }
        tags
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Hand the random source back and release the recorded samples
    pub fn finish(self) -> (StdRng, Vec<Sample>) {
        (self.rng, self.samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn context() -> IterationContext {
        let mut tags = Tags::new();
        tags.insert("scenario".to_string(), "smoke".to_string());
        tags.insert("test_type".to_string(), "smoke".to_string());
        IterationContext::new(
            Arc::from("smoke"),
            3,
            7,
            Arc::new(tags),
            StdRng::seed_from_u64(1),
        )
    }

    #[test]
    fn test_samples_carry_scenario_tags() {
        let mut ctx = context();
        ctx.counter("http_reqs", 1.0);
        ctx.rate("http_req_failed", false);

        let (_, samples) = ctx.finish();
        assert_eq!(samples.len(), 2);
        for sample in samples {
            assert_eq!(sample.tags.get("scenario").map(String::as_str), Some("smoke"));
            assert_eq!(sample.tags.get("test_type").map(String::as_str), Some("smoke"));
        }
    }

    #[test]
    fn test_push_keeps_sample_tags() {
        let mut ctx = context();
        let mut own = Tags::new();
        own.insert("test_type".to_string(), "override".to_string());
        ctx.push(Sample::trend("http_req_duration", 12.0, own));

        let sample = &ctx.samples()[0];
        assert_eq!(sample.tags["test_type"], "override");
        assert_eq!(sample.tags["scenario"], "smoke");
    }

    #[test]
    fn test_identity_accessors() {
        let ctx = context();
        assert_eq!(ctx.scenario(), "smoke");
        assert_eq!(ctx.worker_id(), 3);
        assert_eq!(ctx.iteration(), 7);
        assert_eq!(
            ctx.tags_with(&[("endpoint", "List Books")])["endpoint"],
            "List Books"
        );
    }
}
