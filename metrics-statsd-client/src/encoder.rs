use crate::{metric::MetricSample, sampler::Sampler};

/// Renders metric samples into wire-format lines.
///
/// The grammar of a single line is:
///
/// ```text
/// [<prefix>]<name>[<suffix>]:<value>|<type>[|@<sample_rate>][|#<tag>,<tag>,...]
/// ```
///
/// Call-specific tags come first, followed by the global tags, each list in the order it was given. Tags are not
/// deduplicated, sorted, or validated.
pub struct Encoder {
    prefix: String,
    suffix: String,
    global_tags: Vec<String>,
    sampler: Sampler,
}

impl Encoder {
    pub(crate) fn new(prefix: String, suffix: String, global_tags: Vec<String>, sampler: Sampler) -> Self {
        Self { prefix, suffix, global_tags, sampler }
    }

    /// Encodes the given sample, applying its sample rate.
    ///
    /// Returns `None` if the sample was not selected for sending. This is not a failure: the occurrence is simply not
    /// transmitted.
    pub fn encode(&self, sample: &MetricSample) -> Option<String> {
        if !self.sampler.sample(sample.sample_rate()) {
            return None;
        }

        Some(self.render(sample))
    }

    /// Renders the given sample without making a sampling decision.
    ///
    /// The sample rate is written to the line only when it is less than `1`.
    pub fn render(&self, sample: &MetricSample) -> String {
        let mut buf = String::with_capacity(self.prefix.len() + sample.name().len() + self.suffix.len() + 16);

        buf.push_str(&self.prefix);
        buf.push_str(sample.name());
        buf.push_str(&self.suffix);
        buf.push(':');
        sample.value().write_to(&mut buf);
        buf.push('|');
        buf.push_str(sample.metric_type().as_str());

        if let Some(sample_rate) = sample.sample_rate().filter(|rate| *rate < 1.0) {
            buf.push_str("|@");
            buf.push_str(ryu::Buffer::new().format(sample_rate));
        }

        let mut wrote_tag = false;
        for tag in sample.tags().iter().chain(self.global_tags.iter()) {
            if wrote_tag {
                buf.push(',');
            } else {
                buf.push_str("|#");
                wrote_tag = true;
            }

            buf.push_str(tag);
        }

        buf
    }
}
