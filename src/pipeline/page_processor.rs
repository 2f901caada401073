use crate::constants::OTX_SOURCE;
use crate::domain::{Indicator, Pulse};
use crate::pipeline::classifier::classify;
use crate::pipeline::clock::CrawlClock;
use crate::types::{FeedPage, RawPulse};
use tracing::{debug, warn};

/// Normalized output of one feed page, in feed order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedPage {
    pub pulses: Vec<Pulse>,
    pub indicators: Vec<Indicator>,
    /// Indicators dropped because their raw type is not trusted.
    pub rejected_indicators: usize,
}

/// Turns a raw feed page into pulses and classified indicators. Pure apart
/// from reading the clock; cannot fail.
pub fn process_page(page: &FeedPage, clock: &dyn CrawlClock) -> ProcessedPage {
    let mut out = ProcessedPage::default();

    for raw in &page.results {
        if raw.id.is_empty() {
            warn!("Dropping pulse without id: name='{}'", raw.name);
            continue;
        }
        out.pulses.push(build_pulse(raw, clock.now()));

        for value in &raw.indicators {
            let Some(category) = classify(&value.indicator_type) else {
                out.rejected_indicators += 1;
                continue;
            };
            out.indicators.push(Indicator {
                ioc_id: value.id.to_string(),
                ioc: value.indicator.clone(),
                ioc_type: category,
                created_time: value.created.clone(),
                crawled_time: clock.now(),
                source: OTX_SOURCE.to_string(),
                category: raw.tags.clone(),
                post_id: raw.id.clone(),
            });
        }
    }

    debug!(
        "Processed page: {} pulses, {} indicators, {} rejected",
        out.pulses.len(),
        out.indicators.len(),
        out.rejected_indicators
    );
    out
}

fn build_pulse(raw: &RawPulse, crawled_time: String) -> Pulse {
    Pulse {
        id: raw.id.clone(),
        name: raw.name.clone(),
        description: raw.description.clone(),
        author_name: raw.author_name.clone(),
        modified: raw.modified.clone(),
        created: raw.created.clone(),
        tags: raw.tags.clone(),
        targeted_countries: raw.targeted_countries.clone(),
        malware_families: raw.malware_families.clone(),
        attack_ids: raw.attack_ids.clone(),
        industries: raw.industries.clone(),
        references: raw.references.clone(),
        crawled_time,
    }
}
