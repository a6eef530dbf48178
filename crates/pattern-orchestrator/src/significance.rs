use ict_core::{PatternCommon, Significance};

const MTF_TAGS: [&str; 3] = ["h4_authority", "m15_alignment", "m5_timing"];

/// Open Question resolution (SPEC_FULL.md §14 item 3): `base_score < 60 ->
/// Low`, `60-74 -> Medium`, `75-89 -> High`, `>=90` with at least two
/// confluences `-> Critical`, `>=90` with the full H4+M15+M5 triple
/// confluence (see `mtf-validator`'s confluence tags) `-> Institutional`.
pub fn significance_for(common: &PatternCommon) -> Significance {
    let score = common.base_score;
    if score < 60.0 {
        return Significance::Low;
    }
    if score < 75.0 {
        return Significance::Medium;
    }
    if score < 90.0 {
        return Significance::High;
    }

    let mtf_confluence_count = MTF_TAGS.iter().filter(|tag| common.confluences.contains(**tag)).count();
    if mtf_confluence_count == MTF_TAGS.len() {
        return Significance::Institutional;
    }
    // Count only the genuine MTF confluence tags, not `confluences` at large:
    // the set also carries mtf-validator's own `mtf_validated` idempotency
    // marker, which isn't a confluence and must not count toward this rule.
    if mtf_confluence_count >= 2 {
        return Significance::Critical;
    }
    Significance::High
}
