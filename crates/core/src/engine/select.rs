//! Engine selection policy.

use crate::job::JobSpec;

use super::{EngineKind, MediaEngine};

/// Pick the engine a fresh job should start on.
///
/// Policy: prefer the primary engine; start on the secondary only when it
/// claims the spec and the primary does not, or when the spec is a direct
/// media link the secondary serves natively (the lightweight fast path).
/// Mid-job switches (auth rejection, classifier verdicts) are the download
/// manager's business, not this function's.
pub fn select_engine(
    spec: &JobSpec,
    primary: &dyn MediaEngine,
    secondary: &dyn MediaEngine,
) -> EngineKind {
    let primary_ok = primary.supports(spec);
    let secondary_ok = secondary.supports(spec);

    match (primary_ok, secondary_ok) {
        // Direct media link: the secondary is built exactly for this.
        (_, true) => EngineKind::Secondary,
        (true, false) => EngineKind::Primary,
        // Neither claims it; let the primary produce the real error.
        (false, false) => EngineKind::Primary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEngine;

    #[test]
    fn test_prefers_primary_for_extractor_urls() {
        let primary = MockEngine::primary();
        let secondary = MockEngine::secondary().with_supports(false);
        let spec = JobSpec::new("https://example.com/watch?v=abc");
        assert_eq!(
            select_engine(&spec, &primary, &secondary),
            EngineKind::Primary
        );
    }

    #[test]
    fn test_direct_links_go_to_secondary() {
        let primary = MockEngine::primary();
        let secondary = MockEngine::secondary();
        let spec = JobSpec::new("https://cdn.example.com/clip.mp4");
        assert_eq!(
            select_engine(&spec, &primary, &secondary),
            EngineKind::Secondary
        );
    }

    #[test]
    fn test_unclaimed_spec_falls_back_to_primary() {
        let primary = MockEngine::primary().with_supports(false);
        let secondary = MockEngine::secondary().with_supports(false);
        let spec = JobSpec::new("gopher://example.com/v/1");
        assert_eq!(
            select_engine(&spec, &primary, &secondary),
            EngineKind::Primary
        );
    }
}
