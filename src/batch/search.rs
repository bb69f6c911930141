use tracing::{debug, info};

use crate::{
    api::SyntheticsApi,
    clock::Clock,
    error::{CriticalError, CriticalErrorCode, SyntheticsResult},
    retry::{retry_request, RetryPolicy},
};

use super::models::TriggerConfig;

/// Turns a test search query into one trigger per matching test.
pub async fn search_triggers(
    api: &dyn SyntheticsApi,
    clock: &dyn Clock,
    retry: &RetryPolicy,
    query: &str,
) -> SyntheticsResult<Vec<TriggerConfig>> {
    let found = retry_request(clock, retry, "search tests", || api.search_tests(query))
        .await
        .map_err(|err| {
            CriticalError::new(
                CriticalErrorCode::UnavailableTestConfig,
                format!("Failed to search tests with \"{query}\": {err}"),
            )
        })?;

    info!(query, matches = found.tests.len(), "searched tests");
    let triggers = found
        .tests
        .into_iter()
        .map(|test| TriggerConfig::new(test.public_id))
        .collect::<Vec<_>>();
    debug!(?triggers, "triggers from search");
    Ok(triggers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{
            testing::{Call, FakeApi},
            ServerTest,
        },
        clock::ManualClock,
        error::EndpointError,
    };
    use pretty_assertions::assert_eq;

    fn named(public_id: &str, name: &str) -> ServerTest {
        ServerTest {
            public_id: public_id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn matching_tests_become_triggers() {
        let api = FakeApi::new()
            .with_test(named("aaa-aaa-aaa", "checkout: card"))
            .with_test(named("bbb-bbb-bbb", "login"))
            .with_test(named("ccc-ccc-ccc", "checkout: paypal"));
        let clock = ManualClock::new();

        let triggers = search_triggers(&api, &clock, &RetryPolicy::default(), "checkout")
            .await
            .unwrap();

        assert_eq!(
            triggers,
            vec![TriggerConfig::new("aaa-aaa-aaa"), TriggerConfig::new("ccc-ccc-ccc")]
        );
        assert_eq!(api.calls(), vec![Call::Search("checkout".to_string())]);
    }

    #[tokio::test]
    async fn search_failure_is_critical_after_retries() {
        let api = FakeApi::new();
        api.fail_search(EndpointError::new("unavailable", Some(503)));
        let clock = ManualClock::new();

        let err = search_triggers(&api, &clock, &RetryPolicy::default(), "checkout")
            .await
            .unwrap_err();

        assert_eq!(err.critical_code(), Some(CriticalErrorCode::UnavailableTestConfig));
        assert_eq!(api.count(|c| matches!(c, Call::Search(_))), 4);
    }
}
