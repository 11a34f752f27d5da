//! End-to-end lifecycle tests against the in-memory chain backend

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{parse_forged_counters, MockChain, SimulationScript, BASE_COUNTER};
use tezgate::config::Config;
use tezgate::error::GatewayError;
use tezgate::orchestrator::{AccountSequencer, LifecycleState, Orchestrator};
use tezgate::signer::Signer;
use tezgate::types::{
    AccountRef, Mutez, Network, OperationDetails, OperationRequest, OperationStatus,
};

const TZ1B: &str = "tz1gjaF81ZRRvdzjobyfVNsAeSC6PScjfQwN";

fn fast_config() -> Config {
    let mut config = Config::default();
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.confirmation.poll_interval_ms = 10;
    config
}

struct Harness {
    chain: Arc<MockChain>,
    orchestrator: Arc<Orchestrator>,
    source: AccountRef,
}

fn harness(revealed: bool) -> Harness {
    let chain = Arc::new(MockChain::new());
    let (signer, _) = Signer::generate().unwrap();
    let source = signer.address().unwrap();
    if revealed {
        chain.mark_revealed(&source);
    }

    let orchestrator = Arc::new(Orchestrator::new(
        chain.clone(),
        Arc::new(signer),
        Arc::new(AccountSequencer::new()),
        &fast_config(),
    ));

    Harness {
        chain,
        orchestrator,
        source,
    }
}

fn transfer_request(source: &AccountRef) -> OperationRequest {
    OperationRequest {
        network: Network::Shadownet,
        source: source.clone(),
        details: OperationDetails::Transfer {
            destination: AccountRef::parse(TZ1B).unwrap(),
            amount: Mutez(1_000_000),
        },
    }
}

#[tokio::test]
async fn transfer_reaches_confirmed_with_next_counter() {
    let h = harness(true);

    let submission = h
        .orchestrator
        .submit(&transfer_request(&h.source), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(submission.state, LifecycleState::Confirmed);
    assert_eq!(submission.receipt.status, OperationStatus::Included);
    assert!(submission.receipt.included_in_block.is_some());
    assert_eq!(submission.receipt.operation_hash, submission.operation_hash);

    // Exactly one injection; placeholder sim + confirming sim
    assert_eq!(h.chain.injected_count(), 1);
    assert_eq!(h.chain.simulate_calls.load(Ordering::SeqCst), 2);

    // Counter observed at 41 → operation content carries 42
    let payload = h.chain.inject_attempts.lock().unwrap()[0].clone();
    let counters = parse_forged_counters(&hex::decode(payload).unwrap());
    assert_eq!(counters, vec![(108, BASE_COUNTER + 1)]);
}

#[tokio::test]
async fn unrevealed_account_gets_reveal_prepended() {
    let h = harness(false);

    let submission = h
        .orchestrator
        .submit(&transfer_request(&h.source), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(submission.state, LifecycleState::Confirmed);

    let payload = h.chain.inject_attempts.lock().unwrap()[0].clone();
    let counters = parse_forged_counters(&hex::decode(payload).unwrap());
    // Reveal takes c+1, the transfer takes c+2, one batch
    assert_eq!(
        counters,
        vec![(107, BASE_COUNTER + 1), (108, BASE_COUNTER + 2)]
    );
}

#[tokio::test]
async fn failed_simulation_is_terminal_and_never_injects() {
    let h = harness(true);
    h.chain.script_simulation(SimulationScript::Failed {
        error: r#"[{"id":"proto.alpha.michelson_v1.no_such_entrypoint","entrypoint":"Tranfer"}]"#
            .to_string(),
    });

    let err = h
        .orchestrator
        .submit(&transfer_request(&h.source), Duration::from_secs(5))
        .await
        .unwrap_err();

    match err {
        GatewayError::SimulationFailed { details } => {
            assert!(details.contains("no_such_entrypoint"));
            assert!(details.contains("Tranfer"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Surfaced verbatim, never retried, no injection attempt
    assert_eq!(h.chain.injected_count(), 0);
    assert_eq!(h.chain.simulate_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transient_injection_failures_retry_same_bytes() {
    let h = harness(true);
    h.chain.inject_transient_failures.store(2, Ordering::SeqCst);

    let submission = h
        .orchestrator
        .submit(&transfer_request(&h.source), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(submission.state, LifecycleState::Confirmed);

    let attempts = h.chain.inject_attempts.lock().unwrap().clone();
    assert_eq!(attempts.len(), 3);
    // Identical signed bytes on every attempt: same hash, no re-forge
    assert_eq!(attempts[0], attempts[1]);
    assert_eq!(attempts[1], attempts[2]);
}

#[tokio::test]
async fn injection_rejection_is_not_retried() {
    let h = harness(true);
    h.chain.reject_injection.store(true, Ordering::SeqCst);

    let err = h
        .orchestrator
        .submit(&transfer_request(&h.source), Duration::from_secs(5))
        .await
        .unwrap_err();

    match err {
        GatewayError::InjectionRejected { reason, .. } => {
            assert!(reason.contains("counter in the past"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.chain.injected_count(), 1);
}

#[tokio::test]
async fn exhausted_transient_retries_surface_no_endpoint() {
    let h = harness(true);
    h.chain
        .inject_transient_failures
        .store(100, Ordering::SeqCst);

    let err = h
        .orchestrator
        .submit(&transfer_request(&h.source), Duration::from_secs(5))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GatewayError::NoEndpointAvailable { ref network, .. } if network == "shadownet"
    ));
    // Bounded attempts: default policy allows three
    assert_eq!(h.chain.injected_count(), 3);
}

#[tokio::test]
async fn deadline_expiry_after_injection_returns_hash() {
    let h = harness(true);
    h.chain.auto_include.store(false, Ordering::SeqCst);

    let submission = h
        .orchestrator
        .submit(&transfer_request(&h.source), Duration::from_millis(200))
        .await
        .unwrap();

    // Non-fatal: the operation may still confirm later, so the caller
    // gets the hash to re-query instead of resubmitting
    assert_eq!(submission.state, LifecycleState::TimedOut);
    assert_eq!(submission.receipt.status, OperationStatus::Pending);
    assert!(submission.operation_hash.starts_with('o'));
    assert_eq!(h.chain.injected_count(), 1);
}

#[tokio::test]
async fn concurrent_same_source_counters_are_gapless() {
    let h = harness(true);
    const REQUESTS: u64 = 6;

    let mut handles = Vec::new();
    for _ in 0..REQUESTS {
        let orchestrator = h.orchestrator.clone();
        let request = transfer_request(&h.source);
        handles.push(tokio::spawn(async move {
            orchestrator.submit(&request, Duration::from_secs(10)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let attempts = h.chain.inject_attempts.lock().unwrap().clone();
    let mut counters: Vec<u64> = attempts
        .iter()
        .map(|payload| {
            parse_forged_counters(&hex::decode(payload).unwrap())
                .last()
                .unwrap()
                .1
        })
        .collect();
    counters.sort_unstable();

    // Exactly {c+1 … c+N}: no duplicates, no gaps
    let expected: Vec<u64> = (1..=REQUESTS).map(|i| BASE_COUNTER + i).collect();
    assert_eq!(counters, expected);
    assert_eq!(h.chain.counter_of(&h.source), BASE_COUNTER + REQUESTS);
}

#[tokio::test]
async fn different_sources_submit_in_parallel() {
    let chain = Arc::new(MockChain::new());
    let sequencer = Arc::new(AccountSequencer::new());
    let config = fast_config();

    let mut handles = Vec::new();
    for _ in 0..3 {
        let (signer, _) = Signer::generate().unwrap();
        let source = signer.address().unwrap();
        chain.mark_revealed(&source);
        let orchestrator = Arc::new(Orchestrator::new(
            chain.clone(),
            Arc::new(signer),
            sequencer.clone(),
            &config,
        ));
        let request = transfer_request(&source);
        handles.push(tokio::spawn(async move {
            orchestrator.submit(&request, Duration::from_secs(10)).await
        }));
    }

    for handle in handles {
        let submission = handle.await.unwrap().unwrap();
        assert_eq!(submission.state, LifecycleState::Confirmed);
    }
    assert_eq!(chain.injected_count(), 3);
}
