// Inquiry controller state machine, driven by a scripted stack.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use bluefleet_core::agent::{InquiryAgent, RoundOutcome};
use bluefleet_stack::{DiscoveryMode, InquiryStatus, SearchStatus};

use common::{InquiryRound, ScriptedStack, SearchResponse, device};

const TIMEOUT: Duration = Duration::from_secs(30);

fn agent(stack: &Arc<ScriptedStack>, online_check: bool) -> InquiryAgent {
    InquiryAgent::new(
        Arc::clone(stack) as Arc<dyn bluefleet_stack::BluetoothStack>,
        DiscoveryMode::Giac,
        online_check,
        TIMEOUT,
    )
}

fn addresses(outcome: &RoundOutcome) -> Vec<String> {
    match outcome {
        RoundOutcome::Delivered(Some(devices)) => {
            let mut addrs: Vec<String> = devices
                .iter()
                .map(|d| d.address().as_str().to_owned())
                .collect();
            addrs.sort();
            addrs
        }
        other => panic!("expected a delivered set, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn collects_discovered_devices() {
    let stack = Arc::new(ScriptedStack::new());
    stack.push_inquiry_round(InquiryRound::Deliver {
        devices: vec![
            device("AABBCCDDEE01", Some("one"), false),
            device("AABBCCDDEE02", None, true),
            // Duplicate beacons for the same address collapse.
            device("AABBCCDDEE01", Some("one"), false),
        ],
        status: Some(InquiryStatus::Completed),
    });

    let outcome = agent(&stack, false).run(&CancellationToken::new()).await;
    assert_eq!(addresses(&outcome), vec!["AABBCCDDEE01", "AABBCCDDEE02"]);
}

#[tokio::test(start_paused = true)]
async fn inquiry_error_discards_the_accumulated_set() {
    let stack = Arc::new(ScriptedStack::new());
    stack.push_inquiry_round(InquiryRound::Deliver {
        devices: vec![device("AABBCCDDEE01", None, false)],
        status: Some(InquiryStatus::Error),
    });

    let outcome = agent(&stack, false).run(&CancellationToken::new()).await;
    assert_eq!(addresses(&outcome), Vec::<String>::new());
}

#[tokio::test(start_paused = true)]
async fn adapter_off_delivers_the_absence_sentinel() {
    let stack = Arc::new(ScriptedStack::new());
    stack.set_powered(false);

    let outcome = agent(&stack, false).run(&CancellationToken::new()).await;
    assert!(matches!(outcome, RoundOutcome::Delivered(None)));
}

#[tokio::test(start_paused = true)]
async fn refused_inquiry_delivers_the_absence_sentinel() {
    let stack = Arc::new(ScriptedStack::new());
    stack.push_inquiry_round(InquiryRound::FailStart);

    let outcome = agent(&stack, false).run(&CancellationToken::new()).await;
    assert!(matches!(outcome, RoundOutcome::Delivered(None)));
}

#[tokio::test(start_paused = true)]
async fn online_check_keeps_only_devices_that_answer_the_probe() {
    let stack = Arc::new(ScriptedStack::new());
    stack.push_inquiry_round(InquiryRound::Deliver {
        devices: vec![
            device("AABBCCDDEE01", None, true),
            device("AABBCCDDEE02", None, true),
            device("AABBCCDDEE03", None, true),
        ],
        status: Some(InquiryStatus::Completed),
    });
    stack.push_search_response(
        "AABBCCDDEE01",
        SearchResponse::Respond {
            records: Vec::new(),
            status: SearchStatus::Completed,
        },
    );
    // "No records" still proves the device answered.
    stack.push_search_response(
        "AABBCCDDEE02",
        SearchResponse::Respond {
            records: Vec::new(),
            status: SearchStatus::NoRecords,
        },
    );
    stack.push_search_response(
        "AABBCCDDEE03",
        SearchResponse::Respond {
            records: Vec::new(),
            status: SearchStatus::DeviceNotReachable,
        },
    );

    let outcome = agent(&stack, true).run(&CancellationToken::new()).await;
    assert_eq!(addresses(&outcome), vec!["AABBCCDDEE01", "AABBCCDDEE02"]);
    assert_eq!(stack.search_count("AABBCCDDEE03"), 1);
}

#[tokio::test(start_paused = true)]
async fn hung_inquiry_times_out_and_discards_results() {
    let stack = Arc::new(ScriptedStack::new());
    stack.push_inquiry_round(InquiryRound::Deliver {
        devices: vec![device("AABBCCDDEE01", None, false)],
        status: None,
    });

    let outcome = agent(&stack, false).run(&CancellationToken::new()).await;
    assert_eq!(addresses(&outcome), Vec::<String>::new());
}

#[tokio::test(start_paused = true)]
async fn cancellation_delivers_nothing() {
    let stack = Arc::new(ScriptedStack::new());
    stack.push_inquiry_round(InquiryRound::Deliver {
        devices: Vec::new(),
        status: None,
    });

    let token = CancellationToken::new();
    let run_token = token.clone();
    let agent = agent(&stack, false);
    let handle = tokio::spawn(async move { agent.run(&run_token).await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();

    let outcome = handle.await.unwrap();
    assert!(matches!(outcome, RoundOutcome::Cancelled));
}
