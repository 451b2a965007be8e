//! End-to-end policy application through the controller.

use std::sync::Arc;

use tcflow::kernel::MemoryAdapter;
use tcflow::policy::{TrafficClass, TrafficPolicy};
use tcflow::store::EventStore;
use tcflow::types::{Bandwidth, DeviceName, Handle};
use tcflow::{TcEvent, TrafficController};

fn dev() -> DeviceName {
    DeviceName::new("eth0").unwrap()
}

fn h(s: &str) -> Handle {
    s.parse().unwrap()
}

fn web_and_ssh_policy() -> TrafficPolicy {
    TrafficPolicy::new("eth0")
        .unwrap()
        .total_bandwidth("10mbit")
        .unwrap()
        .class(
            TrafficClass::new("web")
                .guaranteed("2mbit")
                .unwrap()
                .burstable_to("5mbit")
                .unwrap()
                .priority(1)
                .dest_port(80)
                .dest_port(443),
        )
        .class(
            TrafficClass::new("ssh")
                .guaranteed("1mbit")
                .unwrap()
                .burstable_to("3mbit")
                .unwrap()
                .priority(0)
                .dest_port(22),
        )
}

#[tokio::test]
async fn htb_happy_path_emits_the_exact_event_sequence() {
    let adapter = Arc::new(MemoryAdapter::new());
    let controller = TrafficController::new(adapter.clone());

    controller.apply_policy(&web_and_ssh_policy()).await.unwrap();

    let records = controller.event_store().events_for("tc:eth0").await.unwrap();
    let kinds: Vec<_> = records.iter().map(|r| r.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            "HTBQdiscCreated",
            "HTBClassCreated",
            "FilterCreated",
            "FilterCreated",
            "HTBClassCreated",
            "FilterCreated",
            "HTBClassCreated",
        ]
    );

    // Versions are gapless and ascending from 1.
    let versions: Vec<_> = records.iter().map(|r| r.version).collect();
    assert_eq!(versions, (1..=7).collect::<Vec<u64>>());

    match &records[0].payload {
        TcEvent::HtbQdiscCreated {
            handle,
            default_class,
            link_bandwidth,
            ..
        } => {
            assert_eq!(*handle, h("1:0"));
            assert_eq!(*default_class, h("1:999"));
            assert_eq!(*link_bandwidth, Some(Bandwidth::megabits(10)));
        }
        other => panic!("expected HTBQdiscCreated, got {other:?}"),
    }

    match &records[1].payload {
        TcEvent::HtbClassCreated {
            parent,
            handle,
            name,
            priority,
            params,
            device: _,
        } => {
            assert_eq!(*parent, h("1:0"));
            assert_eq!(*handle, h("1:10"));
            assert_eq!(name, "web");
            assert_eq!(priority.value(), 1);
            assert_eq!(params.rate, Bandwidth::megabits(2));
            assert_eq!(params.ceil, Bandwidth::megabits(5));
        }
        other => panic!("expected web HTBClassCreated, got {other:?}"),
    }

    // Web filters carry priorities 100 and 101 and steer into 1:10.
    for (record, (want_priority, want_port)) in
        records[2..4].iter().zip([(100u16, "80"), (101, "443")])
    {
        match &record.payload {
            TcEvent::FilterCreated {
                parent,
                priority,
                flow_id,
                matches,
                ..
            } => {
                assert_eq!(*parent, h("1:0"));
                assert_eq!(*priority, want_priority);
                assert_eq!(*flow_id, h("1:10"));
                assert_eq!(matches[0].value, want_port);
            }
            other => panic!("expected FilterCreated, got {other:?}"),
        }
    }

    match &records[4].payload {
        TcEvent::HtbClassCreated {
            handle,
            priority,
            params,
            ..
        } => {
            assert_eq!(*handle, h("1:11"));
            assert_eq!(priority.value(), 0);
            assert_eq!(params.rate, Bandwidth::megabits(1));
            assert_eq!(params.ceil, Bandwidth::megabits(3));
        }
        other => panic!("expected ssh HTBClassCreated, got {other:?}"),
    }

    match &records[5].payload {
        TcEvent::FilterCreated {
            priority, flow_id, matches, ..
        } => {
            assert_eq!(*priority, 100);
            assert_eq!(*flow_id, h("1:11"));
            assert_eq!(matches[0].value, "22");
        }
        other => panic!("expected ssh FilterCreated, got {other:?}"),
    }

    match &records[6].payload {
        TcEvent::HtbClassCreated { handle, params, .. } => {
            assert_eq!(*handle, h("1:999"));
            assert_eq!(params.rate, Bandwidth::megabits(1));
            assert_eq!(params.ceil, Bandwidth::megabits(10));
        }
        other => panic!("expected default HTBClassCreated, got {other:?}"),
    }

    // The kernel adapter saw everything.
    assert!(adapter.has_qdisc(&dev(), h("1:0")).await);
    assert_eq!(adapter.class_count(&dev()).await, 3);
}

#[tokio::test]
async fn missing_priority_rejects_before_any_state_change() {
    let adapter = Arc::new(MemoryAdapter::new());
    let controller = TrafficController::new(adapter.clone());

    let policy = TrafficPolicy::new("eth0")
        .unwrap()
        .total_bandwidth("10mbit")
        .unwrap()
        .class(
            TrafficClass::new("web")
                .guaranteed("2mbit")
                .unwrap()
                .burstable_to("5mbit")
                .unwrap()
                .dest_port(80),
        );

    let err = controller.apply_policy(&policy).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "validation error: class 'web' does not have a priority set"
    );

    // No events appended, kernel adapter never called.
    assert!(
        controller
            .event_store()
            .events_for("tc:eth0")
            .await
            .unwrap()
            .is_empty()
    );
    assert!(!adapter.has_qdisc(&dev(), h("1:0")).await);
    assert_eq!(adapter.class_count(&dev()).await, 0);
}

#[tokio::test]
async fn max_above_total_rejects_with_both_rates_named() {
    let controller = TrafficController::new(Arc::new(MemoryAdapter::new()));

    let policy = TrafficPolicy::new("eth0")
        .unwrap()
        .total_bandwidth("10mbit")
        .unwrap()
        .class(
            TrafficClass::new("bulk")
                .guaranteed("5mbit")
                .unwrap()
                .burstable_to("20mbit")
                .unwrap()
                .priority(3),
        );

    let err = controller.apply_policy(&policy).await.unwrap_err();
    assert!(
        err.to_string()
            .contains("max bandwidth (20mbit) higher than total bandwidth (10mbit)"),
        "unexpected message: {err}"
    );
}

#[tokio::test]
async fn replayed_views_match_the_applied_policy() {
    let controller = TrafficController::new(Arc::new(MemoryAdapter::new()));
    controller.apply_policy(&web_and_ssh_policy()).await.unwrap();

    let qdisc = controller
        .query(tcflow::query::GetQdisc { device: dev() })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(qdisc.kind, "htb");
    assert_eq!(qdisc.default_class, Some(h("1:999")));

    let classes = controller
        .query(tcflow::query::GetClasses { device: dev() })
        .await
        .unwrap();
    let names: Vec<_> = classes.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["web", "ssh", "default"]);

    let filters = controller
        .query(tcflow::query::GetFilters { device: dev() })
        .await
        .unwrap();
    assert_eq!(filters.len(), 3);
    assert!(filters.iter().all(|f| f.parent == h("1:0")));
}
