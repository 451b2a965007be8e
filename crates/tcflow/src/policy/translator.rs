//! Policy-to-topology translation.
//!
//! Compiles a declarative [`TrafficPolicy`] into the HTB command
//! sequence that realizes it: one root qdisc at `1:0` defaulting to
//! `1:999`, one class per spec at `1:10`, `1:11`, ..., a trailing
//! default class, and one filter per compiled filter spec with
//! priorities starting at 100 within each class.

use crate::command::{CreateFilter, CreateHtbClass, CreateHtbQdisc};
use crate::domain::filter::FilterProtocol;
use crate::error::{Error, Result};
use crate::policy::TrafficPolicy;
use crate::types::{Bandwidth, Handle, Priority};

/// Minor of the first allocated class handle.
const FIRST_CLASS_MINOR: u16 = 10;

/// Minor of the default (catch-all) class.
const DEFAULT_CLASS_MINOR: u16 = 999;

/// Filter priorities start here within each class.
const FIRST_FILTER_PRIORITY: u16 = 100;

/// A command produced by translation.
#[derive(Debug, Clone)]
pub enum PolicyCommand {
    /// Create the root HTB qdisc.
    Qdisc(CreateHtbQdisc),
    /// Create one traffic class.
    Class(CreateHtbClass),
    /// Create one filter.
    Filter(CreateFilter),
}

/// Compile a policy into its command sequence.
///
/// The whole policy is validated before the first command is emitted;
/// an invalid policy produces no commands at all.
pub fn translate(policy: &TrafficPolicy) -> Result<Vec<PolicyCommand>> {
    let link = validate(policy)?;
    let device = policy.device.clone();
    let root = Handle::root(1)?;
    let default_class = Handle::new(1, DEFAULT_CLASS_MINOR)?;

    let mut commands = vec![PolicyCommand::Qdisc(CreateHtbQdisc {
        device: device.clone(),
        handle: root,
        default_class,
        r2q: None,
        link_bandwidth: Some(link),
    })];

    for (i, class) in policy.classes.iter().enumerate() {
        let handle = Handle::new(1, FIRST_CLASS_MINOR + i as u16)?;
        let guaranteed = class.guaranteed.ok_or_else(|| {
            Error::validation(format!(
                "class '{}' does not have a guaranteed bandwidth set",
                class.name
            ))
        })?;
        let max = class.max.unwrap_or(guaranteed);
        commands.push(PolicyCommand::Class(CreateHtbClass::new(
            device.clone(),
            root,
            handle,
            class.name.clone(),
            class.priority.unwrap_or(Priority::LOWEST),
            guaranteed,
            max,
        )));

        let mut priority = FIRST_FILTER_PRIORITY;
        for filter in &class.filters {
            let matches = filter.matches();
            // A filter whose whole match map compiled away is dropped
            // and does not consume a priority slot.
            if matches.is_empty() {
                continue;
            }
            commands.push(PolicyCommand::Filter(CreateFilter {
                device: device.clone(),
                parent: root,
                priority,
                protocol: FilterProtocol::Ip,
                flow_id: handle,
                matches,
            }));
            priority += 1;
        }
    }

    // The catch-all class for unclassified traffic: a token guarantee,
    // bursting to the whole link.
    commands.push(PolicyCommand::Class(CreateHtbClass::new(
        device,
        root,
        default_class,
        "default",
        Priority::LOWEST,
        Bandwidth::megabits(1),
        link,
    )));

    Ok(commands)
}

/// Validate the policy; returns the link bandwidth on success.
fn validate(policy: &TrafficPolicy) -> Result<Bandwidth> {
    let Some(link) = policy.total else {
        return Err(Error::validation(format!(
            "total bandwidth is not set for device {}",
            policy.device
        )));
    };
    if link.is_zero() {
        return Err(Error::validation(format!(
            "total bandwidth must be positive for device {}",
            policy.device
        )));
    }
    if policy.classes.len() > (DEFAULT_CLASS_MINOR - FIRST_CLASS_MINOR) as usize {
        return Err(Error::validation(format!(
            "too many traffic classes ({})",
            policy.classes.len()
        )));
    }

    let mut guaranteed_sum = Bandwidth::bits(0);
    for class in &policy.classes {
        if class.priority.is_none() {
            return Err(Error::validation(format!(
                "class '{}' does not have a priority set",
                class.name
            )));
        }
        let Some(guaranteed) = class.guaranteed else {
            return Err(Error::validation(format!(
                "class '{}' does not have a guaranteed bandwidth set",
                class.name
            )));
        };
        let max = class.max.unwrap_or(guaranteed);
        if max > link {
            return Err(Error::validation(format!(
                "max bandwidth ({max}) higher than total bandwidth ({link})"
            )));
        }
        if guaranteed > max {
            return Err(Error::validation(format!(
                "guaranteed bandwidth ({guaranteed}) higher than max bandwidth ({max}) for class '{}'",
                class.name
            )));
        }
        guaranteed_sum = guaranteed_sum.saturating_add(guaranteed);
    }
    if guaranteed_sum > link {
        return Err(Error::validation(format!(
            "sum of guaranteed bandwidth ({guaranteed_sum}) exceeds total bandwidth ({link})"
        )));
    }
    Ok(link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::TrafficClass;

    fn policy() -> TrafficPolicy {
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
                    .ssh(),
            )
    }

    #[test]
    fn test_translates_the_full_sequence() {
        let commands = translate(&policy()).unwrap();
        assert_eq!(commands.len(), 7);

        let PolicyCommand::Qdisc(qdisc) = &commands[0] else {
            panic!("expected qdisc first");
        };
        assert_eq!(qdisc.handle.to_string(), "1:0");
        assert_eq!(qdisc.default_class.to_string(), "1:999");
        assert_eq!(qdisc.link_bandwidth.unwrap(), Bandwidth::megabits(10));

        let PolicyCommand::Class(web) = &commands[1] else {
            panic!("expected web class");
        };
        assert_eq!(web.handle.to_string(), "1:10");
        assert_eq!(web.rate, Bandwidth::megabits(2));
        assert_eq!(web.ceil, Bandwidth::megabits(5));
        assert_eq!(web.priority.value(), 1);

        let PolicyCommand::Filter(http) = &commands[2] else {
            panic!("expected http filter");
        };
        assert_eq!(http.priority, 100);
        assert_eq!(http.flow_id.to_string(), "1:10");
        assert_eq!(http.matches[0].value, "80");

        let PolicyCommand::Filter(https) = &commands[3] else {
            panic!("expected https filter");
        };
        assert_eq!(https.priority, 101);
        assert_eq!(https.matches[0].value, "443");

        let PolicyCommand::Class(ssh) = &commands[4] else {
            panic!("expected ssh class");
        };
        assert_eq!(ssh.handle.to_string(), "1:11");
        assert_eq!(ssh.priority.value(), 0);

        let PolicyCommand::Filter(ssh_filter) = &commands[5] else {
            panic!("expected ssh filter");
        };
        // Per-class filter priorities restart at 100.
        assert_eq!(ssh_filter.priority, 100);
        assert_eq!(ssh_filter.flow_id.to_string(), "1:11");
        assert_eq!(ssh_filter.matches[0].value, "22");

        let PolicyCommand::Class(default) = &commands[6] else {
            panic!("expected trailing default class");
        };
        assert_eq!(default.handle.to_string(), "1:999");
        assert_eq!(default.rate, Bandwidth::megabits(1));
        assert_eq!(default.ceil, Bandwidth::megabits(10));
    }

    #[test]
    fn test_missing_priority_is_rejected_with_the_class_name() {
        let policy = TrafficPolicy::new("eth0")
            .unwrap()
            .total_bandwidth("10mbit")
            .unwrap()
            .class(
                TrafficClass::new("web")
                    .guaranteed("2mbit")
                    .unwrap()
                    .burstable_to("5mbit")
                    .unwrap(),
            );
        let err = translate(&policy).unwrap_err();
        assert_eq!(
            err.to_string(),
            "validation error: class 'web' does not have a priority set"
        );
    }

    #[test]
    fn test_max_above_link_is_rejected() {
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
        let err = translate(&policy).unwrap_err();
        assert!(
            err.to_string()
                .contains("max bandwidth (20mbit) higher than total bandwidth (10mbit)")
        );
    }

    #[test]
    fn test_guaranteed_sum_above_link_is_rejected() {
        let policy = TrafficPolicy::new("eth0")
            .unwrap()
            .total_bandwidth("10mbit")
            .unwrap()
            .class(
                TrafficClass::new("a")
                    .guaranteed("6mbit")
                    .unwrap()
                    .priority(1),
            )
            .class(
                TrafficClass::new("b")
                    .guaranteed("5mbit")
                    .unwrap()
                    .priority(2),
            );
        let err = translate(&policy).unwrap_err();
        assert!(err.to_string().contains("sum of guaranteed bandwidth"));
    }

    #[test]
    fn test_missing_total_is_rejected_before_any_command() {
        let policy = TrafficPolicy::new("eth0").unwrap();
        let err = translate(&policy).unwrap_err();
        assert!(err.to_string().contains("total bandwidth is not set"));
    }

    #[test]
    fn test_unknown_application_filter_is_dropped() {
        let policy = TrafficPolicy::new("eth0")
            .unwrap()
            .total_bandwidth("10mbit")
            .unwrap()
            .class(
                TrafficClass::new("games")
                    .guaranteed("1mbit")
                    .unwrap()
                    .priority(2)
                    .application("quake")
                    .dest_port(27960),
            );
        let commands = translate(&policy).unwrap();
        let filters: Vec<_> = commands
            .iter()
            .filter_map(|c| match c {
                PolicyCommand::Filter(f) => Some(f),
                _ => None,
            })
            .collect();
        // Only the port filter survives, and it takes the first slot.
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].priority, 100);
        assert_eq!(filters[0].matches[0].value, "27960");
    }

    #[test]
    fn test_max_defaults_to_guaranteed() {
        let policy = TrafficPolicy::new("eth0")
            .unwrap()
            .total_bandwidth("10mbit")
            .unwrap()
            .class(
                TrafficClass::new("flat")
                    .guaranteed("2mbit")
                    .unwrap()
                    .priority(1),
            );
        let commands = translate(&policy).unwrap();
        let PolicyCommand::Class(class) = &commands[1] else {
            panic!("expected class");
        };
        assert_eq!(class.rate, class.ceil);
    }
}
