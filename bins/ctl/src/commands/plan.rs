//! tcflowctl plan command implementation.

use clap::Args;
use serde_json::json;
use tcflow::policy::PolicyCommand;
use tcflow::Result;

use super::{build_policy, print_json};

#[derive(Args)]
pub struct PlanCmd {
    /// Device name.
    #[arg(long)]
    dev: String,

    /// Total link bandwidth (e.g. "100mbit").
    #[arg(long)]
    total: String,

    /// Class spec, repeatable: name=web,rate=2mbit,ceil=5mbit,prio=1,dport=80
    #[arg(long = "class")]
    classes: Vec<String>,
}

impl PlanCmd {
    pub fn run(&self, json: bool, pretty: bool) -> Result<()> {
        let policy = build_policy(&self.dev, &self.total, &self.classes)?;
        let commands = policy.commands()?;

        if json {
            let rendered: Vec<_> = commands.iter().map(render_json).collect();
            print_json(&json!({ "device": self.dev, "commands": rendered }), pretty);
        } else {
            for command in &commands {
                println!("{}", render_text(command));
            }
        }
        Ok(())
    }
}

fn render_text(command: &PolicyCommand) -> String {
    match command {
        PolicyCommand::Qdisc(cmd) => format!(
            "qdisc add dev {} root handle {} htb default {}",
            cmd.device, cmd.handle, cmd.default_class
        ),
        PolicyCommand::Class(cmd) => format!(
            "class add dev {} parent {} classid {} htb rate {} ceil {} prio {} # {}",
            cmd.device, cmd.parent, cmd.handle, cmd.rate, cmd.ceil, cmd.priority, cmd.name
        ),
        PolicyCommand::Filter(cmd) => {
            let matches: Vec<String> = cmd
                .matches
                .iter()
                .map(|m| format!("{} {}", m.kind.wire_key(), m.value))
                .collect();
            format!(
                "filter add dev {} parent {} prio {} protocol {} flowid {} match {}",
                cmd.device,
                cmd.parent,
                cmd.priority,
                cmd.protocol,
                cmd.flow_id,
                matches.join(" ")
            )
        }
    }
}

fn render_json(command: &PolicyCommand) -> serde_json::Value {
    match command {
        PolicyCommand::Qdisc(cmd) => json!({
            "op": "qdisc-add",
            "handle": cmd.handle.to_string(),
            "default_class": cmd.default_class.to_string(),
            "link_bandwidth": cmd.link_bandwidth.map(|b| b.to_string()),
        }),
        PolicyCommand::Class(cmd) => json!({
            "op": "class-add",
            "parent": cmd.parent.to_string(),
            "handle": cmd.handle.to_string(),
            "name": cmd.name,
            "rate": cmd.rate.to_string(),
            "ceil": cmd.ceil.to_string(),
            "priority": cmd.priority.value(),
        }),
        PolicyCommand::Filter(cmd) => json!({
            "op": "filter-add",
            "parent": cmd.parent.to_string(),
            "priority": cmd.priority,
            "protocol": cmd.protocol.to_string(),
            "flow_id": cmd.flow_id.to_string(),
            "matches": cmd.matches.iter()
                .map(|m| json!({ (m.kind.wire_key()): m.value }))
                .collect::<Vec<_>>(),
        }),
    }
}
