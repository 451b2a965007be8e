//! tcflowctl apply command implementation.

use std::sync::Arc;

use clap::Args;
use tcflow::kernel::MemoryAdapter;
use tcflow::query::{GetDeviceStatistics, GetTopology};
use tcflow::{Result, TrafficController};

use super::{build_policy, print_json};

#[derive(Args)]
pub struct ApplyCmd {
    /// Device name.
    #[arg(long)]
    dev: String,

    /// Total link bandwidth (e.g. "100mbit").
    #[arg(long)]
    total: String,

    /// Class spec, repeatable: name=web,rate=2mbit,ceil=5mbit,prio=1,dport=80
    #[arg(long = "class")]
    classes: Vec<String>,

    /// Also fetch joined device statistics after applying.
    #[arg(long)]
    stats: bool,
}

impl ApplyCmd {
    pub async fn run(&self, json: bool, pretty: bool) -> Result<()> {
        let policy = build_policy(&self.dev, &self.total, &self.classes)?;
        let device = policy.device().clone();

        let controller = TrafficController::new(Arc::new(MemoryAdapter::new()));
        controller.apply_policy(&policy).await?;

        let topology = controller
            .query(GetTopology {
                device: device.clone(),
            })
            .await?;

        if json {
            print_json(&serde_json::to_value(&topology)?, pretty);
        } else {
            println!("device {} (version {})", topology.device, topology.version);
            for qdisc in &topology.qdiscs {
                let default = qdisc
                    .default_class
                    .map(|h| format!(" default {h}"))
                    .unwrap_or_default();
                println!("  qdisc {} {}{}", qdisc.kind, qdisc.handle, default);
            }
            for class in &topology.classes {
                println!(
                    "  class {} {} rate {} ceil {} prio {} # {}",
                    class.parent, class.handle, class.rate, class.ceil, class.priority, class.name
                );
            }
            for filter in &topology.filters {
                println!(
                    "  filter {} prio {} -> {} ({} match{})",
                    filter.parent,
                    filter.priority,
                    filter.flow_id,
                    filter.matches.len(),
                    if filter.matches.len() == 1 { "" } else { "es" }
                );
            }
        }

        if self.stats {
            let stats = controller.query(GetDeviceStatistics { device }).await?;
            if json {
                print_json(&serde_json::to_value(&stats)?, pretty);
            } else {
                println!("link tx {} bytes rx {} bytes", stats.link.tx_bytes, stats.link.rx_bytes);
                for class in &stats.classes {
                    let (bytes, packets) = class
                        .counters
                        .as_ref()
                        .map_or((0, 0), |c| (c.bytes, c.packets));
                    println!(
                        "  class {} ({}) {} bytes {} packets",
                        class.handle, class.name, bytes, packets
                    );
                }
            }
        }

        Ok(())
    }
}
