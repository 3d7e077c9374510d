use crate::config::MembershipConfig;
use crate::peer_table::PeerTable;
use dmesh_core::events::MeshEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// Spawns the background task that periodically sweeps `table` for stale
/// peers and forwards the resulting `MeshEvent`s to `events`. Returns the
/// task handle; dropping it does not stop the task — call `.abort()`.
pub fn spawn_sweeper(
    table: Arc<PeerTable>,
    cfg: MembershipConfig,
    events: mpsc::UnboundedSender<MeshEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(cfg.sweep_interval_ms));
        loop {
            interval.tick().await;
            let fired = table.sweep(now_ms(), &cfg).await;
            for ev in fired {
                if events.send(ev).is_err() {
                    tracing::debug!("membership event channel closed, stopping sweeper");
                    return;
                }
            }
        }
    })
}
